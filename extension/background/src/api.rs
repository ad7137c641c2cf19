//! Seams to the browser: the debugger protocol, the tabs API and the clock.
//!
//! The wasm build binds these to `chrome.*`; tests bind them to in-memory fakes.

use async_trait::async_trait;
use serde_json::Value;
use tabctl_protocol::{TabId, TabInfo};
use thiserror::Error;

/// Failure reported by a browser API call, carrying the browser's message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BrowserError {
	pub message: String,
}

impl BrowserError {
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}

/// Remote-debugging protocol access, one session per tab.
#[async_trait(?Send)]
pub trait Debugger {
	async fn attach(&self, tab_id: TabId) -> Result<(), BrowserError>;

	async fn detach(&self, tab_id: TabId) -> Result<(), BrowserError>;

	async fn send_command(&self, tab_id: TabId, method: &str, params: Value) -> Result<Value, BrowserError>;
}

/// Fields to change on an existing tab.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabUpdate {
	pub url: Option<String>,
	pub active: Option<bool>,
}

/// Privileged tab and extension APIs.
#[async_trait(?Send)]
pub trait BrowserApi {
	async fn query_tabs(&self, current_window: bool) -> Result<Vec<TabInfo>, BrowserError>;

	async fn create_tab(&self, url: Option<&str>, active: bool) -> Result<TabInfo, BrowserError>;

	async fn close_tab(&self, tab_id: TabId) -> Result<(), BrowserError>;

	async fn update_tab(&self, tab_id: TabId, update: TabUpdate) -> Result<TabInfo, BrowserError>;

	async fn reload_tab(&self, tab_id: TabId, bypass_cache: bool) -> Result<(), BrowserError>;

	async fn focus_window(&self, window_id: i64) -> Result<(), BrowserError>;

	/// Schedules an extension reload; the current response is still delivered.
	fn reload_extension(&self);

	fn user_agent(&self) -> Option<String>;
}

/// Wall clock in milliseconds since the Unix epoch.
pub trait Clock {
	fn now_ms(&self) -> f64;
}

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[cfg(not(target_arch = "wasm32"))]
impl Clock for SystemClock {
	fn now_ms(&self) -> f64 {
		std::time::SystemTime::now()
			.duration_since(std::time::UNIX_EPOCH)
			.map(|d| d.as_secs_f64() * 1000.0)
			.unwrap_or_default()
	}
}
