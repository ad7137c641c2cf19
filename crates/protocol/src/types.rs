//! Result and record types carried inside response envelopes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::Command;

/// Browser tab identifier as assigned by the browser.
pub type TabId = i64;

/// One entry of a tab listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
	pub id: TabId,
	/// Position of the tab within its window.
	pub index: u32,
	pub window_id: i64,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub active: bool,
}

/// Generic acknowledgement for commands without a meaningful result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
	pub ok: bool,
}

impl Ack {
	pub const OK: Ack = Ack { ok: true };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pong {
	pub version: String,
	/// Milliseconds since the Unix epoch, as seen by the extension.
	pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInfo {
	pub extension_id: String,
	pub version: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_agent: Option<String>,
	/// Tabs currently holding a debugging session.
	#[serde(default)]
	pub attached_tabs: Vec<TabId>,
	/// Tabs with log/network capture enabled.
	#[serde(default)]
	pub logging_tabs: Vec<TabId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptResult {
	/// Value returned by the script, serialized by the page.
	#[serde(default)]
	pub value: Value,
	/// Remote type name (`"undefined"`, `"object"`, ...).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub kind: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
	#[default]
	Png,
	Jpeg,
}

impl ImageFormat {
	pub fn extension(self) -> &'static str {
		match self {
			ImageFormat::Png => "png",
			ImageFormat::Jpeg => "jpg",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screenshot {
	pub format: ImageFormat,
	/// Base64 encoded image bytes.
	pub data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingStatus {
	pub tab_id: TabId,
	pub logging: bool,
	/// False when the call found the tab already in the requested state.
	pub changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cleared {
	pub tab_id: TabId,
	pub removed: usize,
}

/// Where a captured log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
	Console,
	Exception,
	Browser,
}

/// Normalized console/runtime log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
	pub source: LogSource,
	/// `log`, `info`, `warning`, `error`, `debug`, ...
	pub level: String,
	pub text: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub line: Option<u32>,
	/// Milliseconds since the Unix epoch.
	pub timestamp: f64,
}

/// Network request observed on an attached tab, merged across its lifecycle events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEntry {
	pub request_id: String,
	pub url: String,
	pub method: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub resource_type: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<u16>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status_text: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub mime_type: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub encoded_data_length: Option<f64>,
	#[serde(default)]
	pub finished: bool,
	#[serde(default)]
	pub failed: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error_text: Option<String>,
	/// Milliseconds since the Unix epoch when the request was issued.
	pub timestamp: f64,
}

/// Web storage and cookies visible to the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSnapshot {
	#[serde(default)]
	pub origin: String,
	#[serde(default)]
	pub local_storage: BTreeMap<String, String>,
	#[serde(default)]
	pub session_storage: BTreeMap<String, String>,
	/// Raw `document.cookie` string.
	#[serde(default)]
	pub cookies: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickOutcome {
	pub clicked: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tag: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
}

/// Diagnostic record of one dispatched command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
	pub command: Command,
	#[serde(default)]
	pub data: Value,
	/// Milliseconds since the Unix epoch when dispatch started.
	pub timestamp: f64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	pub success: bool,
	pub execution_time_ms: f64,
	pub is_user_command: bool,
}
