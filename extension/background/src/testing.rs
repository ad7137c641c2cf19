//! In-memory fakes for the browser seams.

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tabctl_protocol::{TabId, TabInfo};

use crate::api::{BrowserApi, BrowserError, Clock, Debugger, TabUpdate};

#[derive(Default)]
struct DebuggerState {
	live: BTreeSet<TabId>,
	attach_calls: usize,
	commands: Vec<(TabId, String, Value)>,
	failing_methods: HashSet<String>,
	failing_attach: HashSet<TabId>,
	responses: HashMap<String, Value>,
}

/// Debugger that refuses double attachment, like the real one.
#[derive(Default)]
pub struct FakeDebugger {
	state: Mutex<DebuggerState>,
}

impl FakeDebugger {
	pub fn live(&self) -> Vec<TabId> {
		self.state.lock().live.iter().copied().collect()
	}

	pub fn attach_calls(&self) -> usize {
		self.state.lock().attach_calls
	}

	pub fn commands_for(&self, tab_id: TabId) -> Vec<String> {
		self.state
			.lock()
			.commands
			.iter()
			.filter(|(tab, _, _)| *tab == tab_id)
			.map(|(_, method, _)| method.clone())
			.collect()
	}

	pub fn last_params(&self, method: &str) -> Option<Value> {
		self.state
			.lock()
			.commands
			.iter()
			.rev()
			.find(|(_, m, _)| m == method)
			.map(|(_, _, params)| params.clone())
	}

	pub fn fail_method(&self, method: &str) {
		self.state.lock().failing_methods.insert(method.to_string());
	}

	pub fn fail_attach(&self, tab_id: TabId) {
		self.state.lock().failing_attach.insert(tab_id);
	}

	pub fn respond(&self, method: &str, result: Value) {
		self.state.lock().responses.insert(method.to_string(), result);
	}

	/// Simulates the user dismissing the debugging banner.
	pub fn drop_session(&self, tab_id: TabId) {
		self.state.lock().live.remove(&tab_id);
	}
}

#[async_trait(?Send)]
impl Debugger for FakeDebugger {
	async fn attach(&self, tab_id: TabId) -> Result<(), BrowserError> {
		let mut state = self.state.lock();
		if state.failing_attach.contains(&tab_id) {
			return Err(BrowserError::new(format!("No tab with given id {tab_id}.")));
		}
		if !state.live.insert(tab_id) {
			return Err(BrowserError::new(format!(
				"Another debugger is already attached to the tab with id: {tab_id}."
			)));
		}
		state.attach_calls += 1;
		Ok(())
	}

	async fn detach(&self, tab_id: TabId) -> Result<(), BrowserError> {
		if self.state.lock().live.remove(&tab_id) {
			Ok(())
		} else {
			Err(BrowserError::new(format!("Debugger is not attached to the tab with id: {tab_id}.")))
		}
	}

	async fn send_command(&self, tab_id: TabId, method: &str, params: Value) -> Result<Value, BrowserError> {
		let mut state = self.state.lock();
		if !state.live.contains(&tab_id) {
			return Err(BrowserError::new(format!("Debugger is not attached to the tab with id: {tab_id}.")));
		}
		state.commands.push((tab_id, method.to_string(), params));
		if state.failing_methods.contains(method) {
			return Err(BrowserError::new(format!("{method} failed")));
		}
		Ok(state.responses.get(method).cloned().unwrap_or_else(|| json!({})))
	}
}

#[derive(Default)]
struct BrowserState {
	tabs: Vec<TabInfo>,
	next_id: TabId,
	reloads: Vec<(TabId, bool)>,
	focused_windows: Vec<i64>,
	extension_reloads: usize,
}

#[derive(Default)]
pub struct FakeBrowser {
	state: Mutex<BrowserState>,
}

impl FakeBrowser {
	pub fn with_tabs(urls: &[&str]) -> Self {
		let browser = Self::default();
		{
			let mut state = browser.state.lock();
			for url in urls {
				let id = 100 + state.tabs.len() as TabId;
				let index = state.tabs.len() as u32;
				state.tabs.push(TabInfo {
					id,
					index,
					window_id: 1,
					title: format!("Tab {index}"),
					url: url.to_string(),
					active: index == 0,
				});
			}
			state.next_id = 100 + urls.len() as TabId;
		}
		browser
	}

	pub fn tab_ids(&self) -> Vec<TabId> {
		self.state.lock().tabs.iter().map(|t| t.id).collect()
	}

	pub fn reloads(&self) -> Vec<(TabId, bool)> {
		self.state.lock().reloads.clone()
	}

	pub fn focused_windows(&self) -> Vec<i64> {
		self.state.lock().focused_windows.clone()
	}

	pub fn extension_reloads(&self) -> usize {
		self.state.lock().extension_reloads
	}

	fn missing(tab_id: TabId) -> BrowserError {
		BrowserError::new(format!("No tab with id: {tab_id}."))
	}
}

#[async_trait(?Send)]
impl BrowserApi for FakeBrowser {
	async fn query_tabs(&self, _current_window: bool) -> Result<Vec<TabInfo>, BrowserError> {
		Ok(self.state.lock().tabs.clone())
	}

	async fn create_tab(&self, url: Option<&str>, active: bool) -> Result<TabInfo, BrowserError> {
		let mut state = self.state.lock();
		let tab = TabInfo {
			id: state.next_id,
			index: state.tabs.len() as u32,
			window_id: 1,
			title: String::new(),
			url: url.unwrap_or("chrome://newtab/").to_string(),
			active,
		};
		state.next_id += 1;
		state.tabs.push(tab.clone());
		Ok(tab)
	}

	async fn close_tab(&self, tab_id: TabId) -> Result<(), BrowserError> {
		let mut state = self.state.lock();
		let before = state.tabs.len();
		state.tabs.retain(|t| t.id != tab_id);
		if state.tabs.len() == before {
			return Err(Self::missing(tab_id));
		}
		Ok(())
	}

	async fn update_tab(&self, tab_id: TabId, update: TabUpdate) -> Result<TabInfo, BrowserError> {
		let mut state = self.state.lock();
		if update.active == Some(true) {
			for tab in state.tabs.iter_mut() {
				tab.active = false;
			}
		}
		let tab = state.tabs.iter_mut().find(|t| t.id == tab_id).ok_or_else(|| Self::missing(tab_id))?;
		if let Some(url) = update.url {
			tab.url = url;
		}
		if let Some(active) = update.active {
			tab.active = active;
		}
		Ok(tab.clone())
	}

	async fn reload_tab(&self, tab_id: TabId, bypass_cache: bool) -> Result<(), BrowserError> {
		let mut state = self.state.lock();
		if !state.tabs.iter().any(|t| t.id == tab_id) {
			return Err(Self::missing(tab_id));
		}
		state.reloads.push((tab_id, bypass_cache));
		Ok(())
	}

	async fn focus_window(&self, window_id: i64) -> Result<(), BrowserError> {
		self.state.lock().focused_windows.push(window_id);
		Ok(())
	}

	fn reload_extension(&self) {
		self.state.lock().extension_reloads += 1;
	}

	fn user_agent(&self) -> Option<String> {
		Some("FakeBrowser/1.0".into())
	}
}

/// Clock that advances only when told to.
#[derive(Default)]
pub struct ManualClock {
	now: Mutex<f64>,
}

impl ManualClock {
	pub fn at(ms: f64) -> Self {
		Self { now: Mutex::new(ms) }
	}

	pub fn advance(&self, ms: f64) {
		*self.now.lock() += ms;
	}
}

impl Clock for ManualClock {
	fn now_ms(&self) -> f64 {
		*self.now.lock()
	}
}
