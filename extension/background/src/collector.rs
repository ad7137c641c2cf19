//! Log/Request Collector.
//!
//! Buffers exist for a tab from its first successful `start_logging` on.
//! Detaching keeps them so history stays inspectable after the session ends;
//! only the clear operations empty them.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tabctl_protocol::{LogEntry, LogSource, RequestEntry, TabId};
use thiserror::Error;

use crate::ring::RingBuffer;

pub const MAX_LOG_ENTRIES: usize = 1000;
pub const MAX_REQUEST_ENTRIES: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectorError {
	#[error("tab {0} is not logging; run start_logging first")]
	NotLogging(TabId),
}

struct TabBuffers {
	logs: RingBuffer<LogEntry>,
	requests: RingBuffer<RequestEntry>,
}

pub struct Collector {
	tabs: Mutex<HashMap<TabId, TabBuffers>>,
	log_capacity: usize,
	request_capacity: usize,
}

impl Default for Collector {
	fn default() -> Self {
		Self::new(MAX_LOG_ENTRIES, MAX_REQUEST_ENTRIES)
	}
}

impl Collector {
	pub fn new(log_capacity: usize, request_capacity: usize) -> Self {
		Self {
			tabs: Mutex::new(HashMap::new()),
			log_capacity,
			request_capacity,
		}
	}

	/// Creates buffers for `tab_id`; returns whether they were new.
	pub fn begin(&self, tab_id: TabId) -> bool {
		let mut tabs = self.tabs.lock();
		if tabs.contains_key(&tab_id) {
			return false;
		}
		tabs.insert(
			tab_id,
			TabBuffers {
				logs: RingBuffer::new(self.log_capacity),
				requests: RingBuffer::new(self.request_capacity),
			},
		);
		true
	}

	/// Drops buffers created by a `start_logging` that did not complete.
	pub fn discard(&self, tab_id: TabId) {
		self.tabs.lock().remove(&tab_id);
	}

	pub fn is_collecting(&self, tab_id: TabId) -> bool {
		self.tabs.lock().contains_key(&tab_id)
	}

	/// Normalizes one protocol event into the tab's buffers.
	///
	/// Returns `false` when the event was ignored (unknown method or a tab
	/// without buffers).
	pub fn record(&self, tab_id: TabId, method: &str, params: &Value, now_ms: f64) -> bool {
		let mut tabs = self.tabs.lock();
		let Some(buffers) = tabs.get_mut(&tab_id) else {
			return false;
		};

		match method {
			"Runtime.consoleAPICalled" => {
				buffers.logs.push(console_entry(params, now_ms));
			}
			"Runtime.exceptionThrown" => {
				buffers.logs.push(exception_entry(params, now_ms));
			}
			"Log.entryAdded" => {
				buffers.logs.push(browser_log_entry(params, now_ms));
			}
			"Network.requestWillBeSent" => {
				buffers.requests.push(request_entry(params, now_ms));
			}
			"Network.responseReceived" => {
				let response = &params["response"];
				if let Some(entry) = find_request(&mut buffers.requests, params) {
					entry.status = response["status"].as_u64().map(|s| s as u16);
					entry.status_text = str_field(response, "statusText").filter(|s| !s.is_empty());
					entry.mime_type = str_field(response, "mimeType");
					if entry.resource_type.is_none() {
						entry.resource_type = str_field(params, "type");
					}
				}
			}
			"Network.loadingFinished" => {
				if let Some(entry) = find_request(&mut buffers.requests, params) {
					entry.finished = true;
					entry.encoded_data_length = params["encodedDataLength"].as_f64();
				}
			}
			"Network.loadingFailed" => {
				if let Some(entry) = find_request(&mut buffers.requests, params) {
					entry.finished = true;
					entry.failed = true;
					entry.error_text = str_field(params, "errorText");
				}
			}
			_ => return false,
		}
		true
	}

	pub fn logs(&self, tab_id: TabId, limit: Option<usize>) -> Result<Vec<LogEntry>, CollectorError> {
		let tabs = self.tabs.lock();
		let buffers = tabs.get(&tab_id).ok_or(CollectorError::NotLogging(tab_id))?;
		Ok(buffers.logs.snapshot(limit))
	}

	pub fn requests(&self, tab_id: TabId, limit: Option<usize>) -> Result<Vec<RequestEntry>, CollectorError> {
		let tabs = self.tabs.lock();
		let buffers = tabs.get(&tab_id).ok_or(CollectorError::NotLogging(tab_id))?;
		Ok(buffers.requests.snapshot(limit))
	}

	pub fn clear_logs(&self, tab_id: TabId) -> Result<usize, CollectorError> {
		let mut tabs = self.tabs.lock();
		let buffers = tabs.get_mut(&tab_id).ok_or(CollectorError::NotLogging(tab_id))?;
		Ok(buffers.logs.clear())
	}

	pub fn clear_requests(&self, tab_id: TabId) -> Result<usize, CollectorError> {
		let mut tabs = self.tabs.lock();
		let buffers = tabs.get_mut(&tab_id).ok_or(CollectorError::NotLogging(tab_id))?;
		Ok(buffers.requests.clear())
	}
}

fn find_request<'a>(requests: &'a mut RingBuffer<RequestEntry>, params: &Value) -> Option<&'a mut RequestEntry> {
	let request_id = params["requestId"].as_str()?;
	requests.find_latest_mut(|entry| entry.request_id == request_id)
}

fn str_field(value: &Value, key: &str) -> Option<String> {
	value.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn console_entry(params: &Value, now_ms: f64) -> LogEntry {
	let text = params["args"]
		.as_array()
		.map(|args| args.iter().map(remote_object_text).collect::<Vec<_>>().join(" "))
		.unwrap_or_default();
	let frame = &params["stackTrace"]["callFrames"][0];
	LogEntry {
		source: LogSource::Console,
		level: str_field(params, "type").unwrap_or_else(|| "log".into()),
		text,
		url: str_field(frame, "url").filter(|u| !u.is_empty()),
		line: frame["lineNumber"].as_u64().map(|l| l as u32 + 1),
		timestamp: params["timestamp"].as_f64().unwrap_or(now_ms),
	}
}

fn exception_entry(params: &Value, now_ms: f64) -> LogEntry {
	let details = &params["exceptionDetails"];
	let text = details["exception"]["description"]
		.as_str()
		.or_else(|| details["text"].as_str())
		.unwrap_or("Uncaught exception")
		.to_string();
	LogEntry {
		source: LogSource::Exception,
		level: "error".into(),
		text,
		url: str_field(details, "url").filter(|u| !u.is_empty()),
		line: details["lineNumber"].as_u64().map(|l| l as u32 + 1),
		timestamp: params["timestamp"].as_f64().unwrap_or(now_ms),
	}
}

fn browser_log_entry(params: &Value, now_ms: f64) -> LogEntry {
	let entry = &params["entry"];
	LogEntry {
		source: LogSource::Browser,
		level: str_field(entry, "level").unwrap_or_else(|| "info".into()),
		text: str_field(entry, "text").unwrap_or_default(),
		url: str_field(entry, "url"),
		line: entry["lineNumber"].as_u64().map(|l| l as u32 + 1),
		timestamp: entry["timestamp"].as_f64().unwrap_or(now_ms),
	}
}

fn request_entry(params: &Value, now_ms: f64) -> RequestEntry {
	let request = &params["request"];
	RequestEntry {
		request_id: str_field(params, "requestId").unwrap_or_default(),
		url: str_field(request, "url").unwrap_or_default(),
		method: str_field(request, "method").unwrap_or_else(|| "GET".into()),
		resource_type: str_field(params, "type"),
		status: None,
		status_text: None,
		mime_type: None,
		encoded_data_length: None,
		finished: false,
		failed: false,
		error_text: None,
		// `wallTime` is seconds since the epoch; `timestamp` is monotonic.
		timestamp: params["wallTime"].as_f64().map(|s| s * 1000.0).unwrap_or(now_ms),
	}
}

/// Renders a protocol `RemoteObject` the way a console would print it.
fn remote_object_text(object: &Value) -> String {
	if let Some(value) = object.get("value") {
		return match value {
			Value::String(s) => s.clone(),
			other => other.to_string(),
		};
	}
	if let Some(raw) = object["unserializableValue"].as_str() {
		return raw.to_string();
	}
	if let Some(description) = object["description"].as_str() {
		return description.to_string();
	}
	object["type"].as_str().unwrap_or("undefined").to_string()
}
