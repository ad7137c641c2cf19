//! Command handlers, one method per non-administrative command.

use std::sync::Arc;

use serde_json::{Value, json};
use tabctl_protocol::*;

use crate::api::{BrowserApi, BrowserError, Debugger, TabUpdate};
use crate::collector::Collector;
use crate::dispatcher::DispatchError;
use crate::scripts;
use crate::session::{Session, SessionManager};

pub struct Handlers<B, D> {
	pub(crate) browser: Arc<B>,
	pub(crate) sessions: Arc<SessionManager<D>>,
	pub(crate) collector: Arc<Collector>,
	pub(crate) registration: Registration,
}

impl<B: BrowserApi, D: Debugger> Handlers<B, D> {
	pub fn new(browser: Arc<B>, sessions: Arc<SessionManager<D>>, collector: Arc<Collector>, registration: Registration) -> Self {
		Self {
			browser,
			sessions,
			collector,
			registration,
		}
	}

	pub async fn reload_extension(&self, _req: ReloadExtension) -> Result<Ack, DispatchError> {
		self.browser.reload_extension();
		Ok(Ack::OK)
	}

	pub async fn profile_info(&self, _req: GetProfileInfo) -> Result<ProfileInfo, DispatchError> {
		Ok(ProfileInfo {
			extension_id: self.registration.extension_id.clone(),
			version: self.registration.version.clone(),
			user_agent: self.browser.user_agent(),
			attached_tabs: self.sessions.attached_tabs(),
			logging_tabs: self.sessions.logging_tabs(),
		})
	}

	pub async fn list_tabs(&self, req: ListTabs) -> Result<Vec<TabInfo>, DispatchError> {
		Ok(self.browser.query_tabs(req.current_window).await?)
	}

	pub async fn create_tab(&self, req: CreateTab) -> Result<TabInfo, DispatchError> {
		Ok(self.browser.create_tab(req.url.as_deref(), req.active).await?)
	}

	pub async fn close_tab(&self, req: CloseTab) -> Result<Ack, DispatchError> {
		self.browser.close_tab(req.tab_id).await?;
		Ok(Ack::OK)
	}

	pub async fn navigate_tab(&self, req: NavigateTab) -> Result<TabInfo, DispatchError> {
		let update = TabUpdate {
			url: Some(req.url),
			active: None,
		};
		Ok(self.browser.update_tab(req.tab_id, update).await?)
	}

	pub async fn refresh_tab(&self, req: RefreshTab) -> Result<Ack, DispatchError> {
		self.browser.reload_tab(req.tab_id, req.bypass_cache).await?;
		Ok(Ack::OK)
	}

	pub async fn focus_tab(&self, req: FocusTab) -> Result<TabInfo, DispatchError> {
		let update = TabUpdate {
			url: None,
			active: Some(true),
		};
		let tab = self.browser.update_tab(req.tab_id, update).await?;
		self.browser.focus_window(tab.window_id).await?;
		Ok(tab)
	}

	pub async fn execute_script(&self, req: ExecuteScript) -> Result<ScriptResult, DispatchError> {
		self.sessions
			.with_session(req.tab_id, |session| async move { evaluate(&session, &req.code, req.await_promise).await })
			.await
	}

	pub async fn capture_screenshot(&self, req: CaptureScreenshot) -> Result<Screenshot, DispatchError> {
		self.sessions
			.with_session(req.tab_id, |session| async move {
				let mut params = json!({
					"format": match req.format {
						ImageFormat::Png => "png",
						ImageFormat::Jpeg => "jpeg",
					},
					"fromSurface": true,
					"captureBeyondViewport": req.full_page,
				});
				if let Some(quality) = req.quality {
					params["quality"] = json!(quality);
				}
				if req.full_page {
					let metrics = session.send("Page.getLayoutMetrics", json!({})).await?;
					let size = metrics
						.get("cssContentSize")
						.or_else(|| metrics.get("contentSize"))
						.cloned()
						.unwrap_or(Value::Null);
					if let (Some(width), Some(height)) = (size["width"].as_f64(), size["height"].as_f64()) {
						params["clip"] = json!({ "x": 0, "y": 0, "width": width, "height": height, "scale": 1 });
					}
				}

				let response = session.send("Page.captureScreenshot", params).await?;
				let data = response["data"]
					.as_str()
					.ok_or_else(|| BrowserError::new("capture returned no image data"))?;
				Ok(Screenshot {
					format: req.format,
					data: data.to_string(),
				})
			})
			.await
	}

	pub async fn start_logging(&self, req: StartLogging) -> Result<LoggingStatus, DispatchError> {
		let created = self.collector.begin(req.tab_id);
		match self.sessions.start_logging(req.tab_id).await {
			Ok(changed) => Ok(LoggingStatus {
				tab_id: req.tab_id,
				logging: true,
				changed,
			}),
			Err(err) => {
				if created {
					self.collector.discard(req.tab_id);
				}
				Err(err.into())
			}
		}
	}

	pub async fn stop_logging(&self, req: StopLogging) -> Result<LoggingStatus, DispatchError> {
		let changed = self.sessions.stop_logging(req.tab_id).await?;
		Ok(LoggingStatus {
			tab_id: req.tab_id,
			logging: false,
			changed,
		})
	}

	pub async fn tab_logs(&self, req: GetTabLogs) -> Result<Vec<LogEntry>, DispatchError> {
		Ok(self.collector.logs(req.tab_id, req.limit)?)
	}

	pub async fn tab_requests(&self, req: GetTabRequests) -> Result<Vec<RequestEntry>, DispatchError> {
		Ok(self.collector.requests(req.tab_id, req.limit)?)
	}

	pub async fn clear_logs(&self, req: ClearTabLogs) -> Result<Cleared, DispatchError> {
		let removed = self.collector.clear_logs(req.tab_id)?;
		Ok(Cleared {
			tab_id: req.tab_id,
			removed,
		})
	}

	pub async fn clear_requests(&self, req: ClearTabRequests) -> Result<Cleared, DispatchError> {
		let removed = self.collector.clear_requests(req.tab_id)?;
		Ok(Cleared {
			tab_id: req.tab_id,
			removed,
		})
	}

	pub async fn tab_storage(&self, req: GetTabStorage) -> Result<StorageSnapshot, DispatchError> {
		let result = self
			.sessions
			.with_session(req.tab_id, |session| async move {
				evaluate(&session, scripts::STORAGE_SNAPSHOT, false).await
			})
			.await?;
		serde_json::from_value(result.value).map_err(|source| DispatchError::Decode {
			command: Command::GetTabStorage,
			source,
		})
	}

	pub async fn click_element(&self, req: ClickElement) -> Result<ClickOutcome, DispatchError> {
		let script = scripts::click(req.selector.as_deref(), req.text.as_deref());
		let result = self
			.sessions
			.with_session(req.tab_id, |session| async move { evaluate(&session, &script, false).await })
			.await?;
		let outcome: ClickOutcome = serde_json::from_value(result.value).map_err(|source| DispatchError::Decode {
			command: Command::ClickElement,
			source,
		})?;
		if !outcome.clicked {
			let locator = match (&req.selector, &req.text) {
				(Some(selector), _) => format!("selector {selector:?}"),
				(None, Some(text)) => format!("text {text:?}"),
				(None, None) => "nothing".to_string(),
			};
			return Err(DispatchError::ElementNotFound(locator));
		}
		Ok(outcome)
	}

	pub async fn fill_input(&self, req: FillInput) -> Result<Ack, DispatchError> {
		let script = scripts::fill(&req.selector, &req.value);
		let result = self
			.sessions
			.with_session(req.tab_id, |session| async move { evaluate(&session, &script, false).await })
			.await?;
		if result.value["filled"].as_bool() != Some(true) {
			return Err(DispatchError::ElementNotFound(format!("selector {:?}", req.selector)));
		}
		Ok(Ack::OK)
	}
}

/// Evaluates `expression` in the page and unwraps the remote result.
async fn evaluate<D: Debugger>(session: &Session<D>, expression: &str, await_promise: bool) -> Result<ScriptResult, DispatchError> {
	let response = session
		.send(
			"Runtime.evaluate",
			json!({
				"expression": expression,
				"returnByValue": true,
				"awaitPromise": await_promise,
				"userGesture": true,
			}),
		)
		.await?;

	if let Some(details) = response.get("exceptionDetails") {
		let message = details["exception"]["description"]
			.as_str()
			.or_else(|| details["text"].as_str())
			.unwrap_or("script threw an exception");
		return Err(DispatchError::Script(message.to_string()));
	}

	let remote = &response["result"];
	let value = match remote.get("value") {
		Some(value) => value.clone(),
		None => remote["unserializableValue"]
			.as_str()
			.map(|raw| Value::String(raw.to_string()))
			.unwrap_or(Value::Null),
	};
	Ok(ScriptResult {
		value,
		kind: remote["type"].as_str().map(str::to_owned),
	})
}
