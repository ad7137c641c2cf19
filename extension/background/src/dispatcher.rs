//! Command Dispatcher.
//!
//! Routes a relayed [`CommandEnvelope`] to its typed handler, times it, and
//! records user-facing commands in a capped history ring.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tabctl_protocol::*;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::{BrowserApi, BrowserError, Clock, Debugger};
use crate::collector::CollectorError;
use crate::handlers::Handlers;
use crate::ring::RingBuffer;
use crate::session::SessionError;

pub const MAX_HISTORY_ENTRIES: usize = 100;

/// Results larger than this are summarized in history entries.
const HISTORY_RESULT_LIMIT: usize = 4096;

#[derive(Debug, Error)]
pub enum DispatchError {
	#[error(transparent)]
	Protocol(#[from] ProtocolError),

	#[error(transparent)]
	Session(#[from] SessionError),

	#[error(transparent)]
	Collector(#[from] CollectorError),

	#[error(transparent)]
	Browser(#[from] BrowserError),

	#[error("script threw: {0}")]
	Script(String),

	#[error("no element matches {0}")]
	ElementNotFound(String),

	#[error("{command}: unexpected result shape: {source}")]
	Decode {
		command: Command,
		#[source]
		source: serde_json::Error,
	},
}

pub struct Dispatcher<B, D, C> {
	handlers: Handlers<B, D>,
	clock: Arc<C>,
	history: Mutex<RingBuffer<HistoryEntry>>,
}

impl<B: BrowserApi, D: Debugger, C: Clock> Dispatcher<B, D, C> {
	pub fn new(handlers: Handlers<B, D>, clock: Arc<C>) -> Self {
		Self::with_history_capacity(handlers, clock, MAX_HISTORY_ENTRIES)
	}

	pub fn with_history_capacity(handlers: Handlers<B, D>, clock: Arc<C>, capacity: usize) -> Self {
		Self {
			handlers,
			clock,
			history: Mutex::new(RingBuffer::new(capacity)),
		}
	}

	pub fn handlers(&self) -> &Handlers<B, D> {
		&self.handlers
	}

	pub fn clock(&self) -> &C {
		&self.clock
	}

	/// Snapshot of the history ring, oldest first.
	pub fn history(&self, limit: Option<usize>) -> Vec<HistoryEntry> {
		self.history.lock().snapshot(limit)
	}

	/// Produces exactly one response for `envelope`.
	pub async fn dispatch(&self, envelope: &CommandEnvelope) -> ResponseEnvelope {
		let command = match envelope.command() {
			Ok(command) => command,
			Err(err) => {
				warn!(target = "tabctl.ext", id = %envelope.id, command = %envelope.command, "no handler registered");
				return ResponseEnvelope::failure(&envelope.id, err.to_string());
			}
		};

		let started = self.clock.now_ms();
		let outcome = self.route(command, envelope).await;
		let elapsed = (self.clock.now_ms() - started).max(0.0);
		debug!(target = "tabctl.ext", id = %envelope.id, %command, elapsed_ms = elapsed, ok = outcome.is_ok(), "dispatched");

		if !command.is_internal() {
			let (result, error) = match &outcome {
				Ok(value) => (Some(summarize(value)), None),
				Err(err) => (None, Some(err.to_string())),
			};
			self.history.lock().push(HistoryEntry {
				command,
				data: envelope.data.clone(),
				timestamp: started,
				success: error.is_none(),
				result,
				error,
				execution_time_ms: elapsed,
				is_user_command: true,
			});
		}

		match outcome {
			Ok(value) => ResponseEnvelope::ok(&envelope.id, value),
			Err(err) => ResponseEnvelope::failure(&envelope.id, err.to_string()),
		}
	}

	async fn route(&self, command: Command, env: &CommandEnvelope) -> Result<Value, DispatchError> {
		let h = &self.handlers;
		match command {
			Command::Register => self.run(env, |_: Register| async { Ok(h.registration.clone()) }).await,
			Command::Ping => {
				self.run(env, |_: Ping| async {
					Ok(Pong {
						version: h.registration.version.clone(),
						timestamp: self.clock.now_ms(),
					})
				})
				.await
			}
			Command::GetHistory => self.run(env, |req: GetHistory| async move { Ok(self.history(req.limit)) }).await,
			Command::ReloadExtension => self.run(env, |req: ReloadExtension| h.reload_extension(req)).await,
			Command::GetProfileInfo => self.run(env, |req: GetProfileInfo| h.profile_info(req)).await,
			Command::ListTabs => self.run(env, |req: ListTabs| h.list_tabs(req)).await,
			Command::CreateTab => self.run(env, |req: CreateTab| h.create_tab(req)).await,
			Command::CloseTab => self.run(env, |req: CloseTab| h.close_tab(req)).await,
			Command::NavigateTab => self.run(env, |req: NavigateTab| h.navigate_tab(req)).await,
			Command::RefreshTab => self.run(env, |req: RefreshTab| h.refresh_tab(req)).await,
			Command::FocusTab => self.run(env, |req: FocusTab| h.focus_tab(req)).await,
			Command::ExecuteScript => self.run(env, |req: ExecuteScript| h.execute_script(req)).await,
			Command::CaptureScreenshot => self.run(env, |req: CaptureScreenshot| h.capture_screenshot(req)).await,
			Command::StartLogging => self.run(env, |req: StartLogging| h.start_logging(req)).await,
			Command::StopLogging => self.run(env, |req: StopLogging| h.stop_logging(req)).await,
			Command::GetTabLogs => self.run(env, |req: GetTabLogs| h.tab_logs(req)).await,
			Command::GetTabRequests => self.run(env, |req: GetTabRequests| h.tab_requests(req)).await,
			Command::ClearTabLogs => self.run(env, |req: ClearTabLogs| h.clear_logs(req)).await,
			Command::ClearTabRequests => self.run(env, |req: ClearTabRequests| h.clear_requests(req)).await,
			Command::GetTabStorage => self.run(env, |req: GetTabStorage| h.tab_storage(req)).await,
			Command::ClickElement => self.run(env, |req: ClickElement| h.click_element(req)).await,
			Command::FillInput => self.run(env, |req: FillInput| h.fill_input(req)).await,
		}
	}

	async fn run<S, F, Fut>(&self, env: &CommandEnvelope, handler: F) -> Result<Value, DispatchError>
	where
		S: CommandSpec,
		F: FnOnce(S) -> Fut,
		Fut: Future<Output = Result<S::Output, DispatchError>>,
	{
		let payload = env.decode::<S>()?;
		let output = handler(payload).await?;
		serde_json::to_value(output).map_err(|source| DispatchError::Decode { command: S::COMMAND, source })
	}
}

fn summarize(value: &Value) -> Value {
	let size = value.to_string().len();
	if size > HISTORY_RESULT_LIMIT {
		json!({ "truncated": true, "bytes": size })
	} else {
		value.clone()
	}
}
