//! Debugging Session Manager.
//!
//! Tracks, per tab, whether a debugger session is attached and who holds it.
//! A tab is attached while it is logging or while at least one operation
//! borrows it through [`SessionManager::with_session`]. Attach and detach
//! transitions on one tab are serialized by a per-tab gate; different tabs
//! never wait on each other.
//!
//! Bookkeeping only changes through [`SessionManager::apply`] (detachment)
//! or after a successful attach, so an externally closed session and a
//! deliberate detach end in the same state.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::lock::Mutex as AsyncMutex;
use parking_lot::Mutex;
use serde_json::Value;
use tabctl_protocol::TabId;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{BrowserError, Debugger};

/// Protocol domains enabled while a tab is logging.
pub const LOGGING_DOMAINS: [&str; 3] = ["Runtime", "Log", "Network"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
	#[error("failed to attach debugger to tab {tab_id}: {source}")]
	Attach {
		tab_id: TabId,
		#[source]
		source: BrowserError,
	},

	#[error("failed to enable {domain} on tab {tab_id}: {source}")]
	Enable {
		tab_id: TabId,
		domain: &'static str,
		#[source]
		source: BrowserError,
	},
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetachReason {
	/// We detached on purpose.
	Requested,
	/// The browser or the user closed the session (`target_closed`, `canceled_by_user`, ...).
	External(String),
}

/// Inbound notifications processed by the background event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
	/// A session ended; the tab is no longer attached.
	Detached { tab_id: TabId, reason: DetachReason },
	/// A debugging-protocol event from an attached tab.
	Protocol { tab_id: TabId, method: String, params: Value },
	/// The tab itself is gone.
	TabRemoved { tab_id: TabId },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Attachment {
	borrows: usize,
	logging: bool,
	/// Distinguishes this attachment from earlier ones on the same tab.
	epoch: u64,
}

impl Attachment {
	fn is_idle(&self) -> bool {
		self.borrows == 0 && !self.logging
	}
}

/// Borrowed access to one tab's attached session.
pub struct Session<D> {
	tab_id: TabId,
	debugger: Arc<D>,
}

impl<D: Debugger> Session<D> {
	pub fn tab_id(&self) -> TabId {
		self.tab_id
	}

	pub async fn send(&self, method: &str, params: Value) -> Result<Value, BrowserError> {
		self.debugger.send_command(self.tab_id, method, params).await
	}
}

pub struct SessionManager<D> {
	debugger: Arc<D>,
	attachments: Mutex<HashMap<TabId, Attachment>>,
	gates: Mutex<HashMap<TabId, Arc<AsyncMutex<()>>>>,
	epochs: AtomicU64,
}

impl<D: Debugger> SessionManager<D> {
	pub fn new(debugger: Arc<D>) -> Self {
		Self {
			debugger,
			attachments: Mutex::new(HashMap::new()),
			gates: Mutex::new(HashMap::new()),
			epochs: AtomicU64::new(0),
		}
	}

	fn next_epoch(&self) -> u64 {
		self.epochs.fetch_add(1, Ordering::Relaxed) + 1
	}

	pub fn is_attached(&self, tab_id: TabId) -> bool {
		self.attachments.lock().contains_key(&tab_id)
	}

	pub fn is_logging(&self, tab_id: TabId) -> bool {
		self.attachments.lock().get(&tab_id).is_some_and(|a| a.logging)
	}

	pub fn borrow_count(&self, tab_id: TabId) -> usize {
		self.attachments.lock().get(&tab_id).map_or(0, |a| a.borrows)
	}

	pub fn attached_tabs(&self) -> Vec<TabId> {
		let mut tabs: Vec<_> = self.attachments.lock().keys().copied().collect();
		tabs.sort_unstable();
		tabs
	}

	pub fn logging_tabs(&self) -> Vec<TabId> {
		let mut tabs: Vec<_> = self
			.attachments
			.lock()
			.iter()
			.filter(|(_, a)| a.logging)
			.map(|(tab, _)| *tab)
			.collect();
		tabs.sort_unstable();
		tabs
	}

	fn gate(&self, tab_id: TabId) -> Arc<AsyncMutex<()>> {
		self.gates
			.lock()
			.entry(tab_id)
			.or_insert_with(|| Arc::new(AsyncMutex::new(())))
			.clone()
	}

	/// Reconciles bookkeeping with a session-lifecycle notification.
	///
	/// Protocol events are ignored here; they belong to the collector.
	pub fn apply(&self, event: &SessionEvent) {
		match event {
			SessionEvent::Detached { tab_id, reason } => {
				let previous = self.attachments.lock().remove(tab_id);
				match (previous, reason) {
					(Some(state), DetachReason::External(why)) => {
						info!(target = "tabctl.ext", tab_id, reason = %why, borrows = state.borrows, logging = state.logging, "session detached externally");
					}
					(Some(_), DetachReason::Requested) => {
						debug!(target = "tabctl.ext", tab_id, "session detached");
					}
					(None, _) => {}
				}
			}
			SessionEvent::TabRemoved { tab_id } => {
				self.attachments.lock().remove(tab_id);
				self.gates.lock().remove(tab_id);
			}
			SessionEvent::Protocol { .. } => {}
		}
	}

	/// Attaches and enables the logging domains.
	///
	/// Returns `false` when the tab was already logging. A failed enable leaves
	/// the tab exactly as it was before the call.
	pub async fn start_logging(&self, tab_id: TabId) -> Result<bool, SessionError> {
		let gate = self.gate(tab_id);
		let _held = gate.lock().await;

		let existing = self.attachments.lock().get(&tab_id).copied();
		match existing {
			Some(state) if state.logging => Ok(false),
			Some(_) => {
				self.enable_domains(tab_id).await?;
				if let Some(state) = self.attachments.lock().get_mut(&tab_id) {
					state.logging = true;
				}
				Ok(true)
			}
			None => {
				self.debugger
					.attach(tab_id)
					.await
					.map_err(|source| SessionError::Attach { tab_id, source })?;
				if let Err(err) = self.enable_domains(tab_id).await {
					if let Err(detach_err) = self.debugger.detach(tab_id).await {
						warn!(target = "tabctl.ext", tab_id, error = %detach_err, "detach after failed enable");
					}
					return Err(err);
				}
				self.attachments.lock().insert(
					tab_id,
					Attachment {
						borrows: 0,
						logging: true,
						epoch: self.next_epoch(),
					},
				);
				info!(target = "tabctl.ext", tab_id, "logging started");
				Ok(true)
			}
		}
	}

	/// Stops logging; detaches unless an operation still borrows the session.
	///
	/// Returns `false` when the tab was not logging.
	pub async fn stop_logging(&self, tab_id: TabId) -> Result<bool, SessionError> {
		let gate = self.gate(tab_id);
		let _held = gate.lock().await;

		let remaining = {
			let mut attachments = self.attachments.lock();
			match attachments.get_mut(&tab_id) {
				Some(state) if state.logging => {
					state.logging = false;
					state.borrows
				}
				_ => return Ok(false),
			}
		};

		if remaining == 0 {
			self.detach(tab_id).await;
		} else {
			for domain in LOGGING_DOMAINS {
				let method = format!("{domain}.disable");
				if let Err(err) = self.debugger.send_command(tab_id, &method, Value::Null).await {
					debug!(target = "tabctl.ext", tab_id, %method, error = %err, "disable failed");
				}
			}
		}
		info!(target = "tabctl.ext", tab_id, "logging stopped");
		Ok(true)
	}

	/// Runs `op` with the tab attached.
	///
	/// An existing session is reused and left attached. Otherwise one is
	/// attached for the duration of `op` and released afterwards whether `op`
	/// succeeded or not.
	pub async fn with_session<T, E, F, Fut>(&self, tab_id: TabId, op: F) -> Result<T, E>
	where
		F: FnOnce(Session<D>) -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: From<SessionError>,
	{
		let epoch = self.acquire(tab_id).await?;
		let session = Session {
			tab_id,
			debugger: Arc::clone(&self.debugger),
		};
		let outcome = op(session).await;
		self.release(tab_id, epoch).await;
		outcome
	}

	/// Takes one borrow and returns the epoch of the attachment it holds.
	async fn acquire(&self, tab_id: TabId) -> Result<u64, SessionError> {
		let gate = self.gate(tab_id);
		let _held = gate.lock().await;

		if let Some(state) = self.attachments.lock().get_mut(&tab_id) {
			state.borrows += 1;
			return Ok(state.epoch);
		}

		self.debugger
			.attach(tab_id)
			.await
			.map_err(|source| SessionError::Attach { tab_id, source })?;
		let epoch = self.next_epoch();
		self.attachments.lock().insert(
			tab_id,
			Attachment {
				borrows: 1,
				logging: false,
				epoch,
			},
		);
		debug!(target = "tabctl.ext", tab_id, "transient session attached");
		Ok(epoch)
	}

	/// Returns a borrow taken at `epoch`. A borrow of an attachment that has
	/// since ended is a no-op.
	async fn release(&self, tab_id: TabId, epoch: u64) {
		let gate = self.gate(tab_id);
		let _held = gate.lock().await;

		let idle = {
			let mut attachments = self.attachments.lock();
			match attachments.get_mut(&tab_id) {
				Some(state) if state.epoch == epoch => {
					state.borrows = state.borrows.saturating_sub(1);
					state.is_idle()
				}
				// Detached externally while borrowed, possibly reattached since.
				_ => false,
			}
		};

		if idle {
			self.detach(tab_id).await;
		}
	}

	async fn detach(&self, tab_id: TabId) {
		if let Err(err) = self.debugger.detach(tab_id).await {
			// The session may already be gone; bookkeeping follows regardless.
			debug!(target = "tabctl.ext", tab_id, error = %err, "detach failed");
		}
		self.apply(&SessionEvent::Detached {
			tab_id,
			reason: DetachReason::Requested,
		});
	}

	async fn enable_domains(&self, tab_id: TabId) -> Result<(), SessionError> {
		for domain in LOGGING_DOMAINS {
			let method = format!("{domain}.enable");
			self.debugger
				.send_command(tab_id, &method, Value::Null)
				.await
				.map_err(|source| SessionError::Enable { tab_id, domain, source })?;
		}
		Ok(())
	}
}
