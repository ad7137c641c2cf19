//! Correlation between HTTP callers and the extension channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tabctl_protocol::{
	BridgeMessage, CommandEnvelope, ExtensionMessage, FrameLogLevel, HealthState, HealthStatus, Registration, ResponseEnvelope,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
	#[error("extension is not registered with the bridge")]
	NotRegistered,

	#[error("`{command}` timed out after {}ms", .timeout.as_millis())]
	Timeout { command: String, timeout: Duration },

	#[error("extension disconnected before responding")]
	Disconnected,

	#[error("command could not be sent to the extension: {0}")]
	Undeliverable(String),
}

struct Pending {
	caller_id: String,
	generation: u64,
	tx: oneshot::Sender<Result<ResponseEnvelope, RelayError>>,
}

/// Removes a waiter when its caller goes away, whatever the reason.
struct Waiter<'a> {
	pending: &'a DashMap<u64, Pending>,
	wire_id: u64,
}

impl Drop for Waiter<'_> {
	fn drop(&mut self) {
		self.pending.remove(&self.wire_id);
	}
}

struct Channel {
	generation: u64,
	tx: mpsc::UnboundedSender<BridgeMessage>,
	registration: Option<Registration>,
}

/// Shared state of one bridge process.
///
/// Owns the in-flight correlation map and the (at most one) extension
/// channel. Every relayed command gets a fresh wire id, so ids chosen by
/// concurrent callers never collide on the channel.
pub struct Relay {
	port: u16,
	channel: Mutex<Option<Channel>>,
	pending: DashMap<u64, Pending>,
	next_wire_id: AtomicU64,
	next_generation: AtomicU64,
}

impl Relay {
	pub fn new(port: u16) -> Self {
		Self {
			port,
			channel: Mutex::new(None),
			pending: DashMap::new(),
			next_wire_id: AtomicU64::new(1),
			next_generation: AtomicU64::new(1),
		}
	}

	pub fn port(&self) -> u16 {
		self.port
	}

	pub fn pending_len(&self) -> usize {
		self.pending.len()
	}

	pub fn is_registered(&self) -> bool {
		self.channel.lock().as_ref().is_some_and(|c| c.registration.is_some())
	}

	pub fn health(&self) -> HealthStatus {
		let registration = self.channel.lock().as_ref().and_then(|c| c.registration.clone());
		HealthStatus {
			status: if registration.is_some() {
				HealthState::Ready
			} else {
				HealthState::Waiting
			},
			port: self.port,
			extension_id: registration.as_ref().map(|r| r.extension_id.clone()),
			version: registration.map(|r| r.version),
			pending: self.pending.len(),
		}
	}

	/// Installs a new extension channel and returns its generation and the
	/// outbound frame queue. A previous channel is dropped.
	pub fn connect(&self) -> (u64, mpsc::UnboundedReceiver<BridgeMessage>) {
		let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
		let (tx, rx) = mpsc::unbounded_channel();
		let previous = self.channel.lock().replace(Channel {
			generation,
			tx,
			registration: None,
		});
		if let Some(previous) = previous {
			warn!(target = "tabctl.bridge", generation, "replacing existing extension channel");
			self.fail_pending(previous.generation, RelayError::Disconnected);
		}
		debug!(target = "tabctl.bridge", generation, "extension channel open");
		(generation, rx)
	}

	/// Drops channel `generation` and fails every pending waiter.
	pub fn disconnect(&self, generation: u64) {
		let mut channel = self.channel.lock();
		if channel.as_ref().is_some_and(|c| c.generation == generation) {
			*channel = None;
			drop(channel);
			let failed = self.fail_pending(generation, RelayError::Disconnected);
			info!(target = "tabctl.bridge", generation, failed, "extension channel closed");
		}
	}

	/// Fails every waiter whose command went out on channel `generation`.
	fn fail_pending(&self, generation: u64, err: RelayError) -> usize {
		let ids: Vec<u64> = self
			.pending
			.iter()
			.filter(|entry| entry.generation == generation)
			.map(|entry| *entry.key())
			.collect();
		let mut failed = 0;
		for id in ids {
			if let Some((_, pending)) = self.pending.remove(&id) {
				let _ = pending.tx.send(Err(err.clone()));
				failed += 1;
			}
		}
		failed
	}

	/// Fails one in-flight command, identified by its wire id.
	pub fn fail(&self, wire_id: &str, err: RelayError) {
		if let Some((_, pending)) = wire_id.parse().ok().and_then(|id: u64| self.pending.remove(&id)) {
			let _ = pending.tx.send(Err(err));
		}
	}

	/// Handles one frame from channel `generation`.
	pub fn on_extension_message(&self, generation: u64, message: ExtensionMessage) {
		match message {
			ExtensionMessage::Register(registration) => self.register(generation, registration),
			ExtensionMessage::Response(response) => self.complete(response),
			ExtensionMessage::KeepAlive => debug!(target = "tabctl.bridge", "keep-alive"),
			ExtensionMessage::Log { level, message } => match level {
				FrameLogLevel::Debug => debug!(target = "tabctl.ext", "{message}"),
				FrameLogLevel::Info => info!(target = "tabctl.ext", "{message}"),
				FrameLogLevel::Warn => warn!(target = "tabctl.ext", "{message}"),
				FrameLogLevel::Error => error!(target = "tabctl.ext", "{message}"),
			},
		}
	}

	fn register(&self, generation: u64, registration: Registration) {
		let mut guard = self.channel.lock();
		let Some(channel) = guard.as_mut().filter(|c| c.generation == generation) else {
			return;
		};

		let reply = match &channel.registration {
			Some(existing) => {
				warn!(
					target = "tabctl.bridge",
					kept = %existing.extension_id,
					ignored = %registration.extension_id,
					"duplicate registration on one channel"
				);
				BridgeMessage::Error {
					message: format!("already registered as {}", existing.extension_id),
				}
			}
			None => {
				info!(
					target = "tabctl.bridge",
					extension_id = %registration.extension_id,
					version = %registration.version,
					"extension registered"
				);
				channel.registration = Some(registration);
				BridgeMessage::Registered {
					version: env!("CARGO_PKG_VERSION").to_string(),
					port: self.port,
				}
			}
		};
		let _ = channel.tx.send(reply);
	}

	fn complete(&self, response: ResponseEnvelope) {
		let pending = response.id.parse::<u64>().ok().and_then(|id| self.pending.remove(&id));
		match pending {
			Some((_, pending)) => {
				let _ = pending.tx.send(Ok(ResponseEnvelope {
					id: pending.caller_id,
					..response
				}));
			}
			None => debug!(target = "tabctl.bridge", id = %response.id, "dropping response with no pending waiter"),
		}
	}

	/// Forwards `envelope` to the extension and waits for its response.
	pub async fn relay(&self, envelope: CommandEnvelope) -> Result<ResponseEnvelope, RelayError> {
		let timeout = envelope.timeout();
		let command = envelope.command.clone();

		let wire_id = self.next_wire_id.fetch_add(1, Ordering::Relaxed);
		let (resp_tx, resp_rx) = oneshot::channel();
		let caller_id = envelope.id.clone();
		let frame = BridgeMessage::Command(CommandEnvelope {
			id: wire_id.to_string(),
			..envelope
		});

		// Registered and queued under the channel lock, so a concurrent
		// disconnect either sees this waiter or happens before it exists.
		let waiter = {
			let channel = self.channel.lock();
			let Some(channel) = channel.as_ref().filter(|c| c.registration.is_some()) else {
				return Err(RelayError::NotRegistered);
			};
			self.pending.insert(
				wire_id,
				Pending {
					caller_id: caller_id.clone(),
					generation: channel.generation,
					tx: resp_tx,
				},
			);
			let waiter = Waiter {
				pending: &self.pending,
				wire_id,
			};
			if channel.tx.send(frame).is_err() {
				return Err(RelayError::Disconnected);
			}
			waiter
		};
		debug!(target = "tabctl.bridge", wire_id, %caller_id, %command, "relaying");

		match tokio::time::timeout(timeout, resp_rx).await {
			Ok(Ok(outcome)) => outcome,
			Ok(Err(_)) => Err(RelayError::Disconnected),
			Err(_) => {
				drop(waiter);
				warn!(target = "tabctl.bridge", wire_id, %command, "command timed out");
				Err(RelayError::Timeout { command, timeout })
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use serde_json::json;

	use super::*;

	fn registration() -> Registration {
		Registration {
			extension_id: "abc".into(),
			version: "1.0.0".into(),
		}
	}

	fn envelope(id: &str, timeout_ms: Option<u64>) -> CommandEnvelope {
		CommandEnvelope {
			id: id.into(),
			command: "list_tabs".into(),
			data: json!({}),
			timeout_ms,
		}
	}

	async fn next_command(rx: &mut mpsc::UnboundedReceiver<BridgeMessage>) -> CommandEnvelope {
		loop {
			match rx.recv().await.expect("channel closed") {
				BridgeMessage::Command(env) => return env,
				_ => continue,
			}
		}
	}

	#[tokio::test]
	async fn relay_requires_registration() {
		let relay = Relay::new(1);
		assert_eq!(relay.relay(envelope("a", None)).await, Err(RelayError::NotRegistered));

		let (generation, _rx) = relay.connect();
		assert_eq!(relay.relay(envelope("a", None)).await, Err(RelayError::NotRegistered));
		assert!(!relay.health().is_ready());

		relay.on_extension_message(generation, ExtensionMessage::Register(registration()));
		assert!(relay.health().is_ready());
		assert_eq!(relay.health().extension_id.as_deref(), Some("abc"));
	}

	#[tokio::test]
	async fn response_is_routed_back_with_caller_id() {
		let relay = Arc::new(Relay::new(1));
		let (generation, mut rx) = relay.connect();
		relay.on_extension_message(generation, ExtensionMessage::Register(registration()));
		assert!(matches!(rx.recv().await, Some(BridgeMessage::Registered { port: 1, .. })));

		let caller = tokio::spawn({
			let relay = Arc::clone(&relay);
			async move { relay.relay(envelope("caller-7", None)).await }
		});

		let sent = next_command(&mut rx).await;
		assert_ne!(sent.id, "caller-7");
		relay.on_extension_message(generation, ExtensionMessage::Response(ResponseEnvelope::ok(&sent.id, json!([1]))));

		let response = caller.await.unwrap().unwrap();
		assert_eq!(response.id, "caller-7");
		assert_eq!(response.result, Some(json!([1])));
		assert_eq!(relay.pending_len(), 0);
	}

	#[tokio::test]
	async fn duplicate_response_is_dropped() {
		let relay = Arc::new(Relay::new(1));
		let (generation, mut rx) = relay.connect();
		relay.on_extension_message(generation, ExtensionMessage::Register(registration()));

		let caller = tokio::spawn({
			let relay = Arc::clone(&relay);
			async move { relay.relay(envelope("x", None)).await }
		});
		let sent = next_command(&mut rx).await;
		relay.on_extension_message(generation, ExtensionMessage::Response(ResponseEnvelope::ok(&sent.id, json!(1))));
		relay.on_extension_message(generation, ExtensionMessage::Response(ResponseEnvelope::ok(&sent.id, json!(2))));

		assert_eq!(caller.await.unwrap().unwrap().result, Some(json!(1)));
	}

	#[tokio::test(start_paused = true)]
	async fn timeout_removes_waiter() {
		let relay = Relay::new(1);
		let (generation, mut rx) = relay.connect();
		relay.on_extension_message(generation, ExtensionMessage::Register(registration()));

		let err = relay.relay(envelope("slow", Some(50))).await.unwrap_err();
		assert!(matches!(err, RelayError::Timeout { .. }));
		assert_eq!(relay.pending_len(), 0);

		let sent = next_command(&mut rx).await;
		relay.on_extension_message(generation, ExtensionMessage::Response(ResponseEnvelope::ok(&sent.id, json!(null))));
		assert_eq!(relay.pending_len(), 0);
	}

	#[tokio::test]
	async fn disconnect_fails_all_pending() {
		let relay = Arc::new(Relay::new(1));
		let (generation, mut rx) = relay.connect();
		relay.on_extension_message(generation, ExtensionMessage::Register(registration()));

		let callers: Vec<_> = (0..3)
			.map(|i| {
				let relay = Arc::clone(&relay);
				tokio::spawn(async move { relay.relay(envelope(&i.to_string(), Some(60_000))).await })
			})
			.collect();
		for _ in 0..3 {
			next_command(&mut rx).await;
		}

		relay.disconnect(generation);
		for caller in callers {
			assert_eq!(caller.await.unwrap(), Err(RelayError::Disconnected));
		}
		assert!(!relay.is_registered());
	}

	#[tokio::test]
	async fn abandoned_callers_leave_no_waiters() {
		let relay = Arc::new(Relay::new(1));
		let (generation, mut rx) = relay.connect();
		relay.on_extension_message(generation, ExtensionMessage::Register(registration()));

		for i in 0..3 {
			let caller = tokio::spawn({
				let relay = Arc::clone(&relay);
				async move { relay.relay(envelope(&i.to_string(), Some(60_000))).await }
			});
			next_command(&mut rx).await;
			assert_eq!(relay.pending_len(), 1);
			caller.abort();
			assert!(caller.await.unwrap_err().is_cancelled());
		}
		assert_eq!(relay.pending_len(), 0);
		assert_eq!(relay.health().pending, 0);
	}

	#[tokio::test]
	async fn replaced_channel_fails_only_its_own_waiters() {
		let relay = Arc::new(Relay::new(1));
		let (first, mut old_rx) = relay.connect();
		relay.on_extension_message(first, ExtensionMessage::Register(registration()));
		let stranded = tokio::spawn({
			let relay = Arc::clone(&relay);
			async move { relay.relay(envelope("old", Some(60_000))).await }
		});
		next_command(&mut old_rx).await;

		let (second, mut rx) = relay.connect();
		assert_eq!(stranded.await.unwrap(), Err(RelayError::Disconnected));

		relay.on_extension_message(second, ExtensionMessage::Register(registration()));
		let caller = tokio::spawn({
			let relay = Arc::clone(&relay);
			async move { relay.relay(envelope("fresh", Some(60_000))).await }
		});
		let sent = next_command(&mut rx).await;

		// A late close of the old channel leaves the new waiter alone.
		relay.disconnect(first);
		assert_eq!(relay.pending_len(), 1);

		relay.on_extension_message(second, ExtensionMessage::Response(ResponseEnvelope::ok(&sent.id, json!(true))));
		assert_eq!(caller.await.unwrap().unwrap().id, "fresh");
		assert_eq!(relay.pending_len(), 0);
	}

	#[tokio::test]
	async fn reconnect_requires_fresh_registration() {
		let relay = Relay::new(1);
		let (first, _rx) = relay.connect();
		relay.on_extension_message(first, ExtensionMessage::Register(registration()));
		relay.disconnect(first);

		let (second, _rx) = relay.connect();
		assert!(!relay.is_registered());
		relay.disconnect(first);
		relay.on_extension_message(second, ExtensionMessage::Register(registration()));
		assert!(relay.is_registered());
	}

	#[tokio::test]
	async fn duplicate_registration_keeps_first() {
		let relay = Relay::new(1);
		let (generation, mut rx) = relay.connect();
		relay.on_extension_message(generation, ExtensionMessage::Register(registration()));
		relay.on_extension_message(
			generation,
			ExtensionMessage::Register(Registration {
				extension_id: "other".into(),
				version: "2.0.0".into(),
			}),
		);

		assert!(matches!(rx.recv().await, Some(BridgeMessage::Registered { .. })));
		assert!(matches!(rx.recv().await, Some(BridgeMessage::Error { .. })));
		assert_eq!(relay.health().extension_id.as_deref(), Some("abc"));
	}
}
