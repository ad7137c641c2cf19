//! The extension's runtime hub: bridge frames in, responses out, browser
//! events fanned into session bookkeeping and the collector.

use std::cell::Cell;
use std::future::Future;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tabctl_protocol::{BridgeMessage, ExtensionMessage, Registration};
use tracing::{debug, info, warn};

use crate::api::{BrowserApi, Clock, Debugger};
use crate::collector::Collector;
use crate::dispatcher::Dispatcher;
use crate::handlers::Handlers;
use crate::session::{SessionEvent, SessionManager};

pub struct Background<B, D, C> {
	sessions: Arc<SessionManager<D>>,
	collector: Arc<Collector>,
	dispatcher: Dispatcher<B, D, C>,
	registration: Registration,
	registered: Cell<bool>,
}

impl<B: BrowserApi, D: Debugger, C: Clock> Background<B, D, C> {
	pub fn new(browser: Arc<B>, debugger: Arc<D>, clock: Arc<C>, registration: Registration) -> Self {
		let sessions = Arc::new(SessionManager::new(debugger));
		let collector = Arc::new(Collector::default());
		let handlers = Handlers::new(browser, Arc::clone(&sessions), Arc::clone(&collector), registration.clone());
		Self {
			sessions,
			collector,
			dispatcher: Dispatcher::new(handlers, clock),
			registration,
			registered: Cell::new(false),
		}
	}

	pub fn sessions(&self) -> &SessionManager<D> {
		&self.sessions
	}

	pub fn collector(&self) -> &Collector {
		&self.collector
	}

	pub fn dispatcher(&self) -> &Dispatcher<B, D, C> {
		&self.dispatcher
	}

	pub fn is_registered(&self) -> bool {
		self.registered.get()
	}

	/// Handshake frame to send on every (re)connect.
	pub fn register_frame(&self) -> ExtensionMessage {
		self.registered.set(false);
		ExtensionMessage::Register(self.registration.clone())
	}

	/// Marks the channel lost; the next connect registers again.
	pub fn disconnected(&self) {
		self.registered.set(false);
	}

	/// Handles one frame from the bridge, returning the frame to send back.
	pub async fn handle_frame(&self, frame: BridgeMessage) -> Option<ExtensionMessage> {
		match frame {
			BridgeMessage::Registered { version, port } => {
				info!(target = "tabctl.ext", %version, port, "registered with bridge");
				self.registered.set(true);
				None
			}
			BridgeMessage::Command(envelope) => {
				if !self.registered.get() {
					warn!(target = "tabctl.ext", id = %envelope.id, "command before registration acknowledged");
				}
				Some(ExtensionMessage::Response(self.dispatcher.dispatch(&envelope).await))
			}
			BridgeMessage::Error { message } => {
				warn!(target = "tabctl.ext", %message, "bridge reported error");
				None
			}
		}
	}

	pub fn handle_event(&self, event: SessionEvent) {
		match &event {
			SessionEvent::Protocol { tab_id, method, params } => {
				let now = self.dispatcher.clock().now_ms();
				if !self.collector.record(*tab_id, method, params, now) {
					debug!(target = "tabctl.ext", tab_id, %method, "event ignored");
				}
			}
			SessionEvent::TabRemoved { tab_id } => {
				self.collector.discard(*tab_id);
				self.sessions.apply(&event);
			}
			SessionEvent::Detached { .. } => self.sessions.apply(&event),
		}
	}

	/// Drains browser events until the stream ends.
	pub async fn run_event_loop<S>(&self, events: S)
	where
		S: Stream<Item = SessionEvent>,
	{
		futures::pin_mut!(events);
		while let Some(event) = events.next().await {
			self.handle_event(event);
		}
		debug!(target = "tabctl.ext", "event stream closed");
	}
}

/// Yields once each time `sleep()` completes. Only one timer is pending at a
/// time, however often the stream is polled alongside other work.
pub fn heartbeat<F, Fut>(sleep: F) -> impl Stream<Item = ()>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = ()>,
{
	futures::stream::unfold(sleep, |mut sleep| async move {
		sleep().await;
		Some(((), sleep))
	})
}
