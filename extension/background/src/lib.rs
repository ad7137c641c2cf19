//! Extension-side half of tabctl.
//!
//! Commands arrive from the native bridge as frames, are routed by the
//! [`Dispatcher`](dispatcher::Dispatcher) to typed handlers, and are answered
//! with exactly one response each. Debugger sessions are owned by the
//! [`SessionManager`](session::SessionManager); console and network events of
//! logging tabs are buffered by the [`Collector`](collector::Collector).
//!
//! Everything except the `glue` module is target-independent and runs against
//! the traits in [`api`], so the logic is tested natively with in-memory fakes.
//! Diagnostics are `tracing` events; [`log_forward`] relays them to the bridge.

pub mod api;
pub mod background;
pub mod collector;
pub mod dispatcher;
pub mod handlers;
pub mod log_forward;
pub mod ring;
pub mod scripts;
pub mod session;

#[cfg(target_arch = "wasm32")]
mod glue;

#[cfg(test)]
mod testing;

pub use background::Background;
pub use collector::{Collector, CollectorError, MAX_LOG_ENTRIES, MAX_REQUEST_ENTRIES};
pub use dispatcher::{DispatchError, Dispatcher, MAX_HISTORY_ENTRIES};
pub use session::{DetachReason, SessionError, SessionEvent, SessionManager};
