//! Fakes shared by the client-side integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tabctl_cli::transport::{BridgeTransport, Relayed, Sleeper, TransportError};
use tabctl_protocol::{CommandEnvelope, HealthState, HealthStatus, ResponseEnvelope};

type Responder = Box<dyn Fn(&CommandEnvelope) -> Relayed + Send + Sync>;

/// Scripted bridge: per-port health answers consumed in order (the last one
/// repeats) and a responder for every posted command.
pub struct FakeTransport {
	health: Mutex<HashMap<u16, Vec<Option<HealthStatus>>>>,
	responder: Responder,
	pub health_calls: AtomicUsize,
	pub posted: Mutex<Vec<(u16, CommandEnvelope)>>,
}

impl FakeTransport {
	pub fn new(responder: impl Fn(&CommandEnvelope) -> Relayed + Send + Sync + 'static) -> Self {
		Self {
			health: Mutex::new(HashMap::new()),
			responder: Box::new(responder),
			health_calls: AtomicUsize::new(0),
			posted: Mutex::new(Vec::new()),
		}
	}

	/// Answers every command with `success: true` and `result`.
	pub fn answering(result: serde_json::Value) -> Self {
		Self::new(move |envelope| Relayed::Answered(ResponseEnvelope::ok(envelope.id.clone(), result.clone())))
	}

	pub fn with_health(self, port: u16, answers: Vec<Option<HealthStatus>>) -> Self {
		self.health.lock().insert(port, answers);
		self
	}

	pub fn health_calls(&self) -> usize {
		self.health_calls.load(Ordering::SeqCst)
	}

	pub fn posted_commands(&self) -> Vec<String> {
		self.posted.lock().iter().map(|(_, e)| e.command.clone()).collect()
	}
}

#[async_trait]
impl BridgeTransport for FakeTransport {
	async fn health(&self, port: u16) -> Option<HealthStatus> {
		self.health_calls.fetch_add(1, Ordering::SeqCst);
		let mut health = self.health.lock();
		let answers = health.get_mut(&port)?;
		if answers.len() > 1 {
			answers.remove(0)
		} else {
			answers.first().cloned().flatten()
		}
	}

	async fn post_command(&self, port: u16, envelope: &CommandEnvelope) -> Result<Relayed, TransportError> {
		self.posted.lock().push((port, envelope.clone()));
		Ok((self.responder)(envelope))
	}
}

/// Sleeper that only counts; clones share the counter.
#[derive(Clone, Default)]
pub struct CountingSleeper {
	sleeps: Arc<AtomicUsize>,
}

impl CountingSleeper {
	pub fn count(&self) -> usize {
		self.sleeps.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl Sleeper for CountingSleeper {
	async fn sleep(&self, _duration: Duration) {
		self.sleeps.fetch_add(1, Ordering::SeqCst);
	}
}

pub fn ready(port: u16, extension_id: &str) -> Option<HealthStatus> {
	Some(HealthStatus {
		status: HealthState::Ready,
		port,
		extension_id: Some(extension_id.into()),
		version: Some("1.4.0".into()),
		pending: 0,
	})
}

pub fn waiting(port: u16) -> Option<HealthStatus> {
	Some(HealthStatus {
		status: HealthState::Waiting,
		port,
		extension_id: None,
		version: None,
		pending: 0,
	})
}

pub fn tab(id: i64, index: u32) -> serde_json::Value {
	json!({
		"id": id,
		"index": index,
		"windowId": 1,
		"title": format!("tab {id}"),
		"url": format!("https://example.com/{id}"),
		"active": index == 0,
	})
}
