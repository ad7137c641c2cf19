//! Transport Client: call-and-wait over the bridge's HTTP face.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tabctl_protocol::{Command, CommandEnvelope, CommandSpec, HealthStatus, ProtocolError, ResponseEnvelope};
use thiserror::Error;
use tracing::{debug, trace};

/// Health probes give up quickly; nothing local should take longer.
const HEALTH_TIMEOUT: Duration = Duration::from_millis(750);

/// Extra time granted on top of the command deadline, so the bridge's own
/// timeout answer arrives before the HTTP request gives up.
const RESPONSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum TransportError {
	#[error(
		"bridge not reachable on {ports} after {attempts} attempts; is the tabctl extension loaded and connected? \
		 Open the browser, check that the extension is enabled, and reload it if it was just installed"
	)]
	BridgeUnreachable { ports: String, attempts: u32 },

	#[error(
		"bridge on port {port} is running but no extension has registered{}; \
		 reload the tabctl extension or pass --profile for the matching browser",
		.expected.as_deref().map(|id| format!(" as {id}")).unwrap_or_default()
	)]
	ExtensionNotRegistered { port: u16, expected: Option<String> },

	#[error("`{command}` timed out: {message}")]
	Timeout { command: Command, message: String },

	#[error("extension disconnected while running `{command}`: {message}")]
	Disconnected { command: Command, message: String },

	#[error("{command} failed: {message}")]
	Command { command: Command, message: String },

	#[error(transparent)]
	Validation(#[from] ProtocolError),

	#[error("bridge rejected the request: {0}")]
	Rejected(String),

	#[error("{command}: unexpected result: {source}")]
	Decode {
		command: Command,
		#[source]
		source: serde_json::Error,
	},

	#[error("http: {0}")]
	Http(String),
}

/// How a relayed command ended, as reported by the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum Relayed {
	/// The extension answered (successfully or with a domain failure).
	Answered(ResponseEnvelope),
	NotRegistered,
	TimedOut(String),
	Disconnected(String),
	Rejected(String),
}

/// The bridge as seen from the CLI.
#[async_trait]
pub trait BridgeTransport: Send + Sync {
	/// Probes `port`; `None` when nothing bridge-like answers there.
	async fn health(&self, port: u16) -> Option<HealthStatus>;

	async fn post_command(&self, port: u16, envelope: &CommandEnvelope) -> Result<Relayed, TransportError>;
}

#[async_trait]
pub trait Sleeper: Send + Sync {
	async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
	async fn sleep(&self, duration: Duration) {
		tokio::time::sleep(duration).await;
	}
}

/// `reqwest` implementation talking to `http://127.0.0.1:<port>`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
	client: reqwest::Client,
}

impl Default for HttpTransport {
	fn default() -> Self {
		// Loopback traffic must never be routed through a configured proxy.
		let client = reqwest::Client::builder().no_proxy().build().unwrap_or_default();
		Self { client }
	}
}

impl HttpTransport {
	pub fn new() -> Self {
		Self::default()
	}

	fn url(port: u16, path: &str) -> String {
		format!("http://127.0.0.1:{port}{path}")
	}
}

#[async_trait]
impl BridgeTransport for HttpTransport {
	async fn health(&self, port: u16) -> Option<HealthStatus> {
		let response = match self.client.get(Self::url(port, "/health")).timeout(HEALTH_TIMEOUT).send().await {
			Ok(response) => response,
			Err(err) => {
				trace!(target = "tabctl.transport", port, error = %err, "no bridge");
				return None;
			}
		};
		match response.status() {
			StatusCode::OK | StatusCode::SERVICE_UNAVAILABLE => response.json::<HealthStatus>().await.ok(),
			_ => None,
		}
	}

	async fn post_command(&self, port: u16, envelope: &CommandEnvelope) -> Result<Relayed, TransportError> {
		let response = self
			.client
			.post(Self::url(port, "/command"))
			.json(envelope)
			.timeout(envelope.timeout() + RESPONSE_GRACE)
			.send()
			.await
			.map_err(|err| {
				if err.is_connect() {
					// The bridge went away after answering the health probe.
					TransportError::BridgeUnreachable {
						ports: describe_ports(&[port]),
						attempts: 1,
					}
				} else {
					TransportError::Http(err.to_string())
				}
			})?;

		let status = response.status();
		let body: ResponseEnvelope = response.json().await.map_err(|err| TransportError::Http(err.to_string()))?;
		if status == StatusCode::OK {
			return Ok(Relayed::Answered(body));
		}
		let message = body.error.unwrap_or_else(|| status.to_string());
		Ok(match status {
			StatusCode::SERVICE_UNAVAILABLE => Relayed::NotRegistered,
			StatusCode::GATEWAY_TIMEOUT => Relayed::TimedOut(message),
			StatusCode::BAD_GATEWAY => Relayed::Disconnected(message),
			_ => Relayed::Rejected(message),
		})
	}
}

/// Bounded readiness probing: `attempts` rounds over all candidate ports,
/// sleeping `delay` between rounds but not after the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
	pub attempts: u32,
	pub delay: Duration,
}

impl Default for ProbePolicy {
	fn default() -> Self {
		Self {
			attempts: 5,
			delay: Duration::from_millis(500),
		}
	}
}

pub struct Client<T, S = TokioSleeper> {
	transport: T,
	sleeper: S,
	ports: Vec<u16>,
	probe: ProbePolicy,
	extension_id: Option<String>,
	timeout: Option<Duration>,
}

impl<T: BridgeTransport> Client<T> {
	pub fn new(transport: T, ports: Vec<u16>) -> Self {
		Self::with_sleeper(transport, TokioSleeper, ports)
	}
}

impl<T: BridgeTransport, S: Sleeper> Client<T, S> {
	pub fn with_sleeper(transport: T, sleeper: S, ports: Vec<u16>) -> Self {
		Self {
			transport,
			sleeper,
			ports,
			probe: ProbePolicy::default(),
			extension_id: None,
			timeout: None,
		}
	}

	pub fn probe(mut self, probe: ProbePolicy) -> Self {
		self.probe = probe;
		self
	}

	/// Only accept a bridge whose registered extension has this id.
	pub fn extension_id(mut self, extension_id: Option<String>) -> Self {
		self.extension_id = extension_id;
		self
	}

	/// Overrides every command's default deadline.
	pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
		self.timeout = timeout;
		self
	}

	pub fn transport(&self) -> &T {
		&self.transport
	}

	fn accepts(&self, status: &HealthStatus) -> bool {
		status.is_ready()
			&& match &self.extension_id {
				Some(expected) => status.extension_id.as_deref() == Some(expected.as_str()),
				None => true,
			}
	}

	/// Finds a ready bridge, retrying while the bridge or extension starts.
	pub async fn find_bridge(&self) -> Result<u16, TransportError> {
		let mut answered = None;
		for attempt in 1..=self.probe.attempts {
			for &port in &self.ports {
				match self.transport.health(port).await {
					Some(status) if self.accepts(&status) => {
						debug!(target = "tabctl.transport", port, attempt, "bridge ready");
						return Ok(port);
					}
					Some(status) => {
						trace!(target = "tabctl.transport", port, ?status, "bridge not usable");
						answered.get_or_insert(port);
					}
					None => {}
				}
			}
			if attempt < self.probe.attempts {
				self.sleeper.sleep(self.probe.delay).await;
			}
		}

		Err(match answered {
			Some(port) => TransportError::ExtensionNotRegistered {
				port,
				expected: self.extension_id.clone(),
			},
			None => TransportError::BridgeUnreachable {
				ports: describe_ports(&self.ports),
				attempts: self.probe.attempts,
			},
		})
	}

	/// Validates `payload`, relays it and decodes the typed result.
	pub async fn send<C: CommandSpec>(&self, payload: &C) -> Result<C::Output, TransportError> {
		let mut envelope = CommandEnvelope::new(uuid::Uuid::new_v4().to_string(), payload)?;
		if let Some(timeout) = self.timeout {
			envelope = envelope.with_timeout(timeout);
		}

		let port = self.find_bridge().await?;
		debug!(target = "tabctl.transport", port, id = %envelope.id, command = %C::COMMAND, "sending");

		let value = match self.transport.post_command(port, &envelope).await? {
			Relayed::Answered(response) => response.into_result().map_err(|message| TransportError::Command {
				command: C::COMMAND,
				message,
			})?,
			Relayed::NotRegistered => {
				return Err(TransportError::ExtensionNotRegistered {
					port,
					expected: self.extension_id.clone(),
				});
			}
			Relayed::TimedOut(message) => {
				return Err(TransportError::Timeout {
					command: C::COMMAND,
					message,
				});
			}
			Relayed::Disconnected(message) => {
				return Err(TransportError::Disconnected {
					command: C::COMMAND,
					message,
				});
			}
			Relayed::Rejected(message) => return Err(TransportError::Rejected(message)),
		};

		serde_json::from_value(value).map_err(|source| TransportError::Decode {
			command: C::COMMAND,
			source,
		})
	}
}

fn describe_ports(ports: &[u16]) -> String {
	match (ports.first(), ports.last()) {
		(Some(first), Some(last)) if ports.len() > 1 => format!("ports {first}-{last}"),
		(Some(only), _) => format!("port {only}"),
		_ => "no ports".to_string(),
	}
}
