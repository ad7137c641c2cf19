//! The bridge's two faces: the local HTTP listener and the native channel pump.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tabctl_protocol::{BridgeMessage, CommandEnvelope, ExtensionMessage, HealthStatus, ResponseEnvelope};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use super::native::{FrameError, read_frame, write_frame};
use super::relay::{Relay, RelayError};

pub fn router(relay: Arc<Relay>) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/command", post(command))
		.with_state(relay)
}

async fn health(State(relay): State<Arc<Relay>>) -> (StatusCode, Json<HealthStatus>) {
	let status = relay.health();
	let code = if status.is_ready() {
		StatusCode::OK
	} else {
		StatusCode::SERVICE_UNAVAILABLE
	};
	(code, Json(status))
}

async fn command(State(relay): State<Arc<Relay>>, body: Bytes) -> (StatusCode, Json<ResponseEnvelope>) {
	let envelope: CommandEnvelope = match serde_json::from_slice(&body) {
		Ok(envelope) => envelope,
		Err(err) => {
			return (
				StatusCode::BAD_REQUEST,
				Json(ResponseEnvelope::failure("", format!("malformed command envelope: {err}"))),
			);
		}
	};

	let caller_id = envelope.id.clone();
	match relay.relay(envelope).await {
		Ok(response) => (StatusCode::OK, Json(response)),
		Err(err) => (status_for(&err), Json(ResponseEnvelope::failure(caller_id, err.to_string()))),
	}
}

pub fn status_for(err: &RelayError) -> StatusCode {
	match err {
		RelayError::NotRegistered => StatusCode::SERVICE_UNAVAILABLE,
		RelayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
		RelayError::Disconnected | RelayError::Undeliverable(_) => StatusCode::BAD_GATEWAY,
	}
}

/// Binds the first free loopback port among `ports`.
pub async fn bind(ports: &[u16]) -> Result<(TcpListener, u16)> {
	let mut last_err = None;
	for &port in ports {
		match TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port))).await {
			Ok(listener) => {
				let bound = listener.local_addr().context("reading bound address")?.port();
				return Ok((listener, bound));
			}
			Err(err) => {
				if err.kind() == ErrorKind::AddrInUse {
					debug!(target = "tabctl.bridge", port, "port in use");
				} else {
					warn!(target = "tabctl.bridge", port, error = %err, "bind failed");
				}
				last_err = Some(err);
			}
		}
	}
	Err(match last_err {
		Some(err) => anyhow!(err).context(format!("no free bridge port among {ports:?}")),
		None => anyhow!("no bridge ports configured"),
	})
}

pub async fn serve(listener: TcpListener, relay: Arc<Relay>) -> Result<()> {
	axum::serve(listener, router(relay)).await.context("bridge HTTP server failed")
}

/// Pumps frames between the relay and one extension channel until the
/// reader hits end of stream or an unrecoverable framing error.
pub async fn run_channel<R, W>(relay: Arc<Relay>, mut reader: R, mut writer: W)
where
	R: AsyncRead + Unpin,
	W: AsyncWrite + Unpin + Send + 'static,
{
	let (generation, outbound) = relay.connect();

	let writer_task = tokio::spawn({
		let relay = Arc::clone(&relay);
		async move {
			let mut outbound = UnboundedReceiverStream::new(outbound);
			while let Some(message) = outbound.next().await {
				match write_frame(&mut writer, &message).await {
					Ok(()) => {}
					Err(err @ (FrameError::TooLarge { .. } | FrameError::Json(_))) => {
						warn!(target = "tabctl.bridge", error = %err, "outbound frame rejected");
						if let BridgeMessage::Command(envelope) = &message {
							relay.fail(&envelope.id, RelayError::Undeliverable(err.to_string()));
						}
					}
					Err(err) => {
						warn!(target = "tabctl.bridge", error = %err, "writing to extension failed");
						break;
					}
				}
			}
		}
	});

	loop {
		match read_frame::<_, ExtensionMessage>(&mut reader).await {
			Ok(Some(message)) => relay.on_extension_message(generation, message),
			Ok(None) => {
				info!(target = "tabctl.bridge", "extension channel reached end of stream");
				break;
			}
			Err(err) if err.is_recoverable() => {
				warn!(target = "tabctl.bridge", error = %err, "skipping undecodable frame");
			}
			Err(err) => {
				warn!(target = "tabctl.bridge", error = %err, "extension channel failed");
				break;
			}
		}
	}

	relay.disconnect(generation);
	writer_task.abort();
}
