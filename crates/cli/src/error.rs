use thiserror::Error;

use crate::output::{CommandError, ErrorCode};
use crate::target::ResolveError;
use crate::transport::TransportError;

pub type Result<T> = std::result::Result<T, TabctlError>;

#[derive(Debug, Error)]
pub enum TabctlError {
	#[error(transparent)]
	Transport(#[from] TransportError),

	#[error(transparent)]
	Resolve(#[from] ResolveError),

	#[error("{0}")]
	InvalidInput(String),

	#[error("{action} {path}: {source}")]
	File {
		action: &'static str,
		path: std::path::PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl From<tabctl_protocol::ProtocolError> for TabctlError {
	fn from(err: tabctl_protocol::ProtocolError) -> Self {
		TabctlError::Transport(TransportError::Validation(err))
	}
}

impl TabctlError {
	/// Convert this error to a CommandError for structured output
	pub fn to_command_error(&self) -> CommandError {
		let (code, details) = match self {
			TabctlError::Transport(err) => match err {
				TransportError::BridgeUnreachable { ports, attempts } => (
					ErrorCode::BridgeUnreachable,
					Some(serde_json::json!({ "ports": ports, "attempts": attempts })),
				),
				TransportError::ExtensionNotRegistered { port, expected } => (
					ErrorCode::ExtensionNotRegistered,
					Some(serde_json::json!({ "port": port, "extensionId": expected })),
				),
				TransportError::Timeout { command, .. } => {
					(ErrorCode::Timeout, Some(serde_json::json!({ "command": command })))
				}
				TransportError::Disconnected { command, .. } => {
					(ErrorCode::Disconnected, Some(serde_json::json!({ "command": command })))
				}
				TransportError::Command { command, .. } => {
					(ErrorCode::CommandFailed, Some(serde_json::json!({ "command": command })))
				}
				TransportError::Validation(_) | TransportError::Rejected(_) => (ErrorCode::InvalidInput, None),
				TransportError::Decode { .. } | TransportError::Http(_) => (ErrorCode::InternalError, None),
			},
			TabctlError::Resolve(_) | TabctlError::InvalidInput(_) => (ErrorCode::InvalidInput, None),
			TabctlError::File { path, .. } => (ErrorCode::IoError, Some(serde_json::json!({ "path": path }))),
			TabctlError::Io(_) => (ErrorCode::IoError, None),
			TabctlError::Json(_) | TabctlError::Anyhow(_) => (ErrorCode::InternalError, None),
		};

		CommandError {
			code,
			message: self.to_string(),
			details,
		}
	}
}
