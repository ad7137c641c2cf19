use thiserror::Error;

use crate::command::Command;

/// Contract violations detected before or while decoding a command.
#[derive(Debug, Error)]
pub enum ProtocolError {
	#[error("no handler registered for command `{0}`")]
	UnknownCommand(String),

	#[error("{command}: missing required field `{field}`")]
	MissingField { command: Command, field: &'static str },

	#[error("{command}: invalid `{field}`: {reason}")]
	InvalidField {
		command: Command,
		field: &'static str,
		reason: String,
	},

	#[error("{command}: {message}")]
	Conflict { command: Command, message: String },

	#[error("{command}: malformed payload: {source}")]
	Decode {
		command: Command,
		#[source]
		source: serde_json::Error,
	},
}
