use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::{Command, MAX_COMMAND_TIMEOUT};
use crate::commands::CommandSpec;
use crate::error::ProtocolError;

/// A request travelling from the CLI to the extension.
///
/// `command` stays a string on the wire so that a peer running a newer
/// command set is answered with [`ProtocolError::UnknownCommand`] by the
/// extension instead of being rejected as malformed JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
	pub id: String,
	pub command: String,
	#[serde(default)]
	pub data: Value,
	/// Caller-chosen deadline; the command's default applies when absent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timeout_ms: Option<u64>,
}

impl CommandEnvelope {
	/// Validates `payload` and wraps it for sending.
	pub fn new<C: CommandSpec>(id: impl Into<String>, payload: &C) -> Result<Self, ProtocolError> {
		payload.validate()?;
		let data = serde_json::to_value(payload).map_err(|source| ProtocolError::Decode { command: C::COMMAND, source })?;
		Ok(Self {
			id: id.into(),
			command: C::COMMAND.as_str().to_string(),
			data,
			timeout_ms: None,
		})
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout_ms = Some(timeout.as_millis() as u64);
		self
	}

	/// Resolves the command name against the closed command set.
	pub fn command(&self) -> Result<Command, ProtocolError> {
		self.command.parse()
	}

	/// Decodes and validates the typed payload.
	pub fn decode<C: CommandSpec>(&self) -> Result<C, ProtocolError> {
		let data = match &self.data {
			Value::Null => Value::Object(Default::default()),
			other => other.clone(),
		};
		let payload: C = serde_json::from_value(data).map_err(|source| ProtocolError::Decode { command: C::COMMAND, source })?;
		payload.validate()?;
		Ok(payload)
	}

	/// Effective deadline: the caller's choice clamped to [`MAX_COMMAND_TIMEOUT`],
	/// otherwise the command's default.
	pub fn timeout(&self) -> Duration {
		match self.timeout_ms {
			Some(ms) => Duration::from_millis(ms).min(MAX_COMMAND_TIMEOUT),
			None => self
				.command()
				.map(Command::default_timeout)
				.unwrap_or(crate::command::DEFAULT_COMMAND_TIMEOUT),
		}
	}
}

/// The single answer produced for a [`CommandEnvelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
	pub id: String,
	pub success: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl ResponseEnvelope {
	pub fn ok(id: impl Into<String>, result: Value) -> Self {
		Self {
			id: id.into(),
			success: true,
			result: Some(result),
			error: None,
		}
	}

	pub fn failure(id: impl Into<String>, error: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			success: false,
			result: None,
			error: Some(error.into()),
		}
	}

	/// Splits into the result value or the error message.
	pub fn into_result(self) -> Result<Value, String> {
		if self.success {
			Ok(self.result.unwrap_or(Value::Null))
		} else {
			Err(self.error.unwrap_or_else(|| "command failed without an error message".to_string()))
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
	/// Extension channel connected and registered.
	Ready,
	/// Bridge is listening but no registered extension is attached.
	Waiting,
}

/// Body of the bridge readiness probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
	pub status: HealthState,
	pub port: u16,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub extension_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub version: Option<String>,
	#[serde(default)]
	pub pending: usize,
}

impl HealthStatus {
	pub fn is_ready(&self) -> bool {
		self.status == HealthState::Ready
	}
}
