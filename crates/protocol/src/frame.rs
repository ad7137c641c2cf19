//! Frames exchanged on the native-messaging channel.
//!
//! The channel is a single ordered byte stream between the bridge and the
//! extension. The extension must send [`ExtensionMessage::Register`] and
//! receive [`BridgeMessage::Registered`] before the bridge relays any
//! [`BridgeMessage::Command`].

use serde::{Deserialize, Serialize};

use crate::envelope::{CommandEnvelope, ResponseEnvelope};

/// Name the bridge is registered under in the browser's native-messaging
/// host manifest.
pub const NATIVE_HOST_NAME: &str = "dev.tabctl.bridge";

/// Identity the extension announces when it (re)connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
	pub extension_id: String,
	pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameLogLevel {
	Debug,
	Info,
	Warn,
	Error,
}

/// Message sent from the extension to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtensionMessage {
	/// Handshake; required once per connection before commands flow.
	Register(Registration),
	/// Answer to a previously relayed command.
	Response(ResponseEnvelope),
	/// Keeps the extension's background worker from being suspended.
	KeepAlive,
	/// Diagnostic line to surface in the bridge's log.
	Log { level: FrameLogLevel, message: String },
}

/// Message sent from the bridge to the extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
	/// Handshake accepted.
	Registered {
		/// Bridge version for compatibility checks.
		version: String,
		/// Local HTTP port the CLI reaches the bridge on.
		port: u16,
	},
	/// A command to dispatch.
	Command(CommandEnvelope),
	/// Protocol violation reported back to the extension.
	Error { message: String },
}
