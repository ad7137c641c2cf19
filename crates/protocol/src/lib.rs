//! Wire contract shared by the `tabctl` CLI, the native bridge and the
//! browser extension.
//!
//! Three processes speak this protocol:
//!
//! 1. The CLI posts a [`CommandEnvelope`] to the bridge over local HTTP.
//! 2. The bridge forwards it to the extension as a [`BridgeMessage::Command`]
//!    frame on the native-messaging channel.
//! 3. The extension answers with an [`ExtensionMessage::Response`] frame
//!    carrying a [`ResponseEnvelope`], which the bridge hands back to the CLI.
//!
//! Every command has a payload type implementing [`CommandSpec`], which fixes
//! the [`Command`] name, the typed result and the validation that runs before
//! anything is sent.

mod command;
mod commands;
mod envelope;
mod error;
mod frame;
mod types;

pub use command::{Command, DEFAULT_COMMAND_TIMEOUT, MAX_COMMAND_TIMEOUT, SCREENSHOT_TIMEOUT};
pub use commands::*;
pub use envelope::{CommandEnvelope, HealthState, HealthStatus, ResponseEnvelope};
pub use error::ProtocolError;
pub use frame::{BridgeMessage, ExtensionMessage, FrameLogLevel, NATIVE_HOST_NAME, Registration};
pub use types::*;
