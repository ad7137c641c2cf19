//! `tabctl`: drive a running browser from the command line.
//!
//! The same binary plays two roles. Launched by the browser it becomes the
//! native-messaging [`bridge`]; launched by a user it parses a [`cli`]
//! command, finds the bridge through the [`transport`] client and prints the
//! extension's answer as a structured envelope.

pub mod bridge;
pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
pub mod profile;
pub mod target;
pub mod transport;
