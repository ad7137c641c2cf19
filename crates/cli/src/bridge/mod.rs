//! Command Relay Bridge.
//!
//! Runs as the browser's native-messaging host: frames arrive on stdin and
//! leave on stdout, while CLI invocations reach the same process over a
//! loopback HTTP port picked from [`PORT_RANGE`].

pub mod native;
pub mod relay;
pub mod server;

use std::ops::RangeInclusive;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

pub use relay::{Relay, RelayError};
pub use server::{bind, router, run_channel, serve};

pub const PORT_RANGE: RangeInclusive<u16> = 19820..=19829;

/// Pins both the bridge and the client to a single port.
pub const PORT_ENV: &str = "TABCTL_PORT";

/// Ports to bind (bridge) or probe (client), in order.
pub fn candidate_ports() -> Vec<u16> {
	match std::env::var(PORT_ENV).ok().map(|raw| raw.trim().parse::<u16>()) {
		Some(Ok(port)) => vec![port],
		Some(Err(err)) => {
			warn!(target = "tabctl.bridge", error = %err, "ignoring invalid {PORT_ENV}");
			PORT_RANGE.collect()
		}
		None => PORT_RANGE.collect(),
	}
}

/// Whether the browser launched this process as a native-messaging host.
///
/// Chromium passes the caller's origin (`chrome-extension://<id>/`) as the
/// first argument.
pub fn launched_by_browser<I, S>(args: I) -> bool
where
	I: IntoIterator<Item = S>,
	S: AsRef<str>,
{
	args.into_iter().skip(1).any(|arg| arg.as_ref().starts_with("chrome-extension://"))
}

/// Serves until the browser closes stdin.
pub async fn run_native_host() -> Result<()> {
	let (listener, port) = bind(&candidate_ports()).await?;
	let relay = Arc::new(Relay::new(port));
	info!(target = "tabctl.bridge", port, pid = std::process::id(), "bridge listening");

	let server = tokio::spawn(serve(listener, Arc::clone(&relay)));
	run_channel(Arc::clone(&relay), tokio::io::stdin(), tokio::io::stdout()).await;
	server.abort();

	info!(target = "tabctl.bridge", "bridge shutting down");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn browser_origin_argument_selects_host_mode() {
		assert!(launched_by_browser(["tabctl", "chrome-extension://abcdef/"]));
		assert!(launched_by_browser(["tabctl", "--parent-window=0", "chrome-extension://abcdef/"]));
		assert!(!launched_by_browser(["tabctl", "tabs", "list"]));
		assert!(!launched_by_browser(["chrome-extension://abcdef/"]));
	}

	#[test]
	fn default_range_has_ten_ports() {
		let ports: Vec<u16> = PORT_RANGE.collect();
		assert_eq!(ports.len(), 10);
		assert_eq!(ports[0], 19820);
	}
}
