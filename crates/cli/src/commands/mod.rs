//! CLI command handlers.
//!
//! Every handler resolves its target tab, sends one or more typed commands
//! through the transport client and returns the data for the output
//! envelope.

mod admin;
mod logs;
mod page;
mod tabs;

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tabctl_protocol::{CommandSpec, ListTabs, TabId};
use tracing::debug;

use crate::bridge;
use crate::cli::{Cli, Commands};
use crate::error::{Result, TabctlError};
use crate::output::{self, ResultBuilder};
use crate::profile::ProfileStore;
use crate::target::{self, TabRef};
use crate::transport::{BridgeTransport, Client, HttpTransport, Sleeper, TokioSleeper};

/// Everything a handler needs: the bridge client, the profile and the
/// `--tab` reference given on the command line.
pub struct Ctx<T = HttpTransport, S = TokioSleeper> {
	client: Client<T, S>,
	store: ProfileStore,
	tab: Option<TabRef>,
}

impl Ctx {
	pub fn from_cli(cli: &Cli) -> Self {
		let store = ProfileStore::open(&cli.profile);
		let client = Client::new(HttpTransport::new(), bridge::candidate_ports())
			.extension_id(store.extension_id())
			.timeout(cli.timeout_ms.map(Duration::from_millis));
		Self::new(client, store, cli.tab)
	}
}

impl<T: BridgeTransport, S: Sleeper> Ctx<T, S> {
	pub fn new(client: Client<T, S>, store: ProfileStore, tab: Option<TabRef>) -> Self {
		Self { client, store, tab }
	}

	pub fn client(&self) -> &Client<T, S> {
		&self.client
	}

	pub fn store(&self) -> &ProfileStore {
		&self.store
	}

	pub async fn send<C: CommandSpec>(&self, payload: &C) -> Result<C::Output> {
		Ok(self.client.send(payload).await?)
	}

	/// Resolves the `--tab` flag, or the persisted active tab.
	pub async fn target_tab(&self) -> Result<TabId> {
		self.resolve_tab(self.tab).await
	}

	/// Resolves `reference`; ordinals are looked up in a fresh listing of
	/// every window so they always match `tabs list`.
	pub async fn resolve_tab(&self, reference: Option<TabRef>) -> Result<TabId> {
		let listing = match reference {
			Some(r) if r.needs_listing() => self.send(&ListTabs { current_window: false }).await?,
			_ => Vec::new(),
		};
		let tab_id = target::resolve(&listing, reference, self.store.active_tab())?;
		debug!(target = "tabctl.cli", ?reference, tab_id, "resolved tab");
		Ok(tab_id)
	}
}

/// Runs one parsed command line and prints its result envelope.
pub async fn dispatch(cli: Cli) -> Result<()> {
	if let Commands::Bridge(_) = cli.command {
		return bridge::run_native_host().await.map_err(TabctlError::Anyhow);
	}

	let format = cli.format;
	let builder = ResultBuilder::new(cli.command.name());
	let mut ctx = Ctx::from_cli(&cli);
	let data = execute(&mut ctx, cli.command).await?;
	output::print_result(&builder.data(data).build(), format);
	Ok(())
}

pub async fn execute<T: BridgeTransport, S: Sleeper>(ctx: &mut Ctx<T, S>, command: Commands) -> Result<Value> {
	match command {
		Commands::Tabs(action) => tabs::execute(ctx, action).await,
		Commands::Exec(args) => page::exec(ctx, args).await,
		Commands::Screenshot(args) => page::screenshot(ctx, args).await,
		Commands::Logs(action) => logs::logs(ctx, action).await,
		Commands::Requests(action) => logs::requests(ctx, action).await,
		Commands::Storage => page::storage(ctx).await,
		Commands::Click(args) => page::click(ctx, args).await,
		Commands::Fill(args) => page::fill(ctx, args).await,
		Commands::Ping => admin::ping(ctx).await,
		Commands::ReloadExtension => admin::reload_extension(ctx).await,
		Commands::Profile(action) => admin::profile(ctx, action).await,
		Commands::History(args) => admin::history(ctx, args).await,
		Commands::Bridge(_) => Err(TabctlError::InvalidInput(
			"the bridge runs as its own process; start it with `tabctl bridge`".into(),
		)),
	}
}

fn to_data<T: Serialize>(value: T) -> Result<Value> {
	Ok(serde_json::to_value(value)?)
}
