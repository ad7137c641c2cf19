//! Command handlers against a scripted bridge: tab resolution, profile
//! persistence and artifact writing.

mod support;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use support::{CountingSleeper, FakeTransport, ready, tab};
use tabctl_cli::cli::{Commands, OpenArgs, ScreenshotArgs, TabsAction};
use tabctl_cli::commands::{Ctx, execute};
use tabctl_cli::error::TabctlError;
use tabctl_cli::profile::ProfileStore;
use tabctl_cli::target::{ResolveError, TabRef};
use tabctl_cli::transport::{Client, Relayed};
use tabctl_protocol::{CommandEnvelope, ResponseEnvelope};
use tempfile::TempDir;

const PORT: u16 = 19820;

/// Browser with tabs 501..=503; other commands echo their payload.
fn browser(envelope: &CommandEnvelope) -> Relayed {
	let result = match envelope.command.as_str() {
		"list_tabs" => json!([tab(501, 0), tab(502, 1), tab(503, 2)]),
		"create_tab" => tab(777, 3),
		"close_tab" => json!({ "ok": true }),
		"get_tab_storage" => json!({ "origin": "https://example.com", "cookies": "a=1" }),
		"capture_screenshot" => json!({ "format": "png", "data": STANDARD.encode(b"\x89PNG fake") }),
		_ => envelope.data.clone(),
	};
	Relayed::Answered(ResponseEnvelope::ok(envelope.id.clone(), result))
}

fn ctx(dir: &TempDir, tab: Option<TabRef>) -> Ctx<FakeTransport, CountingSleeper> {
	let transport = FakeTransport::new(browser).with_health(PORT, vec![ready(PORT, "ext")]);
	let client = Client::with_sleeper(transport, CountingSleeper::default(), vec![PORT]);
	Ctx::new(client, ProfileStore::open_at(dir.path().join("config.json"), "default"), tab)
}

fn reopen(dir: &TempDir) -> ProfileStore {
	ProfileStore::open_at(dir.path().join("config.json"), "default")
}

#[tokio::test]
async fn select_resolves_ordinal_and_persists() {
	let dir = TempDir::new().unwrap();
	let mut ctx = ctx(&dir, None);

	let data = execute(&mut ctx, Commands::Tabs(TabsAction::Select { tab: TabRef::Ordinal(2) }))
		.await
		.unwrap();
	assert_eq!(data["activeTabId"], 502);
	assert_eq!(reopen(&dir).active_tab(), Some(502));
	assert_eq!(ctx.client().transport().posted_commands(), ["list_tabs"]);
}

#[tokio::test]
async fn persisted_tab_is_used_without_listing() {
	let dir = TempDir::new().unwrap();
	reopen(&dir).set_active_tab(Some(503)).unwrap();
	let mut ctx = ctx(&dir, None);

	let data = execute(&mut ctx, Commands::Storage).await.unwrap();
	assert_eq!(data["origin"], "https://example.com");

	let posted = ctx.client().transport().posted.lock();
	assert_eq!(posted.len(), 1);
	assert_eq!(posted[0].1.command, "get_tab_storage");
	assert_eq!(posted[0].1.data["tabId"], 503);
}

#[tokio::test]
async fn explicit_tab_overrides_persisted_one() {
	let dir = TempDir::new().unwrap();
	reopen(&dir).set_active_tab(Some(503)).unwrap();
	let mut ctx = ctx(&dir, Some(TabRef::Ordinal(1)));

	execute(&mut ctx, Commands::Storage).await.unwrap();
	let posted = ctx.client().transport().posted.lock();
	assert_eq!(posted[1].1.data["tabId"], 501);
}

#[tokio::test]
async fn missing_selection_fails_before_sending() {
	let dir = TempDir::new().unwrap();
	let mut ctx = ctx(&dir, None);

	let err = execute(&mut ctx, Commands::Storage).await.unwrap_err();
	assert!(matches!(err, TabctlError::Resolve(ResolveError::NoTabSelected)));
	assert!(ctx.client().transport().posted_commands().is_empty());
}

#[tokio::test]
async fn ordinal_beyond_listing_is_rejected() {
	let dir = TempDir::new().unwrap();
	let mut ctx = ctx(&dir, Some(TabRef::Ordinal(5)));

	let err = execute(&mut ctx, Commands::Storage).await.unwrap_err();
	assert!(matches!(
		err,
		TabctlError::Resolve(ResolveError::OrdinalOutOfRange { ordinal: 5, count: 3 })
	));
	assert_eq!(ctx.client().transport().posted_commands(), ["list_tabs"]);
}

#[tokio::test]
async fn open_with_select_persists_new_tab() {
	let dir = TempDir::new().unwrap();
	let mut ctx = ctx(&dir, None);

	let data = execute(
		&mut ctx,
		Commands::Tabs(TabsAction::Open(OpenArgs {
			url: Some("https://example.com/new".into()),
			background: true,
			select: true,
		})),
	)
	.await
	.unwrap();
	assert_eq!(data["id"], 777);
	assert_eq!(reopen(&dir).active_tab(), Some(777));

	let posted = ctx.client().transport().posted.lock();
	assert_eq!(posted[0].1.data["active"], false);
}

#[tokio::test]
async fn closing_selected_tab_clears_selection() {
	let dir = TempDir::new().unwrap();
	reopen(&dir).set_active_tab(Some(502)).unwrap();
	let mut ctx = ctx(&dir, None);

	let data = execute(&mut ctx, Commands::Tabs(TabsAction::Close { tab: None })).await.unwrap();
	assert_eq!(data["closed"], 502);
	assert_eq!(reopen(&dir).active_tab(), None);
}

#[tokio::test]
async fn screenshot_is_decoded_to_file() {
	let dir = TempDir::new().unwrap();
	let mut ctx = ctx(&dir, Some(TabRef::Id(42)));
	let path = dir.path().join("shots/page.png");

	let data = execute(
		&mut ctx,
		Commands::Screenshot(ScreenshotArgs {
			output: Some(path.clone()),
			full_page: true,
			quality: None,
		}),
	)
	.await
	.unwrap();

	assert_eq!(std::fs::read(&path).unwrap(), b"\x89PNG fake");
	assert_eq!(data["bytes"], 9);
	assert_eq!(data["tabId"], 42);

	let posted = ctx.client().transport().posted.lock();
	assert_eq!(posted[0].1.data["fullPage"], true);
	assert_eq!(posted[0].1.data["format"], "png");
}
