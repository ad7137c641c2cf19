use serde_json::{Value, json};
use tabctl_protocol::{CloseTab, CreateTab, FocusTab, ListTabs, NavigateTab, RefreshTab};
use tracing::info;

use super::{Ctx, to_data};
use crate::cli::TabsAction;
use crate::error::Result;
use crate::transport::{BridgeTransport, Sleeper};

pub async fn execute<T: BridgeTransport, S: Sleeper>(ctx: &mut Ctx<T, S>, action: TabsAction) -> Result<Value> {
	match action {
		TabsAction::List { current_window } => {
			let tabs = ctx.send(&ListTabs { current_window }).await?;
			let active = ctx.store.active_tab();
			let rows: Vec<Value> = tabs
				.iter()
				.enumerate()
				.map(|(i, tab)| {
					json!({
						"ordinal": i + 1,
						"id": tab.id,
						"windowId": tab.window_id,
						"title": tab.title,
						"url": tab.url,
						"active": tab.active,
						"selected": Some(tab.id) == active,
					})
				})
				.collect();
			Ok(json!({ "count": rows.len(), "tabs": rows }))
		}
		TabsAction::Open(args) => {
			let tab = ctx
				.send(&CreateTab {
					url: args.url,
					active: !args.background,
				})
				.await?;
			if args.select {
				ctx.store.set_active_tab(Some(tab.id))?;
				info!(target = "tabctl.cli", tab_id = tab.id, profile = ctx.store.name(), "selected new tab");
			}
			to_data(tab)
		}
		TabsAction::Close { tab } => {
			let tab_id = ctx.resolve_tab(tab.or(ctx.tab)).await?;
			ctx.send(&CloseTab { tab_id }).await?;
			if ctx.store.active_tab() == Some(tab_id) {
				ctx.store.set_active_tab(None)?;
			}
			Ok(json!({ "closed": tab_id }))
		}
		TabsAction::Navigate { url } => {
			let tab_id = ctx.target_tab().await?;
			to_data(ctx.send(&NavigateTab { tab_id, url }).await?)
		}
		TabsAction::Refresh { hard } => {
			let tab_id = ctx.target_tab().await?;
			ctx.send(&RefreshTab {
				tab_id,
				bypass_cache: hard,
			})
			.await?;
			Ok(json!({ "tabId": tab_id, "bypassCache": hard }))
		}
		TabsAction::Focus { tab } => {
			let tab_id = ctx.resolve_tab(tab.or(ctx.tab)).await?;
			to_data(ctx.send(&FocusTab { tab_id }).await?)
		}
		TabsAction::Select { tab } => {
			let tab_id = ctx.resolve_tab(Some(tab)).await?;
			ctx.store.set_active_tab(Some(tab_id))?;
			info!(target = "tabctl.cli", tab_id, profile = ctx.store.name(), "selected tab");
			Ok(json!({ "profile": ctx.store.name(), "activeTabId": tab_id }))
		}
	}
}
