use serde_json::{Value, json};
use tabctl_protocol::{GetHistory, GetProfileInfo, Ping, ReloadExtension};

use super::{Ctx, to_data};
use crate::cli::{HistoryArgs, ProfileAction};
use crate::error::Result;
use crate::transport::{BridgeTransport, Sleeper};

pub async fn ping<T: BridgeTransport, S: Sleeper>(ctx: &Ctx<T, S>) -> Result<Value> {
	to_data(ctx.send(&Ping {}).await?)
}

pub async fn reload_extension<T: BridgeTransport, S: Sleeper>(ctx: &Ctx<T, S>) -> Result<Value> {
	to_data(ctx.send(&ReloadExtension {}).await?)
}

pub async fn history<T: BridgeTransport, S: Sleeper>(ctx: &Ctx<T, S>, args: HistoryArgs) -> Result<Value> {
	let entries = ctx.send(&GetHistory { limit: args.limit }).await?;
	Ok(json!({ "count": entries.len(), "entries": entries }))
}

pub async fn profile<T: BridgeTransport, S: Sleeper>(ctx: &mut Ctx<T, S>, action: ProfileAction) -> Result<Value> {
	match action {
		ProfileAction::Info => to_data(ctx.send(&GetProfileInfo {}).await?),
		ProfileAction::Show => Ok(describe(ctx)),
		ProfileAction::SetExtension { id } => {
			let id = Some(id.trim().to_string()).filter(|id| !id.is_empty() && id != "none");
			ctx.store.set_extension_id(id)?;
			Ok(describe(ctx))
		}
	}
}

fn describe<T, S>(ctx: &Ctx<T, S>) -> Value {
	let profile = ctx.store.profile();
	json!({
		"name": ctx.store.name(),
		"path": ctx.store.path(),
		"activeTabId": profile.active_tab_id,
		"extensionId": profile.extension_id,
	})
}
