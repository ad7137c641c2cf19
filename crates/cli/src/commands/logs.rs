use serde_json::{Value, json};
use tabctl_protocol::{ClearTabLogs, ClearTabRequests, GetTabLogs, GetTabRequests, StartLogging, StopLogging};

use super::{Ctx, to_data};
use crate::cli::{LogsAction, RequestsAction};
use crate::error::Result;
use crate::transport::{BridgeTransport, Sleeper};

pub async fn logs<T: BridgeTransport, S: Sleeper>(ctx: &Ctx<T, S>, action: LogsAction) -> Result<Value> {
	let tab_id = ctx.target_tab().await?;
	match action {
		LogsAction::Start => to_data(ctx.send(&StartLogging { tab_id }).await?),
		LogsAction::Stop => to_data(ctx.send(&StopLogging { tab_id }).await?),
		LogsAction::Show { limit } => {
			let entries = ctx.send(&GetTabLogs { tab_id, limit }).await?;
			Ok(json!({ "tabId": tab_id, "count": entries.len(), "entries": entries }))
		}
		LogsAction::Clear => to_data(ctx.send(&ClearTabLogs { tab_id }).await?),
	}
}

pub async fn requests<T: BridgeTransport, S: Sleeper>(ctx: &Ctx<T, S>, action: RequestsAction) -> Result<Value> {
	let tab_id = ctx.target_tab().await?;
	match action {
		RequestsAction::Show { limit } => {
			let entries = ctx.send(&GetTabRequests { tab_id, limit }).await?;
			Ok(json!({ "tabId": tab_id, "count": entries.len(), "requests": entries }))
		}
		RequestsAction::Clear => to_data(ctx.send(&ClearTabRequests { tab_id }).await?),
	}
}
