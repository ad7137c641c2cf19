use std::io::Read;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tabctl_protocol::{CaptureScreenshot, ClickElement, ExecuteScript, FillInput, GetTabStorage, ImageFormat};
use tracing::debug;

use super::{Ctx, to_data};
use crate::cli::{ClickArgs, ExecArgs, FillArgs, ScreenshotArgs};
use crate::error::{Result, TabctlError};
use crate::transport::{BridgeTransport, Sleeper};

pub async fn exec<T: BridgeTransport, S: Sleeper>(ctx: &Ctx<T, S>, args: ExecArgs) -> Result<Value> {
	let code = match (args.code, args.file) {
		(Some(code), _) => code,
		(None, Some(path)) => read_script(&path).await?,
		(None, None) => return Err(TabctlError::InvalidInput("pass CODE or --file".into())),
	};
	let tab_id = ctx.target_tab().await?;
	to_data(
		ctx.send(&ExecuteScript {
			tab_id,
			code,
			await_promise: !args.no_await,
		})
		.await?,
	)
}

async fn read_script(path: &Path) -> Result<String> {
	if path == Path::new("-") {
		let mut code = String::new();
		std::io::stdin().read_to_string(&mut code)?;
		return Ok(code);
	}
	tokio::fs::read_to_string(path).await.map_err(|source| TabctlError::File {
		action: "read",
		path: path.to_path_buf(),
		source,
	})
}

/// Picks the capture format from the destination's extension.
fn format_for(output: Option<&Path>, quality: Option<u8>) -> ImageFormat {
	let ext = output
		.and_then(|p| p.extension())
		.and_then(|e| e.to_str())
		.map(str::to_ascii_lowercase);
	match ext.as_deref() {
		Some("jpg" | "jpeg") => ImageFormat::Jpeg,
		Some(_) => ImageFormat::Png,
		None if quality.is_some() => ImageFormat::Jpeg,
		None => ImageFormat::Png,
	}
}

pub async fn screenshot<T: BridgeTransport, S: Sleeper>(ctx: &Ctx<T, S>, args: ScreenshotArgs) -> Result<Value> {
	let format = format_for(args.output.as_deref(), args.quality);
	let tab_id = ctx.target_tab().await?;
	let shot = ctx
		.send(&CaptureScreenshot {
			tab_id,
			format,
			quality: args.quality,
			full_page: args.full_page,
		})
		.await?;

	let bytes = STANDARD
		.decode(shot.data.as_bytes())
		.map_err(|err| TabctlError::InvalidInput(format!("extension returned invalid image data: {err}")))?;
	let path = args
		.output
		.unwrap_or_else(|| PathBuf::from(format!("screenshot-{tab_id}.{}", shot.format.extension())));
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		tokio::fs::create_dir_all(parent).await.map_err(|source| TabctlError::File {
			action: "create directory for",
			path: path.clone(),
			source,
		})?;
	}
	tokio::fs::write(&path, &bytes).await.map_err(|source| TabctlError::File {
		action: "write",
		path: path.clone(),
		source,
	})?;
	debug!(target = "tabctl.cli", path = %path.display(), bytes = bytes.len(), "screenshot saved");

	Ok(json!({
		"tabId": tab_id,
		"path": path,
		"format": shot.format,
		"bytes": bytes.len(),
	}))
}

pub async fn storage<T: BridgeTransport, S: Sleeper>(ctx: &Ctx<T, S>) -> Result<Value> {
	let tab_id = ctx.target_tab().await?;
	to_data(ctx.send(&GetTabStorage { tab_id }).await?)
}

pub async fn click<T: BridgeTransport, S: Sleeper>(ctx: &Ctx<T, S>, args: ClickArgs) -> Result<Value> {
	let tab_id = ctx.target_tab().await?;
	to_data(
		ctx.send(&ClickElement {
			tab_id,
			selector: args.selector,
			text: args.text,
		})
		.await?,
	)
}

pub async fn fill<T: BridgeTransport, S: Sleeper>(ctx: &Ctx<T, S>, args: FillArgs) -> Result<Value> {
	let tab_id = ctx.target_tab().await?;
	ctx.send(&FillInput {
		tab_id,
		selector: args.selector.clone(),
		value: args.value,
	})
	.await?;
	Ok(json!({ "tabId": tab_id, "selector": args.selector, "filled": true }))
}
