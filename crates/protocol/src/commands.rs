//! Typed payloads, one per [`Command`], each bound to its result type through
//! [`CommandSpec`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::error::ProtocolError;
use crate::frame::Registration;
use crate::types::*;

/// Compile-time link between a payload, its command name and its result.
pub trait CommandSpec: Serialize + DeserializeOwned {
	const COMMAND: Command;

	type Output: Serialize + DeserializeOwned;

	/// Rejects payloads that must never reach the wire.
	fn validate(&self) -> Result<(), ProtocolError> {
		Ok(())
	}
}

fn require_tab(command: Command, tab_id: TabId) -> Result<(), ProtocolError> {
	if tab_id < 0 {
		return Err(ProtocolError::InvalidField {
			command,
			field: "tabId",
			reason: format!("{tab_id} is not a tab id"),
		});
	}
	Ok(())
}

fn require_text(command: Command, field: &'static str, value: &str) -> Result<(), ProtocolError> {
	if value.trim().is_empty() {
		return Err(ProtocolError::MissingField { command, field });
	}
	Ok(())
}

macro_rules! tab_scoped {
	($(#[$meta:meta])* $name:ident => $command:ident, $output:ty) => {
		$(#[$meta])*
		#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
		#[serde(rename_all = "camelCase")]
		pub struct $name {
			pub tab_id: TabId,
		}

		impl CommandSpec for $name {
			const COMMAND: Command = Command::$command;
			type Output = $output;

			fn validate(&self) -> Result<(), ProtocolError> {
				require_tab(Self::COMMAND, self.tab_id)
			}
		}
	};
}

/// Asks the extension who it is; answered with its registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register {}

impl CommandSpec for Register {
	const COMMAND: Command = Command::Register;
	type Output = Registration;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {}

impl CommandSpec for Ping {
	const COMMAND: Command = Command::Ping;
	type Output = Pong;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadExtension {}

impl CommandSpec for ReloadExtension {
	const COMMAND: Command = Command::ReloadExtension;
	type Output = Ack;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetProfileInfo {}

impl CommandSpec for GetProfileInfo {
	const COMMAND: Command = Command::GetProfileInfo;
	type Output = ProfileInfo;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetHistory {
	/// Most recent entries only; everything buffered when absent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub limit: Option<usize>,
}

impl CommandSpec for GetHistory {
	const COMMAND: Command = Command::GetHistory;
	type Output = Vec<HistoryEntry>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTabs {
	#[serde(default)]
	pub current_window: bool,
}

impl CommandSpec for ListTabs {
	const COMMAND: Command = Command::ListTabs;
	type Output = Vec<TabInfo>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTab {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(default = "default_true")]
	pub active: bool,
}

impl CommandSpec for CreateTab {
	const COMMAND: Command = Command::CreateTab;
	type Output = TabInfo;

	fn validate(&self) -> Result<(), ProtocolError> {
		match &self.url {
			Some(url) => require_text(Self::COMMAND, "url", url),
			None => Ok(()),
		}
	}
}

tab_scoped!(CloseTab => CloseTab, Ack);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateTab {
	pub tab_id: TabId,
	#[serde(default)]
	pub url: String,
}

impl CommandSpec for NavigateTab {
	const COMMAND: Command = Command::NavigateTab;
	type Output = TabInfo;

	fn validate(&self) -> Result<(), ProtocolError> {
		require_tab(Self::COMMAND, self.tab_id)?;
		require_text(Self::COMMAND, "url", &self.url)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTab {
	pub tab_id: TabId,
	#[serde(default)]
	pub bypass_cache: bool,
}

impl CommandSpec for RefreshTab {
	const COMMAND: Command = Command::RefreshTab;
	type Output = Ack;

	fn validate(&self) -> Result<(), ProtocolError> {
		require_tab(Self::COMMAND, self.tab_id)
	}
}

tab_scoped!(FocusTab => FocusTab, TabInfo);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteScript {
	pub tab_id: TabId,
	#[serde(default)]
	pub code: String,
	#[serde(default = "default_true")]
	pub await_promise: bool,
}

impl CommandSpec for ExecuteScript {
	const COMMAND: Command = Command::ExecuteScript;
	type Output = ScriptResult;

	fn validate(&self) -> Result<(), ProtocolError> {
		require_tab(Self::COMMAND, self.tab_id)?;
		require_text(Self::COMMAND, "code", &self.code)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureScreenshot {
	pub tab_id: TabId,
	#[serde(default)]
	pub format: ImageFormat,
	/// JPEG quality, 0-100.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub quality: Option<u8>,
	#[serde(default)]
	pub full_page: bool,
}

impl CommandSpec for CaptureScreenshot {
	const COMMAND: Command = Command::CaptureScreenshot;
	type Output = Screenshot;

	fn validate(&self) -> Result<(), ProtocolError> {
		require_tab(Self::COMMAND, self.tab_id)?;
		match self.quality {
			Some(q) if q > 100 => Err(ProtocolError::InvalidField {
				command: Self::COMMAND,
				field: "quality",
				reason: format!("{q} is outside 0-100"),
			}),
			Some(_) if self.format == ImageFormat::Png => Err(ProtocolError::Conflict {
				command: Self::COMMAND,
				message: "quality only applies to jpeg captures".into(),
			}),
			_ => Ok(()),
		}
	}
}

tab_scoped!(StartLogging => StartLogging, LoggingStatus);
tab_scoped!(StopLogging => StopLogging, LoggingStatus);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTabLogs {
	pub tab_id: TabId,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub limit: Option<usize>,
}

impl CommandSpec for GetTabLogs {
	const COMMAND: Command = Command::GetTabLogs;
	type Output = Vec<LogEntry>;

	fn validate(&self) -> Result<(), ProtocolError> {
		require_tab(Self::COMMAND, self.tab_id)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTabRequests {
	pub tab_id: TabId,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub limit: Option<usize>,
}

impl CommandSpec for GetTabRequests {
	const COMMAND: Command = Command::GetTabRequests;
	type Output = Vec<RequestEntry>;

	fn validate(&self) -> Result<(), ProtocolError> {
		require_tab(Self::COMMAND, self.tab_id)
	}
}

tab_scoped!(ClearTabLogs => ClearTabLogs, Cleared);
tab_scoped!(ClearTabRequests => ClearTabRequests, Cleared);
tab_scoped!(GetTabStorage => GetTabStorage, StorageSnapshot);

/// Clicks one element located either by CSS selector or by visible text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickElement {
	pub tab_id: TabId,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub selector: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
}

impl CommandSpec for ClickElement {
	const COMMAND: Command = Command::ClickElement;
	type Output = ClickOutcome;

	fn validate(&self) -> Result<(), ProtocolError> {
		require_tab(Self::COMMAND, self.tab_id)?;
		let selector = self.selector.as_deref().filter(|s| !s.trim().is_empty());
		let text = self.text.as_deref().filter(|s| !s.trim().is_empty());
		match (selector, text) {
			(Some(_), None) | (None, Some(_)) => Ok(()),
			(None, None) => Err(ProtocolError::MissingField {
				command: Self::COMMAND,
				field: "selector",
			}),
			(Some(_), Some(_)) => Err(ProtocolError::Conflict {
				command: Self::COMMAND,
				message: "selector and text are mutually exclusive".into(),
			}),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillInput {
	pub tab_id: TabId,
	#[serde(default)]
	pub selector: String,
	#[serde(default)]
	pub value: String,
}

impl CommandSpec for FillInput {
	const COMMAND: Command = Command::FillInput;
	type Output = Ack;

	fn validate(&self) -> Result<(), ProtocolError> {
		require_tab(Self::COMMAND, self.tab_id)?;
		require_text(Self::COMMAND, "selector", &self.selector)
	}
}

fn default_true() -> bool {
	true
}
