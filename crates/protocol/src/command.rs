use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Deadline applied to commands that do not specify one.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Screenshot capture waits on a paint, so it gets a longer deadline.
pub const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound the bridge accepts for a caller-chosen deadline.
pub const MAX_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Closed set of commands understood by the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
	Register,
	Ping,
	ReloadExtension,
	GetProfileInfo,
	GetHistory,
	ListTabs,
	CreateTab,
	CloseTab,
	NavigateTab,
	RefreshTab,
	FocusTab,
	ExecuteScript,
	CaptureScreenshot,
	StartLogging,
	StopLogging,
	GetTabLogs,
	GetTabRequests,
	ClearTabLogs,
	ClearTabRequests,
	GetTabStorage,
	ClickElement,
	FillInput,
}

impl Command {
	pub const ALL: [Command; 22] = [
		Command::Register,
		Command::Ping,
		Command::ReloadExtension,
		Command::GetProfileInfo,
		Command::GetHistory,
		Command::ListTabs,
		Command::CreateTab,
		Command::CloseTab,
		Command::NavigateTab,
		Command::RefreshTab,
		Command::FocusTab,
		Command::ExecuteScript,
		Command::CaptureScreenshot,
		Command::StartLogging,
		Command::StopLogging,
		Command::GetTabLogs,
		Command::GetTabRequests,
		Command::ClearTabLogs,
		Command::ClearTabRequests,
		Command::GetTabStorage,
		Command::ClickElement,
		Command::FillInput,
	];

	/// Wire name of the command.
	pub fn as_str(self) -> &'static str {
		match self {
			Command::Register => "register",
			Command::Ping => "ping",
			Command::ReloadExtension => "reload_extension",
			Command::GetProfileInfo => "get_profile_info",
			Command::GetHistory => "get_history",
			Command::ListTabs => "list_tabs",
			Command::CreateTab => "create_tab",
			Command::CloseTab => "close_tab",
			Command::NavigateTab => "navigate_tab",
			Command::RefreshTab => "refresh_tab",
			Command::FocusTab => "focus_tab",
			Command::ExecuteScript => "execute_script",
			Command::CaptureScreenshot => "capture_screenshot",
			Command::StartLogging => "start_logging",
			Command::StopLogging => "stop_logging",
			Command::GetTabLogs => "get_tab_logs",
			Command::GetTabRequests => "get_tab_requests",
			Command::ClearTabLogs => "clear_tab_logs",
			Command::ClearTabRequests => "clear_tab_requests",
			Command::GetTabStorage => "get_tab_storage",
			Command::ClickElement => "click_element",
			Command::FillInput => "fill_input",
		}
	}

	/// Administrative commands never recorded in the command history.
	pub fn is_internal(self) -> bool {
		matches!(
			self,
			Command::Register
				| Command::Ping
				| Command::ReloadExtension
				| Command::StartLogging
				| Command::StopLogging
				| Command::GetHistory
		)
	}

	/// How long a caller waits for this command unless told otherwise.
	pub fn default_timeout(self) -> Duration {
		match self {
			Command::CaptureScreenshot => SCREENSHOT_TIMEOUT,
			_ => DEFAULT_COMMAND_TIMEOUT,
		}
	}
}

impl fmt::Display for Command {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Command {
	type Err = ProtocolError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Command::ALL
			.iter()
			.copied()
			.find(|command| command.as_str() == s)
			.ok_or_else(|| ProtocolError::UnknownCommand(s.to_string()))
	}
}
