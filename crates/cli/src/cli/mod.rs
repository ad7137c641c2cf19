
use std::ffi::OsString;
use std::path::PathBuf;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Args, Parser, Subcommand};

use crate::output::OutputFormat;
use crate::profile::DEFAULT_PROFILE;
use crate::target::TabRef;

/// Cargo-style help colors: green headers, cyan literals and placeholders.
fn cli_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Green.on_default().bold())
		.usage(AnsiColor::Green.on_default().bold())
		.literal(AnsiColor::Cyan.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
		.valid(AnsiColor::Cyan.on_default())
}

/// Control a running browser through the tabctl extension.
#[derive(Parser, Debug)]
#[command(name = "tabctl")]
#[command(about = "Drive a running browser from the command line")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format: toon (default), json, or text
	#[arg(short = 'f', long, global = true, value_enum, default_value = "toon")]
	pub format: OutputFormat,

	/// Profile holding the active tab and bound extension id
	#[arg(long, global = true, value_name = "NAME", default_value = DEFAULT_PROFILE)]
	pub profile: String,

	/// Target tab: ordinal 1-9, a tab id, or id:<n>
	#[arg(short, long, global = true, value_name = "TAB")]
	pub tab: Option<TabRef>,

	/// Override the command deadline in milliseconds
	#[arg(long, global = true, value_name = "MS")]
	pub timeout_ms: Option<u64>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// List and manage tabs
	#[command(subcommand)]
	Tabs(TabsAction),
	/// Evaluate JavaScript in the target tab
	Exec(ExecArgs),
	/// Capture the target tab to an image file
	Screenshot(ScreenshotArgs),
	/// Capture console output of the target tab
	#[command(subcommand)]
	Logs(LogsAction),
	/// Inspect network requests of the target tab
	#[command(subcommand)]
	Requests(RequestsAction),
	/// Dump localStorage, sessionStorage and cookies of the target tab
	Storage,
	/// Click an element by CSS selector or visible text
	Click(ClickArgs),
	/// Set the value of an input element
	Fill(FillArgs),
	/// Check that the extension answers
	Ping,
	/// Reload the extension
	ReloadExtension,
	/// Show or configure the active profile
	#[command(subcommand)]
	Profile(ProfileAction),
	/// Show recently dispatched commands
	History(HistoryArgs),
	/// Run as the native-messaging host (started by the browser)
	#[command(hide = true)]
	Bridge(BridgeArgs),
}

impl Commands {
	/// Stable name used in the output envelope.
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Tabs(action) => match action {
				TabsAction::List { .. } => "tabs list",
				TabsAction::Open(_) => "tabs open",
				TabsAction::Close { .. } => "tabs close",
				TabsAction::Navigate { .. } => "tabs navigate",
				TabsAction::Refresh { .. } => "tabs refresh",
				TabsAction::Focus { .. } => "tabs focus",
				TabsAction::Select { .. } => "tabs select",
			},
			Commands::Exec(_) => "exec",
			Commands::Screenshot(_) => "screenshot",
			Commands::Logs(action) => match action {
				LogsAction::Start => "logs start",
				LogsAction::Stop => "logs stop",
				LogsAction::Show { .. } => "logs show",
				LogsAction::Clear => "logs clear",
			},
			Commands::Requests(action) => match action {
				RequestsAction::Show { .. } => "requests show",
				RequestsAction::Clear => "requests clear",
			},
			Commands::Storage => "storage",
			Commands::Click(_) => "click",
			Commands::Fill(_) => "fill",
			Commands::Ping => "ping",
			Commands::ReloadExtension => "reload-extension",
			Commands::Profile(action) => match action {
				ProfileAction::Info => "profile info",
				ProfileAction::Show => "profile show",
				ProfileAction::SetExtension { .. } => "profile set-extension",
			},
			Commands::History(_) => "history",
			Commands::Bridge(_) => "bridge",
		}
	}
}

#[derive(Subcommand, Debug, Clone)]
pub enum TabsAction {
	/// List open tabs in browser order
	List {
		/// Only tabs of the focused window
		#[arg(long)]
		current_window: bool,
	},
	/// Open a new tab
	Open(OpenArgs),
	/// Close a tab (defaults to the target tab)
	Close {
		#[arg(value_name = "TAB")]
		tab: Option<TabRef>,
	},
	/// Load a URL in the target tab
	Navigate {
		#[arg(value_name = "URL")]
		url: String,
	},
	/// Reload the target tab
	Refresh {
		/// Bypass the browser cache
		#[arg(long)]
		hard: bool,
	},
	/// Bring a tab and its window to the front
	Focus {
		#[arg(value_name = "TAB")]
		tab: Option<TabRef>,
	},
	/// Remember a tab as the profile's active tab
	Select {
		#[arg(value_name = "TAB")]
		tab: TabRef,
	},
}

#[derive(Args, Debug, Clone)]
pub struct OpenArgs {
	#[arg(value_name = "URL")]
	pub url: Option<String>,

	/// Open without focusing the new tab
	#[arg(long)]
	pub background: bool,

	/// Make the new tab the profile's active tab
	#[arg(long)]
	pub select: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ExecArgs {
	/// JavaScript expression to evaluate
	#[arg(value_name = "CODE", required_unless_present = "file", conflicts_with = "file")]
	pub code: Option<String>,

	/// Read the script from a file ("-" for stdin)
	#[arg(long, value_name = "FILE")]
	pub file: Option<PathBuf>,

	/// Return the raw value without awaiting promises
	#[arg(long)]
	pub no_await: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ScreenshotArgs {
	/// Destination file; the extension picks the format (.jpg/.jpeg for JPEG)
	#[arg(short, long, value_name = "FILE")]
	pub output: Option<PathBuf>,

	/// Capture the full scrollable page
	#[arg(long)]
	pub full_page: bool,

	/// JPEG quality, 0-100
	#[arg(long, value_name = "N", value_parser = clap::value_parser!(u8).range(0..=100))]
	pub quality: Option<u8>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum LogsAction {
	/// Start capturing console and runtime logs
	Start,
	/// Stop capturing; already captured entries are kept
	Stop,
	/// Print captured log entries
	Show {
		/// Only the most recent N entries
		#[arg(long, value_name = "N")]
		limit: Option<usize>,
	},
	/// Discard captured log entries
	Clear,
}

#[derive(Subcommand, Debug, Clone)]
pub enum RequestsAction {
	/// Print captured network requests
	Show {
		#[arg(long, value_name = "N")]
		limit: Option<usize>,
	},
	/// Discard captured requests
	Clear,
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct ClickArgs {
	/// CSS selector of the element
	#[arg(short, long, value_name = "SELECTOR")]
	pub selector: Option<String>,

	/// Visible text of the element
	#[arg(long, value_name = "TEXT")]
	pub text: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct FillArgs {
	#[arg(value_name = "SELECTOR")]
	pub selector: String,

	#[arg(value_name = "VALUE")]
	pub value: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ProfileAction {
	/// Ask the extension for its id, version and session state
	Info,
	/// Print the stored profile
	Show,
	/// Bind this profile to an extension id ("none" to unbind)
	SetExtension {
		#[arg(value_name = "ID")]
		id: String,
	},
}

#[derive(Args, Debug, Clone)]
pub struct HistoryArgs {
	/// Only the most recent N entries
	#[arg(long, value_name = "N")]
	pub limit: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct BridgeArgs {
	/// Arguments passed by the browser (origin, window handle)
	#[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
	pub args: Vec<OsString>,
}
