use clap::Parser;
use tabctl_cli::{
	bridge,
	cli::Cli,
	commands,
	error::TabctlError,
	logging,
	output::{self, OutputFormat, ResultBuilder},
};

#[tokio::main]
async fn main() {
	if bridge::launched_by_browser(std::env::args_os().map(|arg| arg.to_string_lossy().into_owned())) {
		logging::init_logging(1);
		if let Err(err) = bridge::run_native_host().await {
			tracing::error!(target = "tabctl.bridge", error = %format!("{err:#}"), "bridge failed");
			std::process::exit(1);
		}
		return;
	}

	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let format = cli.format;
	let name = cli.command.name();

	if let Err(err) = commands::dispatch(cli).await {
		handle_error(err, name, format);
		std::process::exit(1);
	}
}

fn handle_error(err: TabctlError, command: &str, format: OutputFormat) {
	let cmd_error = err.to_command_error();

	// Always print to stderr for humans
	output::print_error_stderr(&cmd_error);

	// Also emit the envelope on stdout with ok=false (for agents)
	if format != OutputFormat::Text {
		let result: output::CommandResult<()> = ResultBuilder::new(command).command_error(cmd_error).build();
		output::print_result(&result, format);
	}
}
