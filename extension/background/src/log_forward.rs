//! Forwards `tracing` events to the bridge as `log` frames, so extension
//! diagnostics end up in the bridge's log instead of a devtools console
//! nobody is watching.

use std::fmt::{self, Write as _};

use tabctl_protocol::{ExtensionMessage, FrameLogLevel};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Turns every event at or above `max_level` into an [`ExtensionMessage::Log`]
/// handed to `sink`.
pub struct FrameLogLayer<F> {
	sink: F,
	max_level: Level,
}

impl<F> FrameLogLayer<F>
where
	F: Fn(ExtensionMessage) + Send + Sync + 'static,
{
	pub fn new(sink: F) -> Self {
		Self {
			sink,
			max_level: Level::INFO,
		}
	}

	pub fn with_max_level(mut self, level: Level) -> Self {
		self.max_level = level;
		self
	}
}

impl<S, F> Layer<S> for FrameLogLayer<F>
where
	S: Subscriber,
	F: Fn(ExtensionMessage) + Send + Sync + 'static,
{
	fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
		let metadata = event.metadata();
		// More verbose levels compare greater.
		if *metadata.level() > self.max_level {
			return;
		}
		let mut line = LineVisitor::default();
		event.record(&mut line);
		(self.sink)(ExtensionMessage::Log {
			level: frame_level(*metadata.level()),
			message: line.finish(metadata.target()),
		});
	}
}

fn frame_level(level: Level) -> FrameLogLevel {
	match level {
		Level::ERROR => FrameLogLevel::Error,
		Level::WARN => FrameLogLevel::Warn,
		Level::INFO => FrameLogLevel::Info,
		_ => FrameLogLevel::Debug,
	}
}

/// Renders `target: message key=value ...`. A `target` field, as written by
/// `warn!(target = "tabctl.ext", ..)`, replaces the module-path target.
#[derive(Default)]
struct LineVisitor {
	target: Option<String>,
	message: String,
	fields: String,
}

impl LineVisitor {
	fn finish(self, target: &str) -> String {
		let target = self.target.as_deref().unwrap_or(target);
		format!("{target}: {}{}", self.message, self.fields)
	}
}

impl Visit for LineVisitor {
	fn record_str(&mut self, field: &Field, value: &str) {
		match field.name() {
			"message" => self.message.push_str(value),
			"target" => self.target = Some(value.to_string()),
			name => {
				let _ = write!(self.fields, " {name}={value}");
			}
		}
	}

	fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
		if field.name() == "message" {
			let _ = write!(self.message, "{value:?}");
		} else {
			let _ = write!(self.fields, " {}={value:?}", field.name());
		}
	}
}
