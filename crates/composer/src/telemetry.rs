//! Logging setup and the error-tracking seam.

use tracing::error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{LogFormat, LoggingConfig};
use crate::types::CompositionStrategy;

/// Install the global subscriber. Later calls are no-ops.
pub fn init_logging(config: &LoggingConfig) {
	let filter = EnvFilter::try_from_default_env()
		.or_else(|_| EnvFilter::try_new(&config.filter))
		.unwrap_or_else(|_| EnvFilter::new("info"));

	let registry = tracing_subscriber::registry().with(filter);
	let _ = match config.format {
		LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
		LogFormat::Json => registry
			.with(tracing_subscriber::fmt::layer().json().flatten_event(true))
			.try_init(),
	};
}

/// Context attached to every reported exception.
#[derive(Debug, Clone)]
pub struct ErrorContext {
	pub request_id: String,
	pub composition_type: CompositionStrategy,
}

/// External error tracking.
///
/// Reports are fire-and-forget: implementations must not block, and the
/// caller never waits on or inspects the outcome.
pub trait ErrorReporter: Send + Sync {
	fn report(&self, error: &str, context: &ErrorContext);
}

/// Reporter that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
	fn report(&self, err: &str, context: &ErrorContext) {
		error!(
			target: "composition",
			request_id = %context.request_id,
			composition_type = %context.composition_type,
			error = %err,
			"composition exception"
		);
	}
}

#[cfg(test)]
pub(crate) mod testing {
	use parking_lot::Mutex;

	use super::*;

	/// Captures reports for assertions.
	#[derive(Default)]
	pub struct RecordingReporter {
		pub reports: Mutex<Vec<(String, ErrorContext)>>,
	}

	impl ErrorReporter for RecordingReporter {
		fn report(&self, error: &str, context: &ErrorContext) {
			self.reports.lock().push((error.to_string(), context.clone()));
		}
	}
}
