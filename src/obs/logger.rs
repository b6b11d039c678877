// crates.io
use serde_json::Value;

/// Diagnostic sink used for request snapshots, failures, and policy events.
///
/// `data` is always a redacted copy; implementations may print it as-is.
pub trait Logger
where
	Self: Send + Sync,
{
	/// Verbose diagnostics (request snapshots, successful policy runs).
	fn debug(&self, message: &str, data: Option<&Value>);

	/// Recoverable problems (failed attempts that a policy may retry).
	fn warn(&self, message: &str, data: Option<&Value>);

	/// Failures returned to the caller.
	fn error(&self, message: &str, data: Option<&Value>);
}

/// [`Logger`] that forwards entries to `tracing` events under the `json_http_service` target.
#[cfg(feature = "tracing")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;
#[cfg(feature = "tracing")]
impl Logger for TracingLogger {
	fn debug(&self, message: &str, data: Option<&Value>) {
		match data {
			Some(data) => tracing::debug!(target: "json_http_service", %data, "{message}"),
			None => tracing::debug!(target: "json_http_service", "{message}"),
		}
	}

	fn warn(&self, message: &str, data: Option<&Value>) {
		match data {
			Some(data) => tracing::warn!(target: "json_http_service", %data, "{message}"),
			None => tracing::warn!(target: "json_http_service", "{message}"),
		}
	}

	fn error(&self, message: &str, data: Option<&Value>) {
		match data {
			Some(data) => tracing::error!(target: "json_http_service", %data, "{message}"),
			None => tracing::error!(target: "json_http_service", "{message}"),
		}
	}
}
