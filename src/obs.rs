//! Observability helpers for dispatched requests.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `json_http_service.request` with the
//!   `method` and `stage` fields, and to route [`Logger`] output through [`TracingLogger`].
//! - Enable `metrics` to increment the `json_http_service_request_total` counter for every
//!   attempt/success/failure, labeled by `method` + `outcome`.

mod logger;
mod metrics;
mod tracing;

pub use logger::*;
pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Outcome labels recorded for each dispatched request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestOutcome {
	/// Request entered the dispatcher.
	Attempt,
	/// Response was accepted and shaped.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl RequestOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RequestOutcome::Attempt => "attempt",
			RequestOutcome::Success => "success",
			RequestOutcome::Failure => "failure",
		}
	}
}
impl Display for RequestOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
