// self
use crate::{http::Method, obs::RequestOutcome};

/// Records a request outcome via the global metrics recorder (when enabled).
pub fn record_request_outcome(method: Method, outcome: RequestOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"json_http_service_request_total",
			"method" => method.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (method, outcome);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn record_request_outcome_is_infallible() {
		for outcome in [RequestOutcome::Attempt, RequestOutcome::Success, RequestOutcome::Failure] {
			record_request_outcome(Method::Delete, outcome);
		}
	}
}
