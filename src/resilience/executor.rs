//! Policy resolution and policy-event logging.

// crates.io
use serde_json::{Value, json};
// self
use crate::{
	_prelude::*,
	http::TransportResponse,
	obs::Logger,
	resilience::{
		ExecuteOnce, FailureEvent, Operation, ResiliencePolicy, SuccessEvent, Subscription,
	},
};

/// Resolves the policy for each call and mirrors policy events into the logger.
///
/// Logging handlers are registered once on the default policy and stay registered for the
/// executor's lifetime. A per-request override that is a different instance only gets
/// handlers for the duration of the call it was passed to.
pub struct ResilienceExecutor {
	default: Arc<dyn ResiliencePolicy>,
	logger: Option<Arc<dyn Logger>>,
	_subscriptions: Vec<Subscription>,
}
impl ResilienceExecutor {
	/// Creates an executor around `default` (or [`ExecuteOnce`] when absent).
	///
	/// When `logger` is set, every success is logged at `debug` and every failed attempt at
	/// `warn`.
	pub fn new(default: Option<Arc<dyn ResiliencePolicy>>, logger: Option<Arc<dyn Logger>>) -> Self {
		let default = default.unwrap_or_else(|| Arc::new(ExecuteOnce::default()));
		let _subscriptions = match &logger {
			Some(logger) => subscribe(default.as_ref(), logger),
			None => Vec::new(),
		};

		Self { default, logger, _subscriptions }
	}

	/// Client-wide policy.
	pub fn default_policy(&self) -> &Arc<dyn ResiliencePolicy> {
		&self.default
	}

	/// Picks the per-request override when present, the client default otherwise.
	pub fn resolve<'a>(
		&'a self,
		override_policy: Option<&'a Arc<dyn ResiliencePolicy>>,
	) -> &'a Arc<dyn ResiliencePolicy> {
		override_policy.unwrap_or(&self.default)
	}

	/// Runs `operation` under the resolved policy.
	pub async fn execute<'a>(
		&'a self,
		override_policy: Option<&'a Arc<dyn ResiliencePolicy>>,
		operation: Operation<'a>,
	) -> Result<TransportResponse> {
		let policy = self.resolve(override_policy);
		let _scoped = match &self.logger {
			Some(logger) if !Arc::ptr_eq(policy, &self.default) => subscribe(policy.as_ref(), logger),
			_ => Vec::new(),
		};

		policy.execute(operation).await
	}
}
impl Debug for ResilienceExecutor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ResilienceExecutor")
			.field("logs_policy_events", &self.logger.is_some())
			.finish()
	}
}

fn subscribe(policy: &dyn ResiliencePolicy, logger: &Arc<dyn Logger>) -> Vec<Subscription> {
	let on_success = logger.clone();
	let on_failure = logger.clone();

	vec![
		policy.on_success(Arc::new(move |event: &SuccessEvent| {
			on_success.debug("Request succeeded.", Some(&success_data(event)));
		})),
		policy.on_failure(Arc::new(move |event: &FailureEvent<'_>| {
			on_failure.warn("Request attempt failed.", Some(&failure_data(event)));
		})),
	]
}

fn success_data(event: &SuccessEvent) -> Value {
	json!({
		"attempt": event.attempt,
		"elapsed_ms": millis(event.elapsed),
	})
}

fn failure_data(event: &FailureEvent<'_>) -> Value {
	json!({
		"attempt": event.attempt,
		"error": event.error.to_string(),
		"status": event.error.status(),
		"next_delay_ms": event.next_delay.map(millis),
	})
}

fn millis(duration: StdDuration) -> u64 {
	u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::{Level, RecordingLogger},
		resilience::{Backoff, RetryPolicy, operation},
	};

	fn ok<'a>() -> Operation<'a> {
		operation(|| async { Ok::<_, Error>(TransportResponse::new(200, Value::Null)) })
	}

	fn failing<'a>() -> Operation<'a> {
		operation(|| async { TransportResponse::new(502, Value::Null).error_for_status() })
	}

	#[tokio::test]
	async fn default_policy_handlers_are_registered_once() {
		let logger = Arc::new(RecordingLogger::default());
		let executor = ResilienceExecutor::new(None, Some(logger.clone() as Arc<dyn Logger>));

		for _ in 0..3 {
			executor.execute(None, ok()).await.expect("Operation should succeed.");
		}

		let successes = logger.at(Level::Debug);

		assert_eq!(successes.len(), 3);
		assert_eq!(successes[0].0, "Request succeeded.");
		assert_eq!(successes[0].1.as_ref().map(|d| d["attempt"].clone()), Some(json!(1)));
	}

	#[tokio::test]
	async fn override_wins_and_its_handlers_are_scoped() {
		let logger = Arc::new(RecordingLogger::default());
		let executor = ResilienceExecutor::new(None, Some(logger.clone() as Arc<dyn Logger>));
		let retry = Arc::new(RetryPolicy::new(2).with_backoff(Backoff::Immediate));
		let override_policy: Arc<dyn ResiliencePolicy> = retry.clone();
		let err = executor
			.execute(Some(&override_policy), failing())
			.await
			.expect_err("Both attempts should fail.");

		assert_eq!(err.status(), Some(502));

		let warnings = logger.at(Level::Warn);

		assert_eq!(warnings.len(), 2);
		assert_eq!(warnings[0].1.as_ref().map(|d| d["next_delay_ms"].clone()), Some(json!(0)));
		assert_eq!(warnings[1].1.as_ref().map(|d| d["next_delay_ms"].clone()), Some(Value::Null));

		executor.execute(Some(&override_policy), failing()).await.expect_err("Still failing.");

		assert_eq!(logger.at(Level::Warn).len(), 4);
		assert!(format!("{:?}", retry.as_ref()).contains("success: 0, failure: 0"));
	}

	#[tokio::test]
	async fn no_logger_means_no_handlers() {
		let policy: Arc<dyn ResiliencePolicy> = Arc::new(ExecuteOnce::default());
		let executor = ResilienceExecutor::new(Some(policy.clone()), None);

		executor.execute(None, failing()).await.expect_err("Operation should fail.");

		assert!(Arc::ptr_eq(executor.resolve(None), &policy));
		assert!(Arc::ptr_eq(executor.default_policy(), &policy));
	}
}
