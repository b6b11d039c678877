//! Retry policy with configurable backoff.

// crates.io
use rand::Rng;
// self
use crate::{
	_prelude::*,
	http::TransportResponse,
	resilience::{
		FailureEvent, FailureHandler, Operation, PolicyFuture, PolicyListeners, ResiliencePolicy,
		SuccessEvent, SuccessHandler, Subscription,
	},
};

/// Predicate deciding whether a failed attempt may be retried.
pub type RetryPredicate = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Delay schedule between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
	/// Retry without waiting.
	Immediate,
	/// Wait the same amount before every retry.
	Constant(StdDuration),
	/// Double the delay on every retry, starting at `initial` and capped at `max`.
	Exponential {
		/// Delay before the first retry.
		initial: StdDuration,
		/// Upper bound for any single delay.
		max: StdDuration,
		/// Pick a random delay between half and the full computed value.
		jitter: bool,
	},
}
impl Backoff {
	/// Delay before retry number `retry` (1-based).
	pub fn delay(&self, retry: u32) -> StdDuration {
		match *self {
			Backoff::Immediate => StdDuration::ZERO,
			Backoff::Constant(delay) => delay,
			Backoff::Exponential { initial, max, jitter } => {
				let shift = retry.saturating_sub(1).min(16);
				let delay = initial.saturating_mul(1 << shift).min(max);

				if jitter && !delay.is_zero() {
					let half = delay / 2;

					rand::rng().random_range(half..=delay)
				} else {
					delay
				}
			},
		}
	}
}
impl Default for Backoff {
	fn default() -> Self {
		Backoff::Exponential {
			initial: StdDuration::from_millis(100),
			max: StdDuration::from_secs(10),
			jitter: true,
		}
	}
}

/// Retries failed attempts up to `max_attempts` times in total.
///
/// Only failures accepted by the retry predicate are retried ([`Error::is_retryable`] by
/// default). When a failure carries a `Retry-After` hint the policy waits for the longer of
/// the hint and the backoff delay, bounded by `retry_after_cap`.
pub struct RetryPolicy {
	max_attempts: u32,
	backoff: Backoff,
	retry_after_cap: StdDuration,
	retry_if: RetryPredicate,
	listeners: PolicyListeners,
}
impl RetryPolicy {
	const DEFAULT_RETRY_AFTER_CAP: StdDuration = StdDuration::from_secs(30);

	/// Creates a policy allowing `max_attempts` attempts (at least one).
	pub fn new(max_attempts: u32) -> Self {
		Self {
			max_attempts: max_attempts.max(1),
			backoff: Backoff::default(),
			retry_after_cap: Self::DEFAULT_RETRY_AFTER_CAP,
			retry_if: Arc::new(Error::is_retryable),
			listeners: PolicyListeners::default(),
		}
	}

	/// Overrides the backoff schedule.
	pub fn with_backoff(mut self, backoff: Backoff) -> Self {
		self.backoff = backoff;

		self
	}

	/// Overrides the upper bound applied to server `Retry-After` hints.
	pub fn with_retry_after_cap(mut self, cap: StdDuration) -> Self {
		self.retry_after_cap = cap;

		self
	}

	/// Overrides which failures are retried.
	pub fn retry_if<F>(mut self, predicate: F) -> Self
	where
		F: 'static + Send + Sync + Fn(&Error) -> bool,
	{
		self.retry_if = Arc::new(predicate);

		self
	}

	/// Maximum number of attempts, including the first one.
	pub fn max_attempts(&self) -> u32 {
		self.max_attempts
	}

	fn next_delay(&self, attempt: u32, error: &Error) -> Option<StdDuration> {
		if attempt >= self.max_attempts || !(self.retry_if)(error) {
			return None;
		}

		let delay = self.backoff.delay(attempt);
		let hinted = error
			.retry_after()
			.and_then(|hint| StdDuration::try_from(hint).ok())
			.map(|hint| hint.min(self.retry_after_cap));

		Some(hinted.map_or(delay, |hint| hint.max(delay)))
	}
}
impl ResiliencePolicy for RetryPolicy {
	fn execute<'a>(&'a self, mut operation: Operation<'a>) -> PolicyFuture<'a, TransportResponse> {
		Box::pin(async move {
			let started = Instant::now();
			let mut attempt = 0;

			loop {
				attempt += 1;

				let error = match operation().await {
					Ok(response) => {
						self.listeners.emit_success(&SuccessEvent { attempt, elapsed: started.elapsed() });

						return Ok(response);
					},
					Err(error) => error,
				};
				let next_delay = self.next_delay(attempt, &error);

				self.listeners.emit_failure(&FailureEvent { attempt, error: &error, next_delay });

				match next_delay {
					Some(delay) if !delay.is_zero() => tokio::time::sleep(delay).await,
					Some(_) => {},
					None => return Err(error),
				}
			}
		})
	}

	fn on_success(&self, handler: SuccessHandler) -> Subscription {
		self.listeners.on_success(handler)
	}

	fn on_failure(&self, handler: FailureHandler) -> Subscription {
		self.listeners.on_failure(handler)
	}
}
impl Debug for RetryPolicy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RetryPolicy")
			.field("max_attempts", &self.max_attempts)
			.field("backoff", &self.backoff)
			.field("retry_after_cap", &self.retry_after_cap)
			.field("listeners", &self.listeners)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use serde_json::Value;
	// self
	use super::*;
	use crate::{error::AuthError, resilience::operation};

	fn flaky<'a>(failures: usize, calls: Arc<AtomicUsize>) -> Operation<'a> {
		operation(move || {
			let n = calls.fetch_add(1, Ordering::SeqCst);

			async move {
				if n < failures {
					TransportResponse::new(503, Value::Null).error_for_status()
				} else {
					Ok(TransportResponse::new(200, Value::Null))
				}
			}
		})
	}

	#[test]
	fn exponential_backoff_doubles_and_caps() {
		let backoff = Backoff::Exponential {
			initial: StdDuration::from_millis(100),
			max: StdDuration::from_millis(350),
			jitter: false,
		};

		assert_eq!(backoff.delay(1), StdDuration::from_millis(100));
		assert_eq!(backoff.delay(2), StdDuration::from_millis(200));
		assert_eq!(backoff.delay(3), StdDuration::from_millis(350));
		assert_eq!(backoff.delay(40), StdDuration::from_millis(350));
	}

	#[test]
	fn jitter_stays_within_bounds() {
		let backoff = Backoff::Exponential {
			initial: StdDuration::from_millis(80),
			max: StdDuration::from_secs(1),
			jitter: true,
		};

		for _ in 0..32 {
			let delay = backoff.delay(2);

			assert!(delay >= StdDuration::from_millis(80) && delay <= StdDuration::from_millis(160));
		}
	}

	#[tokio::test]
	async fn retries_until_success_and_notifies() {
		let policy = RetryPolicy::new(3).with_backoff(Backoff::Immediate);
		let calls = Arc::new(AtomicUsize::new(0));
		let failures = Arc::new(AtomicUsize::new(0));
		let successes = Arc::new(AtomicUsize::new(0));
		let (f, s) = (failures.clone(), successes.clone());
		let _on_failure = policy.on_failure(Arc::new(move |_: &FailureEvent<'_>| {
			f.fetch_add(1, Ordering::SeqCst);
		}));
		let _on_success = policy.on_success(Arc::new(move |event: &SuccessEvent| {
			assert_eq!(event.attempt, 3);
			s.fetch_add(1, Ordering::SeqCst);
		}));
		let response =
			policy.execute(flaky(2, calls.clone())).await.expect("Third attempt should succeed.");

		assert_eq!(response.status, 200);
		assert_eq!(calls.load(Ordering::SeqCst), 3);
		assert_eq!(failures.load(Ordering::SeqCst), 2);
		assert_eq!(successes.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn gives_up_after_max_attempts() {
		let policy = RetryPolicy::new(3).with_backoff(Backoff::Constant(StdDuration::from_millis(1)));
		let calls = Arc::new(AtomicUsize::new(0));
		let err = policy.execute(flaky(10, calls.clone())).await.expect_err("All attempts fail.");

		assert_eq!(err.status(), Some(503));
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn non_retryable_errors_fail_fast() {
		let policy = RetryPolicy::new(5).with_backoff(Backoff::Immediate);
		let calls = Arc::new(AtomicUsize::new(0));
		let counted = calls.clone();
		let err = policy
			.execute(operation(move || {
				counted.fetch_add(1, Ordering::SeqCst);

				async {
					Err::<TransportResponse, _>(Error::from(AuthError::Acquisition {
						source: "denied".into(),
					}))
				}
			}))
			.await
			.expect_err("Auth failures should not be retried.");

		assert!(matches!(err, Error::Auth(_)));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn client_errors_are_not_retried() {
		let policy = RetryPolicy::new(3).with_backoff(Backoff::Immediate);
		let calls = Arc::new(AtomicUsize::new(0));
		let counted = calls.clone();
		let err = policy
			.execute(operation(move || {
				counted.fetch_add(1, Ordering::SeqCst);

				async { TransportResponse::new(422, Value::Null).error_for_status() }
			}))
			.await
			.expect_err("Validation failures should surface immediately.");

		assert_eq!(err.status(), Some(422));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn retry_after_hint_extends_delay_up_to_cap() {
		let policy = RetryPolicy::new(3)
			.with_backoff(Backoff::Constant(StdDuration::from_millis(10)))
			.with_retry_after_cap(StdDuration::from_secs(2));
		let hinted = |secs| Error::Status {
			status: 503,
			body: Value::Null,
			retry_after: Some(Duration::seconds(secs)),
		};

		assert_eq!(policy.next_delay(1, &hinted(1)), Some(StdDuration::from_secs(1)));
		assert_eq!(policy.next_delay(1, &hinted(60)), Some(StdDuration::from_secs(2)));
		assert_eq!(policy.next_delay(3, &hinted(1)), None);
	}
}
