//! Policy contract, lifecycle events, and handler registration.

// std
use std::sync::{
	Weak,
	atomic::{AtomicU64, Ordering},
};
// self
use crate::{_prelude::*, http::TransportResponse};

/// Boxed future returned by [`ResiliencePolicy::execute`] and by each [`Operation`] call.
pub type PolicyFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Unit of work driven by a policy; every call performs one full attempt.
pub type Operation<'a> = Box<dyn FnMut() -> PolicyFuture<'a, TransportResponse> + 'a + Send>;

/// Boxes an async closure into an [`Operation`].
pub fn operation<'a, F, Fut>(mut attempt: F) -> Operation<'a>
where
	F: 'a + Send + FnMut() -> Fut,
	Fut: 'a + Send + Future<Output = Result<TransportResponse>>,
{
	Box::new(move || -> PolicyFuture<'a, TransportResponse> { Box::pin(attempt()) })
}

/// Handler invoked after a successful execution.
pub type SuccessHandler = Arc<dyn Fn(&SuccessEvent) + Send + Sync>;
/// Handler invoked after every failed attempt.
pub type FailureHandler = Arc<dyn Fn(&FailureEvent<'_>) + Send + Sync>;

/// Strategy that decides how often and when an [`Operation`] runs.
///
/// Implementations must tolerate concurrent `execute` calls because a client-wide default
/// policy is shared by every request.
pub trait ResiliencePolicy
where
	Self: Send + Sync,
{
	/// Drives `operation` to completion according to the policy.
	fn execute<'a>(&'a self, operation: Operation<'a>) -> PolicyFuture<'a, TransportResponse>;

	/// Registers a success handler; dropping the returned [`Subscription`] removes it.
	fn on_success(&self, handler: SuccessHandler) -> Subscription;

	/// Registers a failure handler; dropping the returned [`Subscription`] removes it.
	fn on_failure(&self, handler: FailureHandler) -> Subscription;
}

/// Emitted once when an execution succeeds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SuccessEvent {
	/// 1-based attempt that succeeded.
	pub attempt: u32,
	/// Time spent across all attempts, including backoff.
	pub elapsed: StdDuration,
}

/// Emitted after every failed attempt.
#[derive(Debug)]
pub struct FailureEvent<'a> {
	/// 1-based attempt that failed.
	pub attempt: u32,
	/// Failure reported by the attempt.
	pub error: &'a Error,
	/// Delay before the next attempt; `None` when the policy gives up.
	pub next_delay: Option<StdDuration>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ListenerKind {
	Success,
	Failure,
}

#[derive(Default)]
struct ListenerTable {
	next_id: AtomicU64,
	success: Mutex<Vec<(u64, SuccessHandler)>>,
	failure: Mutex<Vec<(u64, FailureHandler)>>,
}
impl ListenerTable {
	fn remove(&self, kind: ListenerKind, id: u64) {
		match kind {
			ListenerKind::Success => self.success.lock().retain(|(i, _)| *i != id),
			ListenerKind::Failure => self.failure.lock().retain(|(i, _)| *i != id),
		}
	}
}

/// Handler registry that policy implementations embed.
#[derive(Default)]
pub struct PolicyListeners(Arc<ListenerTable>);
impl PolicyListeners {
	/// Registers a success handler.
	pub fn on_success(&self, handler: SuccessHandler) -> Subscription {
		let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);

		self.0.success.lock().push((id, handler));

		Subscription::new(&self.0, ListenerKind::Success, id)
	}

	/// Registers a failure handler.
	pub fn on_failure(&self, handler: FailureHandler) -> Subscription {
		let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);

		self.0.failure.lock().push((id, handler));

		Subscription::new(&self.0, ListenerKind::Failure, id)
	}

	/// Notifies every success handler.
	pub fn emit_success(&self, event: &SuccessEvent) {
		let handlers = self.0.success.lock().iter().map(|(_, h)| h.clone()).collect::<Vec<_>>();

		for handler in handlers {
			handler(event);
		}
	}

	/// Notifies every failure handler.
	pub fn emit_failure(&self, event: &FailureEvent<'_>) {
		let handlers = self.0.failure.lock().iter().map(|(_, h)| h.clone()).collect::<Vec<_>>();

		for handler in handlers {
			handler(event);
		}
	}

	/// Number of registered handlers, success and failure combined.
	pub fn len(&self) -> usize {
		self.0.success.lock().len() + self.0.failure.lock().len()
	}

	/// Whether no handler is registered.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
impl Debug for PolicyListeners {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PolicyListeners")
			.field("success", &self.0.success.lock().len())
			.field("failure", &self.0.failure.lock().len())
			.finish()
	}
}

/// Registration handle; the handler is removed when the handle drops.
#[must_use = "dropping a Subscription unregisters its handler; call `detach` to keep it"]
#[derive(Debug)]
pub struct Subscription {
	table: Weak<ListenerTable>,
	kind: ListenerKind,
	id: u64,
	active: bool,
}
impl Subscription {
	fn new(table: &Arc<ListenerTable>, kind: ListenerKind, id: u64) -> Self {
		Self { table: Arc::downgrade(table), kind, id, active: true }
	}

	/// Keeps the handler registered for the rest of the policy's lifetime.
	pub fn detach(mut self) {
		self.active = false;
	}
}
impl Drop for Subscription {
	fn drop(&mut self) {
		if !self.active {
			return;
		}
		if let Some(table) = self.table.upgrade() {
			table.remove(self.kind, self.id);
		}
	}
}

/// Runs the operation exactly once; the default when no policy is configured.
#[derive(Debug, Default)]
pub struct ExecuteOnce {
	listeners: PolicyListeners,
}
impl ResiliencePolicy for ExecuteOnce {
	fn execute<'a>(&'a self, mut operation: Operation<'a>) -> PolicyFuture<'a, TransportResponse> {
		Box::pin(async move {
			let started = Instant::now();

			match operation().await {
				Ok(response) => {
					self.listeners
						.emit_success(&SuccessEvent { attempt: 1, elapsed: started.elapsed() });

					Ok(response)
				},
				Err(error) => {
					self.listeners.emit_failure(&FailureEvent {
						attempt: 1,
						error: &error,
						next_delay: None,
					});

					Err(error)
				},
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
