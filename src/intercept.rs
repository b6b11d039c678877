//! Two-stage request pipeline: `prepare` before each send, `handle` after each response.
//!
//! Interceptors run in registration order. A `handle` stage may ask for the request to be
//! re-issued by returning [`Disposition::Retry`]; the dispatcher honours at most one such
//! retry per attempt and never hands the retried response back to `handle`.

// self
use crate::{
	_prelude::*,
	auth::CredentialCache,
	http::{AUTHORIZATION, TransportRequest, TransportResponse},
};

/// Boxed future returned by [`Interceptor`] stages.
pub type InterceptFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Outcome of the `handle` stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
	/// Keep the response.
	Accept,
	/// Re-issue the same request once, re-running every `prepare` stage first.
	Retry,
}

/// Hook pair wrapped around every transport send.
pub trait Interceptor
where
	Self: Send + Sync,
{
	/// Adjusts the outbound request (headers, query) before it is sent.
	fn prepare<'a>(&'a self, request: &'a mut TransportRequest) -> InterceptFuture<'a, ()>;

	/// Inspects a response and decides whether the request must be re-issued.
	fn handle<'a>(&'a self, response: &'a TransportResponse) -> InterceptFuture<'a, Disposition>;
}

/// Attaches `Authorization: Bearer <token>` and renews the token on `401`.
#[derive(Clone, Debug)]
pub struct BearerAuth {
	cache: Arc<CredentialCache>,
}
impl BearerAuth {
	/// Status code that triggers a token renewal.
	pub const UNAUTHORIZED: u16 = 401;

	/// Wraps the cache shared with the owning client.
	pub fn new(cache: Arc<CredentialCache>) -> Self {
		Self { cache }
	}
}
impl Interceptor for BearerAuth {
	fn prepare<'a>(&'a self, request: &'a mut TransportRequest) -> InterceptFuture<'a, ()> {
		Box::pin(async move {
			let token = self.cache.get_token().await?;

			request.set_header(AUTHORIZATION, token.bearer_header());

			Ok(())
		})
	}

	fn handle<'a>(&'a self, response: &'a TransportResponse) -> InterceptFuture<'a, Disposition> {
		Box::pin(async move {
			if response.status != Self::UNAUTHORIZED {
				return Ok(Disposition::Accept);
			}

			self.cache.invalidate_and_refresh().await?;

			Ok(Disposition::Retry)
		})
	}
}

/// Ordered interceptor chain owned by a client.
#[derive(Clone, Default)]
pub struct Pipeline {
	interceptors: Vec<Arc<dyn Interceptor>>,
}
impl Pipeline {
	/// Appends an interceptor to the end of the chain.
	pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
		self.interceptors.push(interceptor);
	}

	/// Number of registered interceptors.
	pub fn len(&self) -> usize {
		self.interceptors.len()
	}

	/// Whether the chain is empty.
	pub fn is_empty(&self) -> bool {
		self.interceptors.is_empty()
	}

	/// Runs every `prepare` stage in order.
	pub async fn prepare(&self, request: &mut TransportRequest) -> Result<()> {
		for interceptor in &self.interceptors {
			interceptor.prepare(request).await?;
		}

		Ok(())
	}

	/// Runs `handle` stages in order, stopping at the first retry request.
	pub async fn handle(&self, response: &TransportResponse) -> Result<Disposition> {
		for interceptor in &self.interceptors {
			if interceptor.handle(response).await? == Disposition::Retry {
				return Ok(Disposition::Retry);
			}
		}

		Ok(Disposition::Accept)
	}
}
impl Debug for Pipeline {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Pipeline").field("interceptors", &self.interceptors.len()).finish()
	}
}
