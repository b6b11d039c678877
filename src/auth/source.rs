//! Token acquisition callbacks.

// self
use crate::{_prelude::*, error::BoxError};

/// Boxed future returned by [`TokenSource::acquire`].
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<String, BoxError>> + 'a + Send>>;

/// Zero-argument callback that yields a fresh bearer token or fails.
///
/// Any `Fn() -> impl Future<Output = Result<String, E>>` closure implements the trait, so
/// most callers never name it:
///
/// ```
/// use json_http_service::auth::TokenSource;
///
/// fn assert_source(_: &dyn TokenSource) {}
///
/// let source = || async { Ok::<_, std::io::Error>("token".to_owned()) };
///
/// assert_source(&source);
/// ```
pub trait TokenSource
where
	Self: Send + Sync,
{
	/// Acquires a new token. Invoked lazily and again on every forced refresh.
	fn acquire(&self) -> TokenFuture<'_>;
}
impl<F, Fut, E> TokenSource for F
where
	F: Send + Sync + Fn() -> Fut,
	Fut: 'static + Send + Future<Output = Result<String, E>>,
	E: Into<BoxError>,
{
	fn acquire(&self) -> TokenFuture<'_> {
		let pending = self();

		Box::pin(async move { pending.await.map_err(Into::into) })
	}
}
