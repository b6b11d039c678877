//! Single-slot bearer token cache with forced renewal.
//!
//! The cache lazily invokes its [`TokenSource`] on the first [`CredentialCache::get_token`]
//! and hands out the stored value afterwards. [`CredentialCache::invalidate_and_refresh`]
//! always calls the source again. Failed acquisitions leave the slot untouched.
//!
//! Concurrent callers that observe an empty slot each invoke the source and the last
//! write wins, unless coalescing is enabled with [`CredentialCache::with_coalescing`], in
//! which case a singleflight guard serializes acquisitions and late arrivals reuse the
//! freshly stored token.

// self
use crate::{
	_prelude::*,
	auth::{CredentialMetrics, TokenSecret, TokenSource},
	error::AuthError,
};

/// Owned token slot shared by every request of one client.
pub struct CredentialCache {
	source: Arc<dyn TokenSource>,
	token: RwLock<Option<TokenSecret>>,
	singleflight: Option<AsyncMutex<()>>,
	metrics: Arc<CredentialMetrics>,
}
impl CredentialCache {
	/// Creates an empty cache backed by `source`.
	pub fn new(source: Arc<dyn TokenSource>) -> Self {
		Self { source, token: RwLock::new(None), singleflight: None, metrics: Default::default() }
	}

	/// Enables or disables singleflight coalescing of acquisitions.
	pub fn with_coalescing(mut self, enabled: bool) -> Self {
		self.singleflight = enabled.then(|| AsyncMutex::new(()));

		self
	}

	/// Returns the cached token, if one was fetched and is non-empty.
	pub fn cached(&self) -> Option<TokenSecret> {
		self.token.read().clone().filter(|token| !token.is_empty())
	}

	/// Drops the cached token so the next request fetches a new one.
	pub fn clear(&self) {
		*self.token.write() = None;
	}

	/// Shared acquisition counters.
	pub fn metrics(&self) -> &Arc<CredentialMetrics> {
		&self.metrics
	}

	/// Returns the cached token, acquiring it first when absent.
	pub async fn get_token(&self) -> Result<TokenSecret> {
		if let Some(token) = self.cached() {
			return Ok(token);
		}

		let Some(guard) = self.singleflight.as_ref() else {
			return self.fetch().await;
		};
		let _singleflight = guard.lock().await;

		match self.cached() {
			Some(token) => Ok(token),
			None => self.fetch().await,
		}
	}

	/// Unconditionally acquires a new token and overwrites the slot.
	pub async fn invalidate_and_refresh(&self) -> Result<TokenSecret> {
		self.metrics.record_refresh();

		match self.singleflight.as_ref() {
			Some(guard) => {
				let _singleflight = guard.lock().await;

				self.fetch().await
			},
			None => self.fetch().await,
		}
	}

	async fn fetch(&self) -> Result<TokenSecret> {
		self.metrics.record_acquisition();

		match self.source.acquire().await {
			Ok(raw) => {
				let token = TokenSecret::new(raw);

				*self.token.write() = Some(token.clone());

				Ok(token)
			},
			Err(source) => {
				self.metrics.record_failure();

				Err(AuthError::Acquisition { source }.into())
			},
		}
	}
}
impl Debug for CredentialCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialCache")
			.field("token_cached", &self.cached().is_some())
			.field("coalescing", &self.singleflight.is_some())
			.field("metrics", &self.metrics)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::_preludet::CountingTokenSource;

	fn slow_source(calls: Arc<AtomicUsize>) -> impl TokenSource {
		move || {
			let calls = calls.clone();

			async move {
				let n = calls.fetch_add(1, Ordering::SeqCst) + 1;

				tokio::time::sleep(StdDuration::from_millis(20)).await;

				Ok::<_, std::io::Error>(format!("slow-{n}"))
			}
		}
	}

	#[tokio::test]
	async fn first_call_fetches_then_reuses() {
		let source = CountingTokenSource::new("tok");
		let cache = CredentialCache::new(Arc::new(source.clone()));

		assert!(cache.cached().is_none());
		assert_eq!(cache.get_token().await.expect("First fetch should succeed.").expose(), "tok-1");
		assert_eq!(cache.get_token().await.expect("Cached read should succeed.").expose(), "tok-1");
		assert_eq!(source.calls(), 1);
		assert_eq!(cache.metrics().acquisitions(), 1);
	}

	#[tokio::test]
	async fn refresh_always_invokes_source() {
		let source = CountingTokenSource::new("tok");
		let cache = CredentialCache::new(Arc::new(source.clone()));
		let refreshed =
			cache.invalidate_and_refresh().await.expect("Refresh on an empty slot should work.");

		assert_eq!(refreshed.expose(), "tok-1");

		let refreshed = cache.invalidate_and_refresh().await.expect("Second refresh should work.");

		assert_eq!(refreshed.expose(), "tok-2");
		assert_eq!(cache.cached().map(|t| t.expose().to_owned()), Some("tok-2".into()));
		assert_eq!(source.calls(), 2);
		assert_eq!(cache.metrics().refreshes(), 2);
	}

	#[tokio::test]
	async fn failed_acquisition_does_not_poison_slot() {
		let attempts = Arc::new(AtomicUsize::new(0));
		let counter = attempts.clone();
		let source = move || {
			let n = counter.fetch_add(1, Ordering::SeqCst);

			async move {
				if n == 1 { Err("vault offline".to_owned()) } else { Ok(format!("tok-{n}")) }
			}
		};
		let cache = CredentialCache::new(Arc::new(source));

		cache.get_token().await.expect("Initial fetch should succeed.");

		let err = cache.invalidate_and_refresh().await.expect_err("Second acquisition should fail.");

		assert!(matches!(err, Error::Auth(AuthError::Acquisition { .. })));
		assert_eq!(cache.cached().map(|t| t.expose().to_owned()), Some("tok-0".into()));
		assert_eq!(cache.metrics().failures(), 1);
	}

	#[tokio::test]
	async fn empty_tokens_count_as_missing() {
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = calls.clone();
		let source = move || {
			counter.fetch_add(1, Ordering::SeqCst);

			async { Ok::<_, std::io::Error>(String::new()) }
		};
		let cache = CredentialCache::new(Arc::new(source));

		cache.get_token().await.expect("Empty token fetch should succeed.");
		cache.get_token().await.expect("Second empty token fetch should succeed.");

		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn concurrent_first_fetches_race_without_coalescing() {
		let calls = Arc::new(AtomicUsize::new(0));
		let cache = CredentialCache::new(Arc::new(slow_source(calls.clone())));
		let (a, b) = tokio::join!(cache.get_token(), cache.get_token());

		a.expect("First racer should succeed.");
		b.expect("Second racer should succeed.");

		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn coalescing_shares_one_acquisition() {
		let calls = Arc::new(AtomicUsize::new(0));
		let cache =
			CredentialCache::new(Arc::new(slow_source(calls.clone()))).with_coalescing(true);
		let (a, b) = tokio::join!(cache.get_token(), cache.get_token());

		assert_eq!(a.expect("First caller should succeed.").expose(), "slow-1");
		assert_eq!(b.expect("Second caller should succeed.").expose(), "slow-1");
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}
}
