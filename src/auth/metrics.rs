//! Token acquisition counters.

// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for token acquisitions.
#[derive(Debug, Default)]
pub struct CredentialMetrics {
	acquisitions: AtomicU64,
	refreshes: AtomicU64,
	failures: AtomicU64,
}
impl CredentialMetrics {
	/// Returns the number of token source invocations (initial fetches and refreshes).
	pub fn acquisitions(&self) -> u64 {
		self.acquisitions.load(Ordering::Relaxed)
	}

	/// Returns the number of forced refreshes.
	pub fn refreshes(&self) -> u64 {
		self.refreshes.load(Ordering::Relaxed)
	}

	/// Returns the number of failed token source invocations.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_acquisition(&self) {
		self.acquisitions.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh(&self) {
		self.refreshes.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}
}
