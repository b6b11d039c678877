//! JSON HTTP service client with cached bearer tokens, pluggable resilience policies, and
//! redacted diagnostic logging.
//!
//! [`client::HttpService`] is the entry point. It resolves paths against a single base URL,
//! attaches `Authorization: Bearer <token>` when a [`auth::TokenSource`] is configured,
//! renews the token once when the endpoint answers `401`, drives every call through a
//! [`resilience::ResiliencePolicy`], and logs a redacted snapshot of each request.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod error;
pub mod http;
pub mod intercept;
pub mod obs;
pub mod redact;
pub mod resilience;
pub mod shape;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test`
	//! crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{
		collections::VecDeque,
		sync::atomic::{AtomicUsize, Ordering},
	};
	// crates.io
	use serde_json::Value;
	// self
	use crate::{
		auth::TokenSource,
		error::TransportError,
		http::{JsonTransport, TransportFuture, TransportRequest, TransportResponse},
		obs::Logger,
	};

	/// In-memory transport that replays scripted replies and records every request.
	#[derive(Debug, Default)]
	pub struct ScriptedTransport {
		replies: Mutex<VecDeque<Result<TransportResponse>>>,
		sent: Mutex<Vec<TransportRequest>>,
	}
	impl ScriptedTransport {
		/// Queues a reply with the provided status and JSON body.
		pub fn reply(self, status: u16, body: Value) -> Self {
			self.replies.lock().push_back(Ok(TransportResponse::new(status, body)));

			self
		}

		/// Queues a full response, including headers.
		pub fn respond(self, response: TransportResponse) -> Self {
			self.replies.lock().push_back(Ok(response));

			self
		}

		/// Queues a network failure.
		pub fn fail(self, message: &str) -> Self {
			let err = std::io::Error::other(message.to_owned());

			self.replies.lock().push_back(Err(TransportError::Io(err).into()));

			self
		}

		/// Returns every request the transport received, in order.
		pub fn sent(&self) -> Vec<TransportRequest> {
			self.sent.lock().clone()
		}

		/// Number of requests the transport received.
		pub fn calls(&self) -> usize {
			self.sent.lock().len()
		}
	}
	impl JsonTransport for ScriptedTransport {
		fn send(&self, request: TransportRequest) -> TransportFuture<'_> {
			self.sent.lock().push(request);

			let reply = self.replies.lock().pop_front().unwrap_or_else(|| {
				Err(TransportError::Io(std::io::Error::other("script exhausted")).into())
			});

			Box::pin(async move { reply })
		}
	}

	/// Log level captured by [`RecordingLogger`].
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub enum Level {
		/// `debug` entries.
		Debug,
		/// `warn` entries.
		Warn,
		/// `error` entries.
		Error,
	}

	/// Logger that keeps every entry in memory.
	#[derive(Debug, Default)]
	pub struct RecordingLogger(Mutex<Vec<(Level, String, Option<Value>)>>);
	impl RecordingLogger {
		/// Returns all captured entries.
		pub fn entries(&self) -> Vec<(Level, String, Option<Value>)> {
			self.0.lock().clone()
		}

		/// Returns the captured entries at `level`.
		pub fn at(&self, level: Level) -> Vec<(String, Option<Value>)> {
			self.0
				.lock()
				.iter()
				.filter(|(l, ..)| *l == level)
				.map(|(_, message, data)| (message.clone(), data.clone()))
				.collect()
		}

		fn push(&self, level: Level, message: &str, data: Option<&Value>) {
			self.0.lock().push((level, message.to_owned(), data.cloned()));
		}
	}
	impl Logger for RecordingLogger {
		fn debug(&self, message: &str, data: Option<&Value>) {
			self.push(Level::Debug, message, data);
		}

		fn warn(&self, message: &str, data: Option<&Value>) {
			self.push(Level::Warn, message, data);
		}

		fn error(&self, message: &str, data: Option<&Value>) {
			self.push(Level::Error, message, data);
		}
	}

	/// Token source that yields `<prefix>-1`, `<prefix>-2`, ... and counts invocations.
	#[derive(Clone, Debug)]
	pub struct CountingTokenSource {
		prefix: &'static str,
		calls: Arc<AtomicUsize>,
	}
	impl CountingTokenSource {
		/// Creates a source with the provided token prefix.
		pub fn new(prefix: &'static str) -> Self {
			Self { prefix, calls: Default::default() }
		}

		/// Number of acquisitions performed so far.
		pub fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}
	}
	impl TokenSource for CountingTokenSource {
		fn acquire(&self) -> crate::auth::TokenFuture<'_> {
			let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
			let token = format!("{}-{n}", self.prefix);

			Box::pin(async move { Ok(token) })
		}
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::{Duration as StdDuration, Instant},
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tracing_subscriber as _};
