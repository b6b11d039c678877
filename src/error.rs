//! Service-level error types shared by the dispatcher, transports, and policies.

// crates.io
use serde_json::Value;
// self
use crate::_prelude::*;

/// Service-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error used for opaque failures produced by callers or transports.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, malformed body).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Bearer token could not be acquired.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Response body does not fit the requested shape.
	#[error(transparent)]
	Shape(#[from] ShapeError),

	/// Endpoint answered with a non-success status that no interceptor recovered from.
	#[error("Endpoint responded with HTTP {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Decoded response body (`null` when empty).
		body: Value,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
}
impl Error {
	/// Returns the HTTP status carried by the error, when one is known.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Status { status, .. } => Some(*status),
			Self::Transport(TransportError::Decode { status, .. }) => Some(*status),
			_ => None,
		}
	}

	/// Returns the upstream Retry-After hint, when one is known.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Status { retry_after, .. } => *retry_after,
			_ => None,
		}
	}

	/// Whether a resilience policy may reasonably retry the failed attempt.
	///
	/// Network and I/O failures are retryable, as are `408`, `429`, and `5xx` statuses. Every
	/// other status, malformed bodies, and configuration, authentication, or shape failures are
	/// not: resending the same request would fail the same way.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Transport(TransportError::Network { .. } | TransportError::Io(_)) => true,
			Self::Status { status, .. } => is_transient_status(*status),
			_ => false,
		}
	}
}

/// Whether an HTTP status signals a failure that may clear on its own.
pub fn is_transient_status(status: u16) -> bool {
	matches!(status, 408 | 429 | 500..=599)
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Base URL cannot be parsed.
	#[error("Base URL is invalid.")]
	InvalidBaseUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Base URL uses a scheme other than `http` or `https`.
	#[error("Base URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// Offending URL.
		url: String,
	},
	/// Request path cannot be resolved against the base URL.
	#[error("Path `{path}` cannot be resolved against the base URL.")]
	InvalidPath {
		/// Path supplied by the caller.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Header name contains characters HTTP does not allow.
	#[error("Header name `{name}` is invalid.")]
	InvalidHeader {
		/// Offending header name.
		name: String,
	},
	/// Timeouts must be positive.
	#[error("Timeout must be greater than zero.")]
	ZeroTimeout,
	/// Request body could not be serialized to JSON.
	#[error("Request body could not be serialized to JSON.")]
	RequestBody(#[source] serde_json::Error),
	/// Settings document could not be parsed.
	#[error("Service settings are invalid at `{}`.", .source.path())]
	InvalidSettings {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}

/// Transport-level failures (network, IO, body decoding).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the endpoint.")]
	Io(#[from] std::io::Error),
	/// Endpoint answered with a body that is not valid JSON.
	#[error("Endpoint returned malformed JSON (HTTP {status}).")]
	Decode {
		/// HTTP status code of the response.
		status: u16,
		/// Parsing failure.
		#[source]
		source: serde_json::Error,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Bearer token acquisition failures.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// The configured token source failed.
	#[error("Bearer token acquisition failed.")]
	Acquisition {
		/// Failure reported by the token source.
		#[source]
		source: BoxError,
	},
}

/// Failures raised while coercing a decoded body into a typed value.
#[derive(Debug, ThisError)]
pub enum ShapeError {
	/// The body does not deserialize into the requested type.
	#[error("Response body does not match the requested shape at `{}`.", .source.path())]
	Mismatch {
		/// Structured deserialization failure, including the failing path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// A sequence was required but the body held another JSON type.
	#[error("Expected a JSON array but found {found}.")]
	ExpectedSequence {
		/// JSON type that was found instead.
		found: &'static str,
	},
}
