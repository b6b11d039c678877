//! Bearer token wrapper that redacts sensitive material.

// self
use crate::_prelude::*;

/// Redacted bearer token keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Whether the token is empty; empty tokens are treated as "not fetched".
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Formats the `Authorization` header value for this token.
	pub fn bearer_header(&self) -> String {
		format!("Bearer {}", self.0)
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
