//! Transport primitives for JSON exchanges.
//!
//! The module exposes [`JsonTransport`] alongside [`TransportRequest`] and
//! [`TransportResponse`] so downstream crates can plug in custom HTTP stacks without losing
//! the dispatcher's authentication, resilience, and logging layers. Implementations only
//! perform the network call: they never interpret status codes, and they decode the body
//! as JSON (`null` when empty).

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
#[cfg(feature = "reqwest")] use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::Value;
use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::TransportError};

/// Header carrying bearer credentials.
pub const AUTHORIZATION: &str = "authorization";

/// Boxed future returned by [`JsonTransport::send`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<TransportResponse>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing a single JSON exchange.
///
/// The trait is the dispatcher's only dependency on an HTTP implementation. It must be
/// `Send + Sync + 'static` so one transport can be shared by concurrent calls, and the
/// returned future must be `Send` so calls can hop executors.
pub trait JsonTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and returns the decoded response, whatever its status.
	fn send(&self, request: TransportRequest) -> TransportFuture<'_>;
}

/// HTTP verbs issued by the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
	/// `GET`.
	Get,
	/// `POST`.
	Post,
	/// `PUT`.
	Put,
	/// `DELETE`.
	Delete,
}
impl Method {
	/// Returns a stable lowercase label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "get",
			Method::Post => "post",
			Method::Put => "put",
			Method::Delete => "delete",
		}
	}

	/// Whether the verb carries a request body.
	pub const fn has_body(self) -> bool {
		matches!(self, Method::Post | Method::Put)
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Fully resolved outbound request.
#[derive(Clone)]
pub struct TransportRequest {
	/// HTTP verb.
	pub method: Method,
	/// Absolute target URL.
	pub url: Url,
	/// Header map keyed by lowercase names.
	pub headers: BTreeMap<String, String>,
	/// JSON body, if any.
	pub body: Option<Value>,
	/// Per-request timeout forwarded to the transport.
	pub timeout: Option<StdDuration>,
}
impl TransportRequest {
	/// Creates a request without headers, body, or timeout.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: BTreeMap::new(), body: None, timeout: None }
	}

	/// Inserts or replaces a header; the name is stored in lowercase.
	pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
		self.headers.insert(name.to_ascii_lowercase(), value.into());
	}

	/// Looks up a header by case-insensitive name.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}
}
impl Debug for TransportRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let headers = self
			.headers
			.iter()
			.map(|(name, value)| {
				let value = if name == AUTHORIZATION { "<redacted>" } else { value.as_str() };

				(name.as_str(), value)
			})
			.collect::<BTreeMap<_, _>>();

		f.debug_struct("TransportRequest")
			.field("method", &self.method)
			.field("url", &self.url.as_str())
			.field("headers", &headers)
			.field("body", &self.body)
			.field("timeout", &self.timeout)
			.finish()
	}
}

/// Decoded response produced by a [`JsonTransport`].
#[derive(Clone, Debug, PartialEq)]
pub struct TransportResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers keyed by lowercase names; repeated headers are joined with `, `.
	pub headers: BTreeMap<String, String>,
	/// Decoded JSON body (`null` when empty).
	pub body: Value,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}
impl TransportResponse {
	/// Creates a response without headers.
	pub fn new(status: u16, body: Value) -> Self {
		Self { status, headers: BTreeMap::new(), body, retry_after: None }
	}

	/// Adds a header, storing its name in lowercase.
	pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
		let name = name.to_ascii_lowercase();

		if name == "retry-after" {
			let value = value.into();

			self.retry_after = parse_retry_after(&value);
			self.headers.insert(name, value);
		} else {
			self.headers.insert(name, value.into());
		}

		self
	}

	/// Looks up a header by case-insensitive name.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Whether the status is in the `2xx` range.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Converts non-`2xx` responses into [`Error::Status`].
	pub fn error_for_status(self) -> Result<Self> {
		if self.is_success() {
			Ok(self)
		} else {
			Err(Error::Status { status: self.status, body: self.body, retry_after: self.retry_after })
		}
	}
}

/// Decodes a raw response body; empty bodies become `null`.
pub fn decode_body(status: u16, bytes: &[u8]) -> Result<Value, TransportError> {
	if bytes.iter().all(u8::is_ascii_whitespace) {
		return Ok(Value::Null);
	}

	serde_json::from_slice(bytes).map_err(|source| TransportError::Decode { status, source })
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	async fn execute(&self, request: TransportRequest) -> Result<TransportResponse> {
		let mut builder = self.0.request(reqwest_method(request.method), request.url);

		for (name, value) in &request.headers {
			builder = builder.header(name.as_str(), value.as_str());
		}
		if let Some(body) = request.body.as_ref() {
			let bytes = serde_json::to_vec(body).map_err(crate::error::ConfigError::RequestBody)?;

			builder = builder.body(bytes);
		}
		if let Some(timeout) = request.timeout {
			builder = builder.timeout(timeout);
		}

		let response = builder.send().await.map_err(TransportError::from)?;
		let status = response.status().as_u16();
		let retry_after = retry_after_header(response.headers());
		let headers = flatten_headers(response.headers());
		let bytes = response.bytes().await.map_err(TransportError::from)?;
		let body = decode_body(status, &bytes)?;

		Ok(TransportResponse { status, headers, body, retry_after })
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl JsonTransport for ReqwestTransport {
	fn send(&self, request: TransportRequest) -> TransportFuture<'_> {
		Box::pin(self.execute(request))
	}
}

#[cfg(feature = "reqwest")]
fn reqwest_method(method: Method) -> reqwest::Method {
	match method {
		Method::Get => reqwest::Method::GET,
		Method::Post => reqwest::Method::POST,
		Method::Put => reqwest::Method::PUT,
		Method::Delete => reqwest::Method::DELETE,
	}
}

#[cfg(feature = "reqwest")]
fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
	let mut flat = BTreeMap::<String, String>::new();

	for (name, value) in headers {
		let Ok(value) = value.to_str() else { continue };

		flat.entry(name.as_str().to_owned())
			.and_modify(|existing| {
				existing.push_str(", ");
				existing.push_str(value);
			})
			.or_insert_with(|| value.to_owned());
	}

	flat
}

#[cfg(feature = "reqwest")]
fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;

	parse_retry_after(value.to_str().ok()?)
}

/// Parses a `Retry-After` value expressed either in seconds or as an RFC 2822 date.
pub fn parse_retry_after(raw: &str) -> Option<Duration> {
	let raw = raw.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(i64::from(secs)));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Test URL should parse.")
	}

	#[test]
	fn request_debug_redacts_authorization() {
		let mut request = TransportRequest::new(Method::Get, url("https://api.example.com/me"));

		request.set_header("Authorization", "Bearer super-secret");
		request.set_header("Accept", "application/json");

		let rendered = format!("{request:?}");

		assert!(!rendered.contains("super-secret"));
		assert!(rendered.contains("<redacted>"));
		assert!(rendered.contains("application/json"));
		assert_eq!(request.header("AUTHORIZATION"), Some("Bearer super-secret"));
	}

	#[test]
	fn error_for_status_keeps_body_and_hint() {
		let ok = TransportResponse::new(204, Value::Null).error_for_status();

		assert!(ok.is_ok());

		let err = TransportResponse::new(503, json!({ "message": "busy" }))
			.with_header("Retry-After", "7")
			.error_for_status()
			.expect_err("503 should become a status error.");

		match err {
			Error::Status { status, body, retry_after } => {
				assert_eq!(status, 503);
				assert_eq!(body, json!({ "message": "busy" }));
				assert_eq!(retry_after, Some(Duration::seconds(7)));
			},
			other => panic!("Unexpected error variant: {other:?}."),
		}
	}

	#[test]
	fn empty_bodies_decode_to_null() {
		assert_eq!(decode_body(204, b"").expect("Empty body should decode."), Value::Null);
		assert_eq!(decode_body(200, b"  \n").expect("Blank body should decode."), Value::Null);
		assert!(matches!(decode_body(200, b"{oops"), Err(TransportError::Decode { status: 200, .. })));
	}

	#[test]
	fn retry_after_accepts_seconds_and_rejects_past_dates() {
		assert_eq!(parse_retry_after(" 12 "), Some(Duration::seconds(12)));
		assert_eq!(parse_retry_after("Mon, 01 Jan 2001 00:00:00 +0000"), None);
		assert_eq!(parse_retry_after("soon"), None);
	}
}
