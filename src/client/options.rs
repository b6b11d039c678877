//! Per-request options and the response envelope.

// self
use crate::{_prelude::*, resilience::ResiliencePolicy};

/// Options accepted by every verb.
///
/// Everything except `resilience_policy` is forwarded to the transport as-is.
#[derive(Clone, Default)]
pub struct RequestOptions {
	/// Extra headers; they override the client defaults.
	pub headers: BTreeMap<String, String>,
	/// Query pairs appended to the resolved URL.
	pub query: Vec<(String, String)>,
	/// Per-request timeout; overrides the client default.
	pub timeout: Option<StdDuration>,
	/// Policy used for this call instead of the client-wide one.
	pub resilience_policy: Option<Arc<dyn ResiliencePolicy>>,
}
impl RequestOptions {
	/// Adds a header.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());

		self
	}

	/// Appends a query pair.
	pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((name.into(), value.into()));

		self
	}

	/// Sets the per-request timeout.
	pub fn timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Overrides the resilience policy for this call.
	pub fn resilience_policy(mut self, policy: Arc<dyn ResiliencePolicy>) -> Self {
		self.resilience_policy = Some(policy);

		self
	}

	/// Splits the policy override from the options forwarded to the transport.
	pub fn into_parts(self) -> (Option<Arc<dyn ResiliencePolicy>>, TransportOptions) {
		let Self { headers, query, timeout, resilience_policy } = self;

		(resilience_policy, TransportOptions { headers, query, timeout })
	}
}
impl Debug for RequestOptions {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestOptions")
			.field("headers", &self.headers)
			.field("query", &self.query)
			.field("timeout", &self.timeout)
			.field("resilience_policy", &self.resilience_policy.is_some())
			.finish()
	}
}

/// Transport pass-through part of [`RequestOptions`]; serialized into request snapshots.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TransportOptions {
	/// Extra headers.
	#[serde(skip_serializing_if = "BTreeMap::is_empty")]
	pub headers: BTreeMap<String, String>,
	/// Query pairs.
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub query: Vec<(String, String)>,
	/// Per-request timeout.
	#[serde(
		rename = "timeout_ms",
		serialize_with = "as_millis",
		skip_serializing_if = "Option::is_none"
	)]
	pub timeout: Option<StdDuration>,
}

fn as_millis<S>(timeout: &Option<StdDuration>, serializer: S) -> Result<S::Ok, S::Error>
where
	S: serde::Serializer,
{
	match timeout {
		Some(timeout) => serializer.serialize_u128(timeout.as_millis()),
		None => serializer.serialize_none(),
	}
}

/// Normalized response returned by every verb.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JsonResponse<T> {
	/// Body coerced into the requested shape.
	pub data: T,
	/// HTTP status code of the final response.
	pub status_code: u16,
}
impl<T> JsonResponse<T> {
	/// Maps the payload while keeping the status code.
	pub fn map<U, F>(self, f: F) -> JsonResponse<U>
	where
		F: FnOnce(T) -> U,
	{
		JsonResponse { data: f(self.data), status_code: self.status_code }
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::resilience::ExecuteOnce;

	#[test]
	fn into_parts_splits_policy_from_transport_options() {
		let (policy, transport) = RequestOptions::default()
			.header("x-trace", "1")
			.query("page", "2")
			.timeout(StdDuration::from_millis(250))
			.resilience_policy(Arc::new(ExecuteOnce::default()))
			.into_parts();

		assert!(policy.is_some());
		assert_eq!(
			serde_json::to_value(&transport).expect("Options should serialize."),
			json!({ "headers": { "x-trace": "1" }, "query": [["page", "2"]], "timeout_ms": 250 })
		);
		assert_eq!(
			serde_json::to_value(TransportOptions::default()).expect("Options should serialize."),
			json!({})
		);
	}
}
