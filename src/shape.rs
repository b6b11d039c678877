//! Call-site shape coercion for decoded JSON bodies.
//!
//! The target shape is a type parameter resolved where the call is made; coercion runs
//! through `serde` so failures report the JSON path that did not fit.

// crates.io
use serde::{Deserializer, de::Error as _};
use serde_json::Value;
// self
use crate::{_prelude::*, error::ShapeError};

/// Coerces a decoded body into `T`, reporting the failing path on mismatch.
///
/// `T = serde_json::Value` returns the body unchanged.
pub fn plain_to_shape<T>(plain: Value) -> Result<T, ShapeError>
where
	T: DeserializeOwned,
{
	serde_path_to_error::deserialize(plain).map_err(|source| ShapeError::Mismatch { source })
}

/// Coerces each element of a JSON array into `T`.
pub fn plain_to_shape_each<T>(plain: Value) -> Result<Vec<T>, ShapeError>
where
	T: DeserializeOwned,
{
	match plain {
		Value::Array(_) => plain_to_shape(plain),
		other => Err(ShapeError::ExpectedSequence { found: json_type(&other) }),
	}
}

/// Body coerced element-wise: `null` passes through, arrays map per element.
#[derive(Clone, Debug, PartialEq)]
pub enum Shaped<T> {
	/// The body was `null` or empty.
	Absent,
	/// The body was a single value.
	One(T),
	/// The body was an array; each element was coerced on its own.
	Many(Vec<T>),
}
impl<T> Shaped<T> {
	/// Coerces `plain` according to its JSON type.
	pub fn coerce(plain: Value) -> Result<Self, ShapeError>
	where
		T: DeserializeOwned,
	{
		match plain {
			Value::Null => Ok(Self::Absent),
			Value::Array(_) => plain_to_shape_each(plain).map(Self::Many),
			other => plain_to_shape(other).map(Self::One),
		}
	}

	/// Flattens into a vector; `Absent` yields an empty one.
	pub fn into_vec(self) -> Vec<T> {
		match self {
			Self::Absent => Vec::new(),
			Self::One(value) => vec![value],
			Self::Many(values) => values,
		}
	}
}
impl<'de, T> Deserialize<'de> for Shaped<T>
where
	T: DeserializeOwned,
{
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let plain = Value::deserialize(deserializer)?;

		Self::coerce(plain).map_err(D::Error::custom)
	}
}

pub(crate) fn json_type(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "a boolean",
		Value::Number(_) => "a number",
		Value::String(_) => "a string",
		Value::Array(_) => "an array",
		Value::Object(_) => "an object",
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	#[derive(Debug, PartialEq, Deserialize)]
	#[serde(rename_all = "snake_case")]
	enum Outcome {
		Open,
		Closed,
	}

	#[derive(Debug, PartialEq, Deserialize)]
	#[serde(rename_all = "camelCase")]
	struct Hit {
		id: u32,
		outcome: Outcome,
	}

	#[derive(Debug, PartialEq, Deserialize)]
	#[serde(rename_all = "camelCase")]
	struct Report {
		id: u32,
		display_name: String,
		hits: Vec<Hit>,
	}

	fn plain() -> Value {
		json!({
			"id": 1,
			"displayName": "test",
			"hits": [
				{ "id": 1, "outcome": "open" },
				{ "id": 2, "outcome": "closed" }
			]
		})
	}

	#[test]
	fn coerces_nested_values() {
		let report: Report = plain_to_shape(plain()).expect("Plain report should coerce.");

		assert_eq!(report.display_name, "test");
		assert_eq!(report.hits[1], Hit { id: 2, outcome: Outcome::Closed });
	}

	#[test]
	fn raw_values_pass_through() {
		let value: Value = plain_to_shape(plain()).expect("Value target should accept anything.");

		assert_eq!(value, plain());
	}

	#[test]
	fn arrays_coerce_element_wise() {
		let many = Shaped::<Report>::coerce(json!([plain(), plain(), plain()]))
			.expect("Array of reports should coerce.");

		assert!(matches!(&many, Shaped::Many(items) if items.len() == 3));
		assert_eq!(Shaped::<Report>::coerce(Value::Null).expect("Null should pass."), Shaped::Absent);
	}

	#[test]
	fn mismatch_reports_path() {
		let mut broken = plain();

		broken["hits"][1]["outcome"] = json!("pending");

		let err = plain_to_shape::<Report>(broken).expect_err("Unknown outcome should fail.");

		assert!(err.to_string().contains("hits[1].outcome"), "{err}");
	}
}
