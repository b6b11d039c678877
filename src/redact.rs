//! Field-name based redaction for diagnostic payloads.
//!
//! [`redact`] deep-copies a JSON value and applies [`MaskRules`] to every field whose name
//! matches, at any depth and inside any array element. Containers are traversed rather than
//! redacted wholesale; only leaves are hidden or masked. A leaf is a scalar or a non-empty
//! array holding only scalars.

// crates.io
use serde_json::{Map, Value};
// self
use crate::_prelude::*;

/// Placeholder character used for masked values.
pub const MASK_CHAR: char = '*';

/// Field names to remove (`hide_properties`) or mask (`mask_properties`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskRules {
	/// Fields removed from the copy.
	#[serde(default)]
	pub hide_properties: Vec<String>,
	/// Fields replaced by a same-length run of [`MASK_CHAR`].
	#[serde(default)]
	pub mask_properties: Vec<String>,
}
impl MaskRules {
	/// Adds field names to hide.
	pub fn hide<I, S>(mut self, names: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.hide_properties.extend(names.into_iter().map(Into::into));

		self
	}

	/// Adds field names to mask.
	pub fn mask<I, S>(mut self, names: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.mask_properties.extend(names.into_iter().map(Into::into));

		self
	}

	/// Whether no rule is configured.
	pub fn is_empty(&self) -> bool {
		self.hide_properties.is_empty() && self.mask_properties.is_empty()
	}

	fn action(&self, name: &str) -> Option<Action> {
		// Hiding wins when a name is listed twice.
		if self.hide_properties.iter().any(|n| n == name) {
			Some(Action::Hide)
		} else if self.mask_properties.iter().any(|n| n == name) {
			Some(Action::Mask)
		} else {
			None
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
	Hide,
	Mask,
}

/// Returns a redacted deep copy of `value`; the input is never modified.
pub fn redact(value: &Value, rules: &MaskRules) -> Value {
	let mut copy = value.clone();

	if rules.is_empty() {
		return copy;
	}

	match &mut copy {
		Value::Object(map) => redact_object(map, rules),
		Value::Array(items) => redact_items(items, rules),
		_ => {},
	}

	copy
}

/// Serializes `value` and redacts the result.
pub fn redact_serializable<T>(value: &T, rules: &MaskRules) -> Result<Value, serde_json::Error>
where
	T: ?Sized + Serialize,
{
	serde_json::to_value(value).map(|v| redact(&v, rules))
}

fn redact_object(map: &mut Map<String, Value>, rules: &MaskRules) {
	let mut hidden = Vec::new();

	for (name, field) in map.iter_mut() {
		match field {
			Value::Null => {},
			Value::Object(inner) => redact_object(inner, rules),
			Value::Array(items) if !is_leaf_sequence(items) => redact_items(items, rules),
			_ => match rules.action(name) {
				Some(Action::Hide) => hidden.push(name.clone()),
				Some(Action::Mask) => *field = mask(field),
				None => {},
			},
		}
	}

	for name in hidden {
		map.remove(&name);
	}
}

fn redact_items(items: &mut [Value], rules: &MaskRules) {
	for item in items {
		match item {
			Value::Object(inner) => redact_object(inner, rules),
			Value::Array(nested) => redact_items(nested, rules),
			_ => {},
		}
	}
}

fn is_leaf_sequence(items: &[Value]) -> bool {
	!items.is_empty() && items.iter().all(|item| !item.is_object() && !item.is_array())
}

fn mask(value: &Value) -> Value {
	let len = match value {
		Value::String(s) => s.chars().count(),
		Value::Array(items) => items.len(),
		other => other.to_string().chars().count(),
	};

	Value::String(std::iter::repeat_n(MASK_CHAR, len).collect())
}
