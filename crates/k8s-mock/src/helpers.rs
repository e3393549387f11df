//! JSON helpers for building mock API responses.

use serde_json::{json, Value};
use wiremock::ResponseTemplate;

/// Apply a JSON merge patch (RFC 7386) to `base`.
///
/// `null` in the patch removes the key.
pub fn merge_json(base: Value, patch: Value) -> Value {
	match (base, patch) {
		(Value::Object(mut base), Value::Object(patch)) => {
			for (key, value) in patch {
				if value.is_null() {
					base.remove(&key);
					continue;
				}
				let existing = base.remove(&key).unwrap_or(Value::Null);
				base.insert(key, merge_json(existing, value));
			}
			Value::Object(base)
		}
		(_, patch) => patch,
	}
}

/// Drop strategic merge patch directives (`$patch`, `$setElementOrder/...`).
///
/// They steer the server's merge and never belong in a stored object.
pub fn strip_strategic_merge_directives(value: Value) -> Value {
	match value {
		Value::Object(map) => Value::Object(
			map.into_iter()
				.filter(|(key, _)| !key.starts_with('$'))
				.map(|(key, value)| (key, strip_strategic_merge_directives(value)))
				.collect(),
		),
		Value::Array(items) => Value::Array(
			items
				.into_iter()
				.map(strip_strategic_merge_directives)
				.collect(),
		),
		other => other,
	}
}

/// A `Status` failure response, shaped like the API server's.
pub fn status_failure(code: u16, reason: &str, message: impl Into<String>) -> ResponseTemplate {
	ResponseTemplate::new(code).set_body_json(json!({
		"kind": "Status",
		"apiVersion": "v1",
		"metadata": {},
		"status": "Failure",
		"message": message.into(),
		"reason": reason,
		"code": code,
	}))
}

/// The `Status` returned once an object is deleted.
pub fn status_deleted(name: &str, plural: &str) -> ResponseTemplate {
	ResponseTemplate::new(200).set_body_json(json!({
		"kind": "Status",
		"apiVersion": "v1",
		"metadata": {},
		"status": "Success",
		"details": {"name": name, "kind": plural},
		"code": 200,
	}))
}
