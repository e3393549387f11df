//! Label and field selectors as understood by the mock server.
//!
//! Only equality-based selectors are supported. Anything else is rejected the
//! way the API server rejects a malformed selector.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
	#[error("invalid selector requirement `{0}`")]
	InvalidRequirement(String),

	#[error("field label not supported: {0}")]
	UnsupportedField(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LabelRequirement {
	Equals(String, String),
	NotEquals(String, String),
	Exists(String),
	NotExists(String),
}

/// Parsed `labelSelector` query parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector(Vec<LabelRequirement>);

impl LabelSelector {
	pub fn parse(selector: &str) -> Result<Self, SelectorError> {
		split(selector).map(parse_label_requirement).collect::<Result<_, _>>().map(Self)
	}

	/// Whether an object with `labels` is selected.
	pub fn matches(&self, labels: Option<&serde_json::Map<String, serde_json::Value>>) -> bool {
		let label = |key: &str| labels.and_then(|l| l.get(key)).and_then(serde_json::Value::as_str);
		self.0.iter().all(|requirement| match requirement {
			LabelRequirement::Equals(key, value) => label(key) == Some(value.as_str()),
			LabelRequirement::NotEquals(key, value) => label(key) != Some(value.as_str()),
			LabelRequirement::Exists(key) => label(key).is_some(),
			LabelRequirement::NotExists(key) => label(key).is_none(),
		})
	}

	/// Whether `object` is selected by its `metadata.labels`.
	pub fn matches_object(&self, object: &serde_json::Value) -> bool {
		self.matches(
			object
				.pointer("/metadata/labels")
				.and_then(serde_json::Value::as_object),
		)
	}
}

fn split(selector: &str) -> impl Iterator<Item = &str> {
	selector.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_label_requirement(requirement: &str) -> Result<LabelRequirement, SelectorError> {
	let invalid = || SelectorError::InvalidRequirement(requirement.to_string());

	let parsed = if let Some((key, value)) = requirement.split_once("!=") {
		LabelRequirement::NotEquals(key.trim().to_string(), value.trim().to_string())
	} else if let Some((key, value)) = requirement
		.split_once("==")
		.or_else(|| requirement.split_once('='))
	{
		LabelRequirement::Equals(key.trim().to_string(), value.trim().to_string())
	} else if let Some(key) = requirement.strip_prefix('!') {
		LabelRequirement::NotExists(key.trim().to_string())
	} else {
		LabelRequirement::Exists(requirement.to_string())
	};

	let (key, value) = match &parsed {
		LabelRequirement::Equals(key, value) | LabelRequirement::NotEquals(key, value) => {
			(key, Some(value))
		}
		LabelRequirement::Exists(key) | LabelRequirement::NotExists(key) => (key, None),
	};
	if !is_valid_key(key) || !value.is_none_or(|v| is_valid_value(v)) {
		return Err(invalid());
	}
	Ok(parsed)
}

fn is_valid_key(key: &str) -> bool {
	!key.is_empty()
		&& key
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
}

fn is_valid_value(value: &str) -> bool {
	value
		.chars()
		.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldRequirement {
	pointer: &'static str,
	value: String,
	negated: bool,
}

/// Parsed `fieldSelector` query parameter.
///
/// Supports `metadata.name` and `metadata.namespace`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector(Vec<FieldRequirement>);

impl FieldSelector {
	pub fn parse(selector: &str) -> Result<Self, SelectorError> {
		split(selector).map(parse_field_requirement).collect::<Result<_, _>>().map(Self)
	}

	pub fn matches_object(&self, object: &serde_json::Value) -> bool {
		self.0.iter().all(|requirement| {
			let actual = object
				.pointer(requirement.pointer)
				.and_then(serde_json::Value::as_str)
				.unwrap_or_default();
			(actual == requirement.value) != requirement.negated
		})
	}
}

fn parse_field_requirement(requirement: &str) -> Result<FieldRequirement, SelectorError> {
	let (field, value, negated) = if let Some((field, value)) = requirement.split_once("!=") {
		(field, value, true)
	} else if let Some((field, value)) = requirement
		.split_once("==")
		.or_else(|| requirement.split_once('='))
	{
		(field, value, false)
	} else {
		return Err(SelectorError::InvalidRequirement(requirement.to_string()));
	};

	let pointer = match field.trim() {
		"metadata.name" => "/metadata/name",
		"metadata.namespace" => "/metadata/namespace",
		other => return Err(SelectorError::UnsupportedField(other.to_string())),
	};
	Ok(FieldRequirement {
		pointer,
		value: value.trim().to_string(),
		negated,
	})
}
