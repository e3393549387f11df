//! The identity a request is made on behalf of.

use serde::{Deserialize, Serialize};

/// An authenticated caller.
///
/// Requests against every cluster are impersonated as this principal: `id`
/// becomes the `Impersonate-User` header and every group an
/// `Impersonate-Group` header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
	pub id: String,
	#[serde(default)]
	pub groups: Vec<String>,
}

impl Principal {
	pub fn new(id: impl Into<String>, groups: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			id: id.into(),
			groups: groups.into_iter().map(Into::into).collect(),
		}
	}

	/// A principal without group memberships.
	pub fn user(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			groups: Vec::new(),
		}
	}
}
