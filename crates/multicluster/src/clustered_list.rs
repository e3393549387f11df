//! Request and result types of a clustered list.

use std::{collections::BTreeMap, time::Duration};

use bon::Builder;
use kube::api::{DynamicObject, ListParams};
use tokio_util::sync::CancellationToken;

use crate::{
	continuation::ResumptionState,
	error::ClusteredListError,
	kinds::ResourceKind,
	scope::Scope,
};

/// Parameters of one clustered-list round.
///
/// Selectors and `limit` are applied identically to every scope; the
/// per-scope cursor is derived from `continue_token`.
#[derive(Debug, Clone, Builder)]
pub struct ClusteredListRequest {
	/// What to list.
	pub kind: ResourceKind,
	/// Token returned by the previous round, or empty for a fresh scan.
	#[builder(into, default)]
	pub continue_token: String,
	/// Maximum items per scope.
	pub limit: Option<u32>,
	#[builder(into)]
	pub label_selector: Option<String>,
	#[builder(into)]
	pub field_selector: Option<String>,
	/// Cancels the round when triggered.
	#[builder(default)]
	pub cancel: CancellationToken,
	/// Cancels the round once elapsed.
	pub timeout: Option<Duration>,
}

impl ClusteredListRequest {
	/// List parameters shared by every scope of the round.
	pub(crate) fn list_params(&self) -> ListParams {
		ListParams {
			label_selector: self.label_selector.clone(),
			field_selector: self.field_selector.clone(),
			limit: self.limit,
			..Default::default()
		}
	}
}

/// Items one scope returned in the current round.
#[derive(Debug, Clone)]
pub struct ScopedList {
	pub scope: Scope,
	pub items: Vec<DynamicObject>,
	/// `metadata.resourceVersion` of the upstream list.
	pub resource_version: Option<String>,
}

/// Result of a clustered-list round.
#[derive(Debug, Default)]
pub struct ClusteredList {
	lists: BTreeMap<String, Vec<ScopedList>>,
	next: Option<ResumptionState>,
	errors: ClusteredListError,
}

impl ClusteredList {
	pub(crate) fn push(&mut self, list: ScopedList) {
		self.lists
			.entry(list.scope.cluster.clone())
			.or_default()
			.push(list);
	}

	pub(crate) fn push_error(&mut self, error: crate::error::ScopeError) {
		self.errors.push(error);
	}

	pub(crate) fn set_next(&mut self, next: ResumptionState) {
		self.next = Some(next);
	}

	/// Per-cluster lists, one per visited scope, in scope order.
	pub fn lists(&self) -> &BTreeMap<String, Vec<ScopedList>> {
		&self.lists
	}

	/// Lists of one cluster; empty when no scope of it was visited.
	pub fn lists_for(&self, cluster: &str) -> &[ScopedList] {
		self.lists.get(cluster).map_or(&[], Vec::as_slice)
	}

	/// Every returned item with the cluster it came from.
	pub fn items(&self) -> impl Iterator<Item = (&str, &DynamicObject)> {
		self.lists.iter().flat_map(|(cluster, lists)| {
			lists
				.iter()
				.flat_map(move |list| list.items.iter().map(move |item| (cluster.as_str(), item)))
		})
	}

	/// Scopes with more data after this round.
	///
	/// `None` when the round did not complete and must not be resumed.
	pub fn next_state(&self) -> Option<&ResumptionState> {
		self.next.as_ref()
	}

	/// Token for the next round.
	///
	/// Non-empty once the round completed; it encodes an empty state when
	/// every scope is exhausted. Empty for an incomplete round.
	pub fn continue_token(&self) -> String {
		self.next
			.as_ref()
			.map(ResumptionState::encode)
			.unwrap_or_default()
	}

	/// Whether further rounds would return more data.
	pub fn has_more(&self) -> bool {
		self.next.as_ref().is_some_and(|next| !next.is_empty())
	}

	/// Scopes that failed this round, if any.
	pub fn errors(&self) -> Option<&ClusteredListError> {
		(!self.errors.is_empty()).then_some(&self.errors)
	}

	/// Split into the collected data and the per-scope failures.
	pub fn into_parts(self) -> (Self, Option<ClusteredListError>) {
		let Self {
			lists,
			next,
			errors,
		} = self;
		let errors = (!errors.is_empty()).then_some(errors);
		(
			Self {
				lists,
				next,
				errors: ClusteredListError::default(),
			},
			errors,
		)
	}

	/// Fail with the per-scope errors, discarding partial data.
	pub fn into_result(self) -> Result<Self, ClusteredListError> {
		match self.into_parts() {
			(_, Some(errors)) => Err(errors),
			(list, None) => Ok(list),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn scoped(cluster: &str, namespace: &str, names: &[&str]) -> ScopedList {
		ScopedList {
			scope: Scope::namespaced(cluster, namespace),
			items: names
				.iter()
				.map(|name| {
					let mut obj = DynamicObject {
						types: None,
						metadata: Default::default(),
						data: serde_json::Value::Null,
					};
					obj.metadata.name = Some((*name).to_string());
					obj
				})
				.collect(),
			resource_version: None,
		}
	}

	#[test]
	fn test_items_grouped_by_cluster_in_scope_order() {
		let mut list = ClusteredList::default();
		list.push(scoped("west", "x", &["w1"]));
		list.push(scoped("east", "b", &["b1", "b2"]));
		list.push(scoped("east", "a", &["a1"]));

		let names: Vec<_> = list
			.items()
			.map(|(cluster, obj)| format!("{cluster}/{}", obj.metadata.name.as_deref().unwrap()))
			.collect();

		assert_eq!(names, ["east/b1", "east/b2", "east/a1", "west/w1"]);
		assert_eq!(list.lists_for("east").len(), 2);
		assert!(list.lists_for("north").is_empty());
	}

	#[test]
	fn test_incomplete_round_has_no_token() {
		let list = ClusteredList::default();
		assert_eq!(list.continue_token(), "");
		assert!(!list.has_more());
	}

	#[test]
	fn test_exhausted_round_has_terminal_token() {
		let mut list = ClusteredList::default();
		list.set_next(ResumptionState::default());
		assert!(!list.continue_token().is_empty());
		assert!(!list.has_more());
	}

	#[test]
	fn test_request_builder_defaults() {
		let request = ClusteredListRequest::builder()
			.kind(ResourceKind::namespaced::<k8s_openapi::api::core::v1::ConfigMap>())
			.limit(5)
			.label_selector("app=web")
			.build();

		assert_eq!(request.continue_token, "");
		assert!(!request.cancel.is_cancelled());
		let params = request.list_params();
		assert_eq!(params.limit, Some(5));
		assert_eq!(params.label_selector.as_deref(), Some("app=web"));
		assert_eq!(params.continue_token, None);
	}
}
