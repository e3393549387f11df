//! Query scopes and the order they are visited in.

use std::{
	collections::{BTreeMap, BTreeSet},
	fmt,
};

use serde::{Deserialize, Serialize};

use crate::{continuation::ResumptionState, namespaces::AccessibleNamespaces};

/// Kubernetes API resource scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceScope {
	/// Resource is namespaced (e.g., Deployment, ConfigMap).
	Namespaced,

	/// Resource is cluster-wide (e.g., Namespace, ClusterRole).
	ClusterWide,
}

/// The unit of one list call: a namespace in a cluster, or a whole cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
	pub cluster: String,
	/// `None` for the cluster-wide pseudo-scope.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub namespace: Option<String>,
}

impl Scope {
	pub fn namespaced(cluster: impl Into<String>, namespace: impl Into<String>) -> Self {
		Self {
			cluster: cluster.into(),
			namespace: Some(namespace.into()),
		}
	}

	pub fn cluster_wide(cluster: impl Into<String>) -> Self {
		Self {
			cluster: cluster.into(),
			namespace: None,
		}
	}
}

impl fmt::Display for Scope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.namespace {
			Some(namespace) => write!(f, "cluster `{}` namespace `{}`", self.cluster, namespace),
			None => write!(f, "cluster `{}`", self.cluster),
		}
	}
}

/// Every scope of `cluster` in visiting order.
///
/// Namespaced resources get one scope per accessible namespace, cluster-wide
/// resources a single scope regardless of the namespace snapshot.
pub fn enumerate(
	cluster: &str,
	resource_scope: ResourceScope,
	namespaces: &AccessibleNamespaces,
) -> Vec<Scope> {
	match resource_scope {
		ResourceScope::Namespaced => namespaces
			.names(cluster)
			.map(|ns| Scope::namespaced(cluster, ns))
			.collect(),
		ResourceScope::ClusterWide => vec![Scope::cluster_wide(cluster)],
	}
}

/// A scope scheduled for the current round, with the cursor to resume from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedScope {
	pub scope: Scope,
	pub cursor: Option<String>,
}

/// The scopes one clustered-list round visits.
#[derive(Debug, Default)]
pub struct RoundPlan {
	/// Scopes per registered cluster, in visiting order. Clusters with no
	/// scope this round are absent.
	pub clusters: BTreeMap<String, Vec<PlannedScope>>,
	/// Resumed scopes whose cluster is no longer registered.
	pub unregistered: Vec<Scope>,
}

impl RoundPlan {
	/// Plan a round over `clusters`.
	///
	/// Without a resumption state every scope is visited from the start. With
	/// one, only the scopes it holds are visited, each from its recorded
	/// cursor. Resumed scopes that are no longer accessible are skipped.
	pub fn new<'a>(
		clusters: impl IntoIterator<Item = &'a str>,
		resource_scope: ResourceScope,
		namespaces: &AccessibleNamespaces,
		resume: Option<&ResumptionState>,
	) -> Self {
		let mut plan = Self::default();
		let mut registered = BTreeSet::new();

		for cluster in clusters {
			registered.insert(cluster);

			let planned: Vec<_> = enumerate(cluster, resource_scope, namespaces)
				.into_iter()
				.filter_map(|scope| match resume {
					None => Some(PlannedScope {
						scope,
						cursor: None,
					}),
					Some(state) => state.cursor(&scope).map(|cursor| PlannedScope {
						cursor: Some(cursor.to_string()),
						scope,
					}),
				})
				.collect();

			if !planned.is_empty() {
				plan.clusters.insert(cluster.to_string(), planned);
			}
		}

		if let Some(state) = resume {
			for (scope, _) in state.iter() {
				if !registered.contains(scope.cluster.as_str()) {
					plan.unregistered.push(scope.clone());
				} else if !plan.contains(scope) {
					tracing::debug!(%scope, "skipping resumed scope that is no longer accessible");
				}
			}
		}

		plan
	}

	pub fn contains(&self, scope: &Scope) -> bool {
		self.clusters
			.get(&scope.cluster)
			.is_some_and(|planned| planned.iter().any(|p| &p.scope == scope))
	}

	/// Total scopes across registered clusters.
	pub fn scope_count(&self) -> usize {
		self.clusters.values().map(Vec::len).sum()
	}
}
