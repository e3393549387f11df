//! Resource kinds the federated client can operate on.
//!
//! Operations are kind-agnostic: they work on [`DynamicObject`]s described by
//! an [`ApiResource`]. The registry maps user-facing kind names to those
//! descriptions, either from compiled-in types or from API discovery.

use std::collections::HashMap;

use kube::{
	api::{Api, DynamicObject},
	discovery::{ApiResource, Scope as DiscoveryScope},
	Client, Discovery, Resource,
};
use tracing::instrument;

use crate::scope::ResourceScope;

/// An API resource together with its scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceKind {
	pub api_resource: ApiResource,
	pub scope: ResourceScope,
}

impl ResourceKind {
	pub fn new(api_resource: ApiResource, scope: ResourceScope) -> Self {
		Self {
			api_resource,
			scope,
		}
	}

	/// Describe a compiled-in namespaced type.
	pub fn namespaced<K: Resource<DynamicType = ()>>() -> Self {
		Self::new(ApiResource::erase::<K>(&()), ResourceScope::Namespaced)
	}

	/// Describe a compiled-in cluster-scoped type.
	pub fn cluster_scoped<K: Resource<DynamicType = ()>>() -> Self {
		Self::new(ApiResource::erase::<K>(&()), ResourceScope::ClusterWide)
	}

	pub fn kind(&self) -> &str {
		&self.api_resource.kind
	}

	pub fn is_namespaced(&self) -> bool {
		self.scope == ResourceScope::Namespaced
	}

	/// API handle for this kind. `namespace` is ignored for cluster-scoped
	/// kinds; `None` addresses every namespace of a namespaced kind.
	pub fn api(&self, client: Client, namespace: Option<&str>) -> Api<DynamicObject> {
		match (self.scope, namespace) {
			(ResourceScope::Namespaced, Some(ns)) => {
				Api::namespaced_with(client, ns, &self.api_resource)
			}
			_ => Api::all_with(client, &self.api_resource),
		}
	}
}

/// Case-insensitive lookup of resource kinds by name.
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
	kinds: HashMap<String, ResourceKind>,
}

impl KindRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registry of common built-in kinds.
	pub fn builtin() -> Self {
		use k8s_openapi::api::{
			apps::v1::{DaemonSet, Deployment, StatefulSet},
			core::v1::{ConfigMap, Namespace, Pod, Secret, Service},
			rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding},
		};

		[
			ResourceKind::namespaced::<ConfigMap>(),
			ResourceKind::namespaced::<Secret>(),
			ResourceKind::namespaced::<Service>(),
			ResourceKind::namespaced::<Pod>(),
			ResourceKind::namespaced::<Deployment>(),
			ResourceKind::namespaced::<StatefulSet>(),
			ResourceKind::namespaced::<DaemonSet>(),
			ResourceKind::namespaced::<Role>(),
			ResourceKind::namespaced::<RoleBinding>(),
			ResourceKind::cluster_scoped::<Namespace>(),
			ResourceKind::cluster_scoped::<ClusterRole>(),
			ResourceKind::cluster_scoped::<ClusterRoleBinding>(),
		]
		.into_iter()
		.collect()
	}

	/// Build the registry from a cluster's discovery API.
	///
	/// Uses aggregated discovery (K8s 1.26+) and falls back to per-group
	/// discovery for older clusters. Only the preferred version of each group
	/// is registered; when two groups serve the same kind the first one wins.
	#[instrument(skip(client))]
	pub async fn discover(client: &Client) -> Result<Self, kube::Error> {
		let discovery = match Discovery::new(client.clone()).run_aggregated().await {
			Ok(discovery) => {
				tracing::debug!("using aggregated discovery");
				discovery
			}
			Err(e) => {
				tracing::debug!(error = %e, "aggregated discovery not available");
				Discovery::new(client.clone()).run().await?
			}
		};

		let mut registry = Self::new();
		for group in discovery.groups() {
			for (api_resource, capabilities) in group.recommended_resources() {
				let scope = match capabilities.scope {
					DiscoveryScope::Namespaced => ResourceScope::Namespaced,
					DiscoveryScope::Cluster => ResourceScope::ClusterWide,
				};
				registry
					.kinds
					.entry(api_resource.kind.to_ascii_lowercase())
					.or_insert_with(|| ResourceKind::new(api_resource, scope));
			}
		}

		tracing::debug!(kinds = registry.len(), "discovered resource kinds");
		Ok(registry)
	}

	/// Register `kind`, replacing an existing entry with the same name.
	pub fn insert(&mut self, kind: ResourceKind) {
		self.kinds.insert(kind.kind().to_ascii_lowercase(), kind);
	}

	pub fn lookup(&self, kind: &str) -> Option<&ResourceKind> {
		self.kinds.get(&kind.to_ascii_lowercase())
	}

	pub fn len(&self) -> usize {
		self.kinds.len()
	}

	pub fn is_empty(&self) -> bool {
		self.kinds.is_empty()
	}

	/// Registered kinds sorted by name.
	pub fn kinds(&self) -> Vec<&ResourceKind> {
		let mut kinds: Vec<_> = self.kinds.values().collect();
		kinds.sort_by(|a, b| a.kind().cmp(b.kind()));
		kinds
	}
}

impl FromIterator<ResourceKind> for KindRegistry {
	fn from_iter<T: IntoIterator<Item = ResourceKind>>(iter: T) -> Self {
		let mut registry = Self::new();
		for kind in iter {
			registry.insert(kind);
		}
		registry
	}
}

#[cfg(test)]
mod tests {
	use k8s_openapi::api::{core::v1::ConfigMap, rbac::v1::ClusterRole};

	use super::*;

	#[test]
	fn test_lookup_is_case_insensitive() {
		let registry = KindRegistry::builtin();

		let kind = registry.lookup("configmap").expect("ConfigMap is built in");
		assert_eq!(kind.kind(), "ConfigMap");
		assert_eq!(kind.api_resource.plural, "configmaps");
		assert!(kind.is_namespaced());

		assert_eq!(registry.lookup("CONFIGMAP"), Some(kind));
		assert!(registry.lookup("Kustomization").is_none());
	}

	#[test]
	fn test_builtin_scopes() {
		let registry = KindRegistry::builtin();
		assert_eq!(
			registry.lookup("ClusterRole").map(|k| k.scope),
			Some(ResourceScope::ClusterWide)
		);
		assert_eq!(
			registry.lookup("Deployment").map(|k| k.api_resource.group.as_str()),
			Some("apps")
		);
	}

	#[test]
	fn test_insert_replaces_same_kind() {
		let mut registry: KindRegistry = [ResourceKind::namespaced::<ConfigMap>()]
			.into_iter()
			.collect();
		let mut custom = ResourceKind::cluster_scoped::<ClusterRole>();
		custom.api_resource.kind = "ConfigMap".to_string();

		registry.insert(custom);

		assert_eq!(registry.len(), 1);
		assert_eq!(
			registry.lookup("configmap").map(|k| k.scope),
			Some(ResourceScope::ClusterWide)
		);
	}

	#[test]
	fn test_kinds_sorted() {
		let registry: KindRegistry = [
			ResourceKind::namespaced::<ConfigMap>(),
			ResourceKind::cluster_scoped::<ClusterRole>(),
		]
		.into_iter()
		.collect();

		let names: Vec<_> = registry.kinds().into_iter().map(ResourceKind::kind).collect();
		assert_eq!(names, ["ClusterRole", "ConfigMap"]);
	}
}
