//! Mock Kubernetes API discovery types.

use std::collections::BTreeMap;

use serde_json::json;

/// Discovery mode for the mock server.
#[derive(Debug, Clone, Copy, Default)]
pub enum DiscoveryMode {
	/// Support aggregated discovery (APIGroupDiscoveryList).
	#[default]
	Aggregated,
	/// Return 406 for aggregated discovery, forcing fallback to legacy endpoints.
	Legacy,
}

/// Resources the mock server advertises, keyed by group version.
#[derive(Debug, Clone)]
pub struct MockDiscovery {
	pub core_resources: Vec<MockApiResource>,
	pub group_resources: BTreeMap<String, Vec<MockApiResource>>,
}

impl Default for MockDiscovery {
	fn default() -> Self {
		Self {
			core_resources: vec![
				MockApiResource::namespaced("configmaps", "ConfigMap"),
				MockApiResource::namespaced("secrets", "Secret"),
				MockApiResource::namespaced("services", "Service"),
				MockApiResource::namespaced("pods", "Pod"),
				MockApiResource::cluster_scoped("namespaces", "Namespace"),
			],
			group_resources: BTreeMap::from([
				(
					"apps/v1".to_string(),
					vec![
						MockApiResource::namespaced("deployments", "Deployment"),
						MockApiResource::namespaced("statefulsets", "StatefulSet"),
						MockApiResource::namespaced("daemonsets", "DaemonSet"),
					],
				),
				(
					"rbac.authorization.k8s.io/v1".to_string(),
					vec![
						MockApiResource::namespaced("roles", "Role"),
						MockApiResource::namespaced("rolebindings", "RoleBinding"),
						MockApiResource::cluster_scoped("clusterroles", "ClusterRole"),
						MockApiResource::cluster_scoped("clusterrolebindings", "ClusterRoleBinding"),
					],
				),
			]),
		}
	}
}

impl MockDiscovery {
	/// Find the resource serving `kind` in `api_version`.
	pub fn resource(&self, api_version: &str, kind: &str) -> Option<&MockApiResource> {
		let resources = if api_version.contains('/') {
			self.group_resources.get(api_version)?
		} else if api_version == "v1" {
			&self.core_resources
		} else {
			return None;
		};
		resources.iter().find(|r| r.kind == kind)
	}

	/// Body of `GET /api` under aggregated discovery.
	pub(crate) fn aggregated_core(&self) -> serde_json::Value {
		json!({
			"kind": "APIGroupDiscoveryList",
			"apiVersion": "apidiscovery.k8s.io/v2",
			"items": [aggregated_group("", "v1", &self.core_resources)],
		})
	}

	/// Body of `GET /apis` under aggregated discovery.
	pub(crate) fn aggregated_groups(&self) -> serde_json::Value {
		let items: Vec<_> = self
			.group_resources
			.iter()
			.map(|(gv, resources)| {
				let (group, version) = split_group_version(gv);
				aggregated_group(group, version, resources)
			})
			.collect();
		json!({
			"kind": "APIGroupDiscoveryList",
			"apiVersion": "apidiscovery.k8s.io/v2",
			"items": items,
		})
	}

	/// Body of legacy `GET /apis`.
	pub(crate) fn group_list(&self) -> serde_json::Value {
		let groups: Vec<_> = self
			.group_resources
			.keys()
			.map(|gv| {
				let (group, version) = split_group_version(gv);
				json!({
					"name": group,
					"versions": [{"groupVersion": gv, "version": version}],
					"preferredVersion": {"groupVersion": gv, "version": version},
				})
			})
			.collect();
		json!({"kind": "APIGroupList", "apiVersion": "v1", "groups": groups})
	}

	/// Legacy `APIResourceList` bodies keyed by request path.
	pub(crate) fn resource_lists(&self) -> Vec<(String, serde_json::Value)> {
		std::iter::once(("/api/v1".to_string(), resource_list("v1", &self.core_resources)))
			.chain(
				self.group_resources
					.iter()
					.map(|(gv, resources)| (format!("/apis/{gv}"), resource_list(gv, resources))),
			)
			.collect()
	}
}

fn split_group_version(gv: &str) -> (&str, &str) {
	gv.split_once('/').unwrap_or(("", gv))
}

fn aggregated_group(group: &str, version: &str, resources: &[MockApiResource]) -> serde_json::Value {
	let resources: Vec<_> = resources
		.iter()
		.map(|r| {
			json!({
				"resource": r.name,
				"responseKind": {"group": group, "version": version, "kind": r.kind},
				"scope": if r.namespaced { "Namespaced" } else { "Cluster" },
				"verbs": r.verbs,
			})
		})
		.collect();
	json!({
		"metadata": {"name": group},
		"versions": [{"version": version, "resources": resources, "freshness": "Current"}],
	})
}

fn resource_list(group_version: &str, resources: &[MockApiResource]) -> serde_json::Value {
	let resources: Vec<_> = resources
		.iter()
		.map(|r| {
			json!({
				"name": r.name,
				"singularName": "",
				"namespaced": r.namespaced,
				"kind": r.kind,
				"verbs": r.verbs,
			})
		})
		.collect();
	json!({
		"kind": "APIResourceList",
		"apiVersion": "v1",
		"groupVersion": group_version,
		"resources": resources,
	})
}

/// A mock API resource definition.
#[derive(Debug, Clone)]
pub struct MockApiResource {
	pub name: String,
	pub kind: String,
	pub namespaced: bool,
	pub verbs: Vec<String>,
}

impl MockApiResource {
	const VERBS: [&'static str; 7] = ["create", "delete", "get", "list", "patch", "update", "watch"];

	pub fn namespaced(name: &str, kind: &str) -> Self {
		Self::new(name, kind, true)
	}

	pub fn cluster_scoped(name: &str, kind: &str) -> Self {
		Self::new(name, kind, false)
	}

	fn new(name: &str, kind: &str, namespaced: bool) -> Self {
		Self {
			name: name.to_string(),
			kind: kind.to_string(),
			namespaced,
			verbs: Self::VERBS.iter().map(ToString::to_string).collect(),
		}
	}
}
