//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use k8s_mock::{HttpMockK8sServer, RunningHttpMockK8sServer};
use multicluster::{
	AccessibleNamespaces, ClientConfigBuilder, ClientsPool, Cluster, ClustersClient,
	ImpersonatingConfig, Principal,
};
use serde_json::json;

pub fn configmap(namespace: &str, name: &str) -> serde_json::Value {
	json!({
		"apiVersion": "v1",
		"kind": "ConfigMap",
		"metadata": {"name": name, "namespace": namespace},
		"data": {"owner": name},
	})
}

pub fn labelled_configmap(namespace: &str, name: &str, app: &str) -> serde_json::Value {
	let mut cm = configmap(namespace, name);
	cm["metadata"]["labels"] = json!({"app": app});
	cm
}

pub fn cluster_role(name: &str) -> serde_json::Value {
	json!({
		"apiVersion": "rbac.authorization.k8s.io/v1",
		"kind": "ClusterRole",
		"metadata": {"name": name},
		"rules": [],
	})
}

pub async fn server_with(resources: Vec<serde_json::Value>) -> RunningHttpMockK8sServer {
	HttpMockK8sServer::builder()
		.resources(resources)
		.build()
		.start()
		.await
}

/// A pool registering each server under the given cluster name.
pub fn pool_with_builder(
	clusters: &[(&str, &RunningHttpMockK8sServer)],
	builder: Arc<dyn ClientConfigBuilder>,
) -> Arc<ClientsPool> {
	let pool = ClientsPool::new();
	for (name, server) in clusters {
		pool.add(Cluster::new(*name, server.uri()), Arc::clone(&builder))
			.expect("mock cluster should register");
	}
	Arc::new(pool)
}

pub fn pool(clusters: &[(&str, &RunningHttpMockK8sServer)]) -> Arc<ClientsPool> {
	pool_with_builder(clusters, Arc::new(ImpersonatingConfig::default()))
}

pub fn anne() -> Principal {
	Principal::new("anne", ["devs"])
}

/// Client for `anne` over `clusters`, seeing `namespaces`.
pub fn client(
	clusters: &[(&str, &RunningHttpMockK8sServer)],
	namespaces: &[(&str, &[&str])],
) -> ClustersClient {
	let namespaces = AccessibleNamespaces::from_names(
		namespaces
			.iter()
			.map(|(cluster, names)| (*cluster, names.iter().copied())),
	);
	ClustersClient::new(pool(clusters), anne(), namespaces)
}

/// Names of the items of a list, `cluster/namespace/name`.
pub fn item_names(list: &multicluster::ClusteredList) -> Vec<String> {
	list.items()
		.map(|(cluster, obj)| {
			format!(
				"{cluster}/{}/{}",
				obj.metadata.namespace.as_deref().unwrap_or("-"),
				obj.metadata.name.as_deref().unwrap_or("-"),
			)
		})
		.collect()
}
