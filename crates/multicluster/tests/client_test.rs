//! Integration tests for single-cluster operations of the federated client.

mod common;

use std::{collections::BTreeMap, sync::Arc};

use assert_matches::assert_matches;
use common::{anne, configmap, pool, pool_with_builder, server_with};
use k8s_mock::{DiscoveryMode, HttpMockK8sServer};
use k8s_openapi::{
	api::core::v1::{ConfigMap, Namespace},
	apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::api::{DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use multicluster::{
	AccessibleNamespaces, ClientError, ClusteredListRequest, ClustersClient, KindRegistry,
	Principal, ResourceKind, ResourceScope, ServerIdentityConfig, TENANT_LABEL,
};
use rstest::rstest;
use serde_json::json;

fn configmap_kind() -> ResourceKind {
	ResourceKind::namespaced::<ConfigMap>()
}

fn new_configmap(namespace: &str, name: &str, value: &str) -> DynamicObject {
	DynamicObject::new(name, &configmap_kind().api_resource)
		.within(namespace)
		.data(json!({"data": {"key": value}}))
}

#[tokio::test]
async fn test_get() {
	let server = server_with(vec![configmap("team-a", "app")]).await;
	let client = ClustersClient::new(pool(&[("east", &server)]), anne(), AccessibleNamespaces::new());

	let object = client
		.get("east", &configmap_kind(), Some("team-a"), "app")
		.await
		.expect("object should exist");

	assert_eq!(object.metadata.name.as_deref(), Some("app"));
	assert_eq!(object.data["data"]["owner"], "app");
}

#[tokio::test]
async fn test_get_missing_object_keeps_upstream_error() {
	let server = server_with(Vec::new()).await;
	let client = ClustersClient::new(pool(&[("east", &server)]), anne(), AccessibleNamespaces::new());

	let result = client
		.get("east", &configmap_kind(), Some("team-a"), "missing")
		.await;

	assert_matches!(result, Err(ClientError::Kube(kube::Error::Api(e))) if e.code == 404);
}

#[tokio::test]
async fn test_unknown_cluster() {
	let server = server_with(Vec::new()).await;
	let client = ClustersClient::new(pool(&[("east", &server)]), anne(), AccessibleNamespaces::new());

	let result = client
		.get("west", &configmap_kind(), Some("team-a"), "app")
		.await;

	assert_matches!(result, Err(ClientError::ClusterNotFound(name)) if name == "west");
	assert!(server.received_requests().await.is_empty());
}

#[tokio::test]
async fn test_list_single_cluster() {
	let server = server_with(vec![
		configmap("team-a", "one"),
		configmap("team-a", "two"),
		configmap("team-b", "three"),
	])
	.await;
	let client = ClustersClient::new(pool(&[("east", &server)]), anne(), AccessibleNamespaces::new());

	let in_namespace = client
		.list("east", &configmap_kind(), Some("team-a"), &ListParams::default())
		.await
		.unwrap();
	let everywhere = client
		.list("east", &configmap_kind(), None, &ListParams::default())
		.await
		.unwrap();

	assert_eq!(in_namespace.items.len(), 2);
	assert_eq!(everywhere.items.len(), 3);
}

#[tokio::test]
async fn test_create_update_patch_delete() {
	let server = server_with(Vec::new()).await;
	let client = ClustersClient::new(pool(&[("east", &server)]), anne(), AccessibleNamespaces::new());
	let kind = configmap_kind();
	let stored = |server: &k8s_mock::RunningHttpMockK8sServer| {
		server.object("/api/v1/namespaces/team-a/configmaps/app")
	};

	let created = client
		.create("east", &kind, &new_configmap("team-a", "app", "v1"), &PostParams::default())
		.await
		.expect("create should succeed");
	assert_eq!(created.metadata.namespace.as_deref(), Some("team-a"));
	assert_eq!(stored(&server).unwrap()["data"]["key"], "v1");

	let duplicate = client
		.create("east", &kind, &new_configmap("team-a", "app", "v1"), &PostParams::default())
		.await;
	assert_matches!(duplicate, Err(ClientError::Kube(kube::Error::Api(e))) if e.code == 409);

	let mut replacement = created.clone();
	replacement.data = json!({"data": {"key": "v2"}});
	let updated = client
		.update("east", &kind, &replacement, &PostParams::default())
		.await
		.expect("update should succeed");
	assert_eq!(updated.data["data"]["key"], "v2");

	// `created` carries a stale resource version by now.
	let stale = client
		.update("east", &kind, &created, &PostParams::default())
		.await;
	assert_matches!(stale, Err(ClientError::Kube(kube::Error::Api(e))) if e.code == 409);

	let patched = client
		.patch(
			"east",
			&kind,
			Some("team-a"),
			"app",
			&PatchParams::default(),
			&Patch::Merge(json!({"metadata": {"labels": {"patched": "yes"}}})),
		)
		.await
		.expect("patch should succeed");
	assert_eq!(
		patched.metadata.labels.unwrap().get("patched").map(String::as_str),
		Some("yes")
	);
	assert_eq!(patched.data["data"]["key"], "v2");

	let deleted = client
		.delete("east", &kind, Some("team-a"), "app", &DeleteParams::default())
		.await
		.expect("delete should succeed");
	assert!(deleted.is_none());
	assert!(stored(&server).is_none());
}

#[tokio::test]
async fn test_update_requires_name() {
	let server = server_with(Vec::new()).await;
	let client = ClustersClient::new(pool(&[("east", &server)]), anne(), AccessibleNamespaces::new());
	let mut object = new_configmap("team-a", "app", "v1");
	object.metadata.name = None;

	let result = client
		.update("east", &configmap_kind(), &object, &PostParams::default())
		.await;

	assert_matches!(result, Err(ClientError::MissingName));
}

#[tokio::test]
async fn test_requests_impersonate_principal() {
	let server = server_with(vec![configmap("team-a", "app")]).await;
	let client = ClustersClient::new(
		pool(&[("east", &server)]),
		Principal::new("anne", ["devs", "ops"]),
		AccessibleNamespaces::from_names([("east", ["team-a"])]),
	);

	client
		.get("east", &configmap_kind(), Some("team-a"), "app")
		.await
		.unwrap();
	client
		.clustered_list(
			&ClusteredListRequest::builder()
				.kind(configmap_kind())
				.build(),
		)
		.await
		.unwrap();

	let requests = server.resource_requests().await;
	assert_eq!(requests.len(), 2);
	for request in requests {
		assert_eq!(request.impersonate_user.as_deref(), Some("anne"));
		assert_eq!(request.impersonate_groups, ["devs", "ops"]);
	}
}

#[tokio::test]
async fn test_principals_get_separate_clients() {
	let server = server_with(vec![configmap("team-a", "app")]).await;
	let pool = pool(&[("east", &server)]);
	let namespaces = Arc::new(AccessibleNamespaces::from_names([("east", ["team-a"])]));

	for user in ["anne", "bob"] {
		ClustersClient::new(Arc::clone(&pool), Principal::user(user), Arc::clone(&namespaces))
			.get("east", &configmap_kind(), Some("team-a"), "app")
			.await
			.unwrap();
	}

	assert_eq!(pool.cached_clients(), 2);
	assert_eq!(server.impersonated_users().await, ["anne", "bob"]);

	pool.evict_principal("anne");
	assert_eq!(pool.cached_clients(), 1);
}

#[tokio::test]
async fn test_server_identity_does_not_impersonate() {
	let server = server_with(vec![configmap("team-a", "app")]).await;
	let pool = pool_with_builder(
		&[("east", &server)],
		Arc::new(ServerIdentityConfig::default()),
	);
	let client = ClustersClient::new(pool, anne(), AccessibleNamespaces::new());

	client
		.get("east", &configmap_kind(), Some("team-a"), "app")
		.await
		.unwrap();

	assert!(server.impersonated_users().await.is_empty());
}

fn tenant_namespace(name: &str, tenant: &str) -> Namespace {
	Namespace {
		metadata: ObjectMeta {
			name: Some(name.to_string()),
			labels: Some(BTreeMap::from([(TENANT_LABEL.to_string(), tenant.to_string())])),
			..Default::default()
		},
		..Default::default()
	}
}

#[tokio::test]
async fn test_get_object_resolves_tenant() {
	let server = server_with(vec![configmap("team-a", "app"), configmap("shared", "app")]).await;
	let namespaces = AccessibleNamespaces::new().with_cluster(
		"east",
		vec![
			tenant_namespace("team-a", "alpha"),
			multicluster::namespaces::namespace("shared"),
		],
	);
	let client = ClustersClient::new(pool(&[("east", &server)]), anne(), namespaces);
	let kinds = KindRegistry::builtin();

	let tenant_owned = client
		.get_object(&kinds, "east", "configmap", Some("team-a"), "app")
		.await
		.unwrap();
	assert_eq!(tenant_owned.cluster, "east");
	assert_eq!(tenant_owned.tenant.as_deref(), Some("alpha"));

	let shared = client
		.get_object(&kinds, "east", "ConfigMap", Some("shared"), "app")
		.await
		.unwrap();
	assert_eq!(shared.tenant, None);

	let unknown = client
		.get_object(&kinds, "east", "Kustomization", Some("team-a"), "app")
		.await;
	assert_matches!(unknown, Err(ClientError::UnknownKind(kind)) if kind == "Kustomization");
}

#[rstest]
#[case::aggregated(DiscoveryMode::Aggregated)]
#[case::legacy(DiscoveryMode::Legacy)]
#[tokio::test]
async fn test_discover_kinds(#[case] discovery_mode: DiscoveryMode) {
	let server = HttpMockK8sServer::builder()
		.discovery_mode(discovery_mode)
		.build()
		.start()
		.await;
	let pool = pool(&[("east", &server)]);
	let kube_client = pool.client_for(&anne(), "east").await.unwrap();

	let kinds = KindRegistry::discover(&kube_client)
		.await
		.expect("discovery should succeed");

	let cluster_role = kinds.lookup("clusterrole").expect("rbac group is served");
	assert_eq!(cluster_role.scope, ResourceScope::ClusterWide);
	assert_eq!(cluster_role.api_resource.plural, "clusterroles");
	let deployment = kinds.lookup("Deployment").unwrap();
	assert_eq!(deployment.scope, ResourceScope::Namespaced);
	assert_eq!(deployment.api_resource.api_version, "apps/v1");
	assert!(kinds.lookup("ConfigMap").is_some_and(ResourceKind::is_namespaced));
}
