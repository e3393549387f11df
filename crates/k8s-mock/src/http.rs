//! HTTP-based mock Kubernetes server using wiremock.
//!
//! Serves discovery plus a small in-memory object store over a real socket,
//! so clients built from a server URL talk to it exactly as they would to an
//! API server.

use std::{collections::HashMap, sync::Arc, time::Duration};

use bon::Builder;
use serde_json::{json, Value};
use tracing::{debug, trace};
use wiremock::{
	matchers::{header_regex, method, path, path_regex},
	Mock, MockServer, Request, ResponseTemplate,
};

use crate::{
	discovery::{DiscoveryMode, MockDiscovery},
	helpers::{merge_json, status_deleted, status_failure, strip_strategic_merge_directives},
	selectors::{FieldSelector, LabelSelector},
	store::{ObjectKey, ResourcePath, SharedStore},
};

// The Content-Type must name the aggregated format for clients to parse it.
const AGGREGATED_DISCOVERY_CONTENT_TYPE: &str =
	"application/json;g=apidiscovery.k8s.io;v=v2;as=APIGroupDiscoveryList";

const RESOURCE_PATHS: &str = r"^/apis?/.+";

/// A mock Kubernetes server exposed over HTTP.
#[derive(Builder)]
pub struct HttpMockK8sServer {
	#[builder(default)]
	discovery_mode: DiscoveryMode,
	/// Resources to serve as raw manifests. The server derives API paths from
	/// apiVersion/kind using the discovery data.
	#[builder(default)]
	resources: Vec<Value>,
	/// Namespaces whose requests are rejected with 403 Forbidden.
	#[builder(default)]
	forbidden_namespaces: Vec<String>,
	/// Delay applied to every list response.
	list_delay: Option<Duration>,
}

/// A running HTTP mock server instance.
pub struct RunningHttpMockK8sServer {
	server: MockServer,
	store: SharedStore,
}

/// A request the mock server received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
	pub method: String,
	pub path: String,
	pub query: Option<String>,
	pub impersonate_user: Option<String>,
	pub impersonate_groups: Vec<String>,
}

impl From<&Request> for RecordedRequest {
	fn from(req: &Request) -> Self {
		Self {
			method: req.method.to_string(),
			path: req.url.path().to_string(),
			query: req.url.query().map(str::to_string),
			impersonate_user: req
				.headers
				.get("impersonate-user")
				.and_then(|v| v.to_str().ok())
				.map(str::to_string),
			impersonate_groups: req
				.headers
				.get_all("impersonate-group")
				.iter()
				.filter_map(|v| v.to_str().ok())
				.map(str::to_string)
				.collect(),
		}
	}
}

impl HttpMockK8sServer {
	/// Start the mock server with all configured resources.
	pub async fn start(self) -> RunningHttpMockK8sServer {
		let server = MockServer::start().await;
		let discovery = MockDiscovery::default();

		debug!(uri = %server.uri(), "Started mock K8s server");

		let store = SharedStore::default();
		{
			let mut objects = store.write();
			for mut manifest in self.resources {
				let Some(key) = object_key(&manifest, &discovery) else {
					debug!("Skipping manifest of unknown kind");
					continue;
				};
				if let Some(namespace) = &key.namespace {
					manifest["metadata"]["namespace"] = namespace.clone().into();
				}
				trace!(?key, "Registered resource");
				objects.insert(key, manifest);
			}

			let default_ns = ObjectKey {
				prefix: "/api/v1".to_string(),
				plural: "namespaces".to_string(),
				namespace: None,
				name: "default".to_string(),
			};
			if objects.get(&default_ns).is_none() {
				objects.insert(
					default_ns,
					json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "default"}}),
				);
			}
		}

		mount_version(&server).await;
		mount_discovery(&server, &discovery, self.discovery_mode).await;

		let handler = Arc::new(Handler {
			store: store.clone(),
			forbidden_namespaces: self.forbidden_namespaces,
			list_delay: self.list_delay,
		});
		Mock::given(path_regex(RESOURCE_PATHS))
			.respond_with(move |req: &Request| handler.respond(req))
			.mount(&server)
			.await;

		RunningHttpMockK8sServer { server, store }
	}
}

/// Derive the store key of a manifest using discovery data.
fn object_key(manifest: &Value, discovery: &MockDiscovery) -> Option<ObjectKey> {
	let api_version = manifest.get("apiVersion")?.as_str()?;
	let kind = manifest.get("kind")?.as_str()?;
	let name = manifest.pointer("/metadata/name")?.as_str()?;
	let resource = discovery.resource(api_version, kind)?;

	let prefix = if api_version.contains('/') {
		format!("/apis/{api_version}")
	} else {
		format!("/api/{api_version}")
	};
	let namespace = resource.namespaced.then(|| {
		manifest
			.pointer("/metadata/namespace")
			.and_then(Value::as_str)
			.unwrap_or("default")
			.to_string()
	});

	Some(ObjectKey {
		prefix,
		plural: resource.name.clone(),
		namespace,
		name: name.to_string(),
	})
}

impl RunningHttpMockK8sServer {
	/// Get the server's URI (e.g., "http://127.0.0.1:12345").
	pub fn uri(&self) -> String {
		self.server.uri()
	}

	/// Stored object at an API path such as
	/// `/api/v1/namespaces/default/configmaps/app`.
	pub fn object(&self, api_path: &str) -> Option<Value> {
		let path = ResourcePath::parse(api_path)?;
		let name = path.name.as_deref()?;
		self.store.read().get(&path.key(name)).cloned()
	}

	/// Every request received so far, in arrival order.
	pub async fn received_requests(&self) -> Vec<RecordedRequest> {
		self.server
			.received_requests()
			.await
			.unwrap_or_default()
			.iter()
			.map(RecordedRequest::from)
			.collect()
	}

	/// Received requests against resource paths, without discovery traffic.
	pub async fn resource_requests(&self) -> Vec<RecordedRequest> {
		self.received_requests()
			.await
			.into_iter()
			.filter(|r| ResourcePath::parse(&r.path).is_some())
			.collect()
	}

	/// Distinct users resource requests impersonated, sorted.
	pub async fn impersonated_users(&self) -> Vec<String> {
		let mut users: Vec<_> = self
			.resource_requests()
			.await
			.into_iter()
			.filter_map(|r| r.impersonate_user)
			.collect();
		users.sort();
		users.dedup();
		users
	}
}

/// Query parameters of one request.
struct Query(HashMap<String, String>);

impl Query {
	fn of(req: &Request) -> Self {
		Self(req.url.query_pairs().into_owned().collect())
	}

	fn get(&self, key: &str) -> Option<&str> {
		self.0.get(key).map(String::as_str)
	}

	fn dry_run(&self) -> bool {
		self.0.contains_key("dryRun")
	}
}

/// Serves the object store.
struct Handler {
	store: SharedStore,
	forbidden_namespaces: Vec<String>,
	list_delay: Option<Duration>,
}

impl Handler {
	fn respond(&self, req: &Request) -> ResponseTemplate {
		let Some(path) = ResourcePath::parse(req.url.path()) else {
			return status_failure(
				404,
				"NotFound",
				"the server could not find the requested resource",
			);
		};
		if let Some(namespace) = path
			.namespace
			.as_deref()
			.filter(|ns| self.forbidden_namespaces.iter().any(|f| f == ns))
		{
			return status_failure(
				403,
				"Forbidden",
				format!(
					"{} is forbidden: cannot access resources in namespace \"{namespace}\"",
					path.plural
				),
			);
		}

		let query = Query::of(req);
		match (req.method.as_str(), path.name.as_deref()) {
			("GET", Some(name)) => self.get(&path, name),
			("GET", None) => self.list(&path, &query),
			("POST", None) => self.create(&path, &query, &req.body),
			("PUT", Some(name)) => self.replace(&path, name, &query, &req.body),
			("PATCH", Some(name)) => {
				let apply = req
					.headers
					.get("content-type")
					.and_then(|v| v.to_str().ok())
					.is_some_and(|ct| ct.starts_with("application/apply-patch"));
				self.patch(&path, name, &query, &req.body, apply)
			}
			("DELETE", Some(name)) => self.delete(&path, name, &query),
			(method, _) => status_failure(
				405,
				"MethodNotAllowed",
				format!("{method} is not supported on {}", req.url.path()),
			),
		}
	}

	fn get(&self, path: &ResourcePath, name: &str) -> ResponseTemplate {
		match self.store.read().get(&path.key(name)) {
			Some(object) => ResponseTemplate::new(200).set_body_json(object),
			None => not_found(path, name),
		}
	}

	fn list(&self, path: &ResourcePath, query: &Query) -> ResponseTemplate {
		let labels = match query.get("labelSelector").map(LabelSelector::parse).transpose() {
			Ok(selector) => selector.unwrap_or_default(),
			Err(e) => return status_failure(400, "BadRequest", format!("unable to parse requirement: {e}")),
		};
		let fields = match query.get("fieldSelector").map(FieldSelector::parse).transpose() {
			Ok(selector) => selector.unwrap_or_default(),
			Err(e) => return status_failure(400, "BadRequest", e.to_string()),
		};
		let offset = match query
			.get("continue")
			.filter(|token| !token.is_empty())
			.map(str::parse::<usize>)
			.transpose()
		{
			Ok(offset) => offset.unwrap_or(0),
			Err(_) => return status_failure(400, "BadRequest", "invalid continue token"),
		};
		let limit = query
			.get("limit")
			.and_then(|l| l.parse::<usize>().ok())
			.filter(|l| *l > 0);

		let store = self.store.read();
		let matching: Vec<&Value> = store
			.list(path)
			.filter(|o| labels.matches_object(o) && fields.matches_object(o))
			.collect();
		let end = limit.map_or(matching.len(), |limit| {
			offset.saturating_add(limit).min(matching.len())
		});
		let items = matching.get(offset..end).unwrap_or_default();

		let mut metadata = json!({"resourceVersion": store.resource_version()});
		if end < matching.len() {
			metadata["continue"] = end.to_string().into();
			metadata["remainingItemCount"] = (matching.len() - end).into();
		}
		trace!(path = ?path, offset, returned = items.len(), total = matching.len(), "Served list");

		let response = ResponseTemplate::new(200).set_body_json(json!({
			"kind": "List",
			"apiVersion": "v1",
			"metadata": metadata,
			"items": items,
		}));
		match self.list_delay {
			Some(delay) => response.set_delay(delay),
			None => response,
		}
	}

	fn create(&self, path: &ResourcePath, query: &Query, body: &[u8]) -> ResponseTemplate {
		let mut object: Value = match serde_json::from_slice(body) {
			Ok(object) => object,
			Err(e) => return status_failure(400, "BadRequest", e.to_string()),
		};
		let Some(name) = object
			.pointer("/metadata/name")
			.and_then(Value::as_str)
			.map(str::to_string)
		else {
			return status_failure(422, "Invalid", "metadata.name: Required value");
		};
		if let Some(namespace) = &path.namespace {
			object["metadata"]["namespace"] = namespace.clone().into();
		}

		let key = path.key(&name);
		let mut store = self.store.write();
		if store.get(&key).is_some() {
			return status_failure(
				409,
				"AlreadyExists",
				format!("{} \"{name}\" already exists", path.plural),
			);
		}
		let created = if query.dry_run() {
			object
		} else {
			store.insert(key, object)
		};
		ResponseTemplate::new(201).set_body_json(created)
	}

	fn replace(&self, path: &ResourcePath, name: &str, query: &Query, body: &[u8]) -> ResponseTemplate {
		let mut object: Value = match serde_json::from_slice(body) {
			Ok(object) => object,
			Err(e) => return status_failure(400, "BadRequest", e.to_string()),
		};

		let key = path.key(name);
		let mut store = self.store.write();
		let Some(existing) = store.get(&key) else {
			return not_found(path, name);
		};
		let resource_version = |o: &Value| {
			o.pointer("/metadata/resourceVersion")
				.and_then(Value::as_str)
				.map(str::to_string)
		};
		let expected = resource_version(&object);
		if expected.is_some() && expected != resource_version(existing) {
			return status_failure(
				409,
				"Conflict",
				"the object has been modified; please apply your changes to the latest version and try again",
			);
		}
		if let Some(namespace) = &path.namespace {
			object["metadata"]["namespace"] = namespace.clone().into();
		}

		let replaced = if query.dry_run() {
			object
		} else {
			store.insert(key, object)
		};
		ResponseTemplate::new(200).set_body_json(replaced)
	}

	fn patch(
		&self,
		path: &ResourcePath,
		name: &str,
		query: &Query,
		body: &[u8],
		apply: bool,
	) -> ResponseTemplate {
		let patch: Value = match serde_json::from_slice(body) {
			Ok(patch) => patch,
			Err(e) => return status_failure(400, "BadRequest", e.to_string()),
		};

		let key = path.key(name);
		let mut store = self.store.write();
		let merged = match store.get(&key) {
			Some(existing) => merge_json(existing.clone(), patch),
			// Server-side apply creates missing objects.
			None if apply => patch,
			None => return not_found(path, name),
		};

		let result = strip_strategic_merge_directives(merged);
		let result = if query.dry_run() {
			result
		} else {
			store.insert(key, result)
		};
		ResponseTemplate::new(200).set_body_json(result)
	}

	fn delete(&self, path: &ResourcePath, name: &str, query: &Query) -> ResponseTemplate {
		let key = path.key(name);
		let mut store = self.store.write();
		if store.get(&key).is_none() {
			return not_found(path, name);
		}
		if !query.dry_run() {
			store.remove(&key);
		}
		status_deleted(name, &path.plural)
	}
}

fn not_found(path: &ResourcePath, name: &str) -> ResponseTemplate {
	status_failure(404, "NotFound", format!("{} \"{name}\" not found", path.plural))
}

async fn mount_version(server: &MockServer) {
	Mock::given(method("GET"))
		.and(path("/version"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"major": "1",
			"minor": "31",
			"gitVersion": "v1.31.0",
			"gitCommit": "fake",
			"gitTreeState": "clean",
			"buildDate": "2024-08-13T00:00:00Z",
			"goVersion": "go1.22.5",
			"compiler": "gc",
			"platform": "linux/amd64"
		})))
		.mount(server)
		.await;
}

async fn mount_discovery(server: &MockServer, discovery: &MockDiscovery, mode: DiscoveryMode) {
	// Aggregated endpoints are mounted first so they win for requests
	// accepting the aggregated format.
	match mode {
		DiscoveryMode::Aggregated => {
			for (route, body) in [
				("/api", discovery.aggregated_core()),
				("/apis", discovery.aggregated_groups()),
			] {
				// set_body_json would overwrite the Content-Type.
				let body =
					serde_json::to_vec(&body).expect("serializing discovery JSON should never fail");
				Mock::given(method("GET"))
					.and(path(route))
					.and(header_regex("accept", "apidiscovery"))
					.respond_with(
						ResponseTemplate::new(200).set_body_raw(body, AGGREGATED_DISCOVERY_CONTENT_TYPE),
					)
					.mount(server)
					.await;
			}
		}
		DiscoveryMode::Legacy => {
			for route in ["/api", "/apis"] {
				Mock::given(method("GET"))
					.and(path(route))
					.and(header_regex("accept", "apidiscovery"))
					.respond_with(ResponseTemplate::new(406))
					.mount(server)
					.await;
			}
		}
	}

	Mock::given(method("GET"))
		.and(path("/api"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"kind": "APIVersions",
			"versions": ["v1"],
			"serverAddressByClientCIDRs": []
		})))
		.mount(server)
		.await;

	Mock::given(method("GET"))
		.and(path("/apis"))
		.respond_with(ResponseTemplate::new(200).set_body_json(discovery.group_list()))
		.mount(server)
		.await;

	for (route, body) in discovery.resource_lists() {
		Mock::given(method("GET"))
			.and(path(route))
			.respond_with(ResponseTemplate::new(200).set_body_json(body))
			.mount(server)
			.await;
	}
}
