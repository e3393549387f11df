//! In-memory object store backing the mock server.

use std::{
	collections::BTreeMap,
	sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// Identifies one stored object.
///
/// Field order gives list responses their order: namespace first, then name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
	/// `/api/v1` or `/apis/<group>/<version>`.
	pub prefix: String,
	pub plural: String,
	pub namespace: Option<String>,
	pub name: String,
}

/// A resource request path split into its parts.
///
/// Examples:
/// - `/api/v1/namespaces/default/configmaps` is the `configmaps` collection of `default`
/// - `/api/v1/configmaps` is the `configmaps` collection across all namespaces
/// - `/apis/apps/v1/namespaces/default/deployments/web` is one deployment
/// - `/api/v1/namespaces/default` is the namespace object itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath {
	pub prefix: String,
	pub plural: String,
	pub namespace: Option<String>,
	pub name: Option<String>,
}

impl ResourcePath {
	/// Parse a request path. Returns `None` for discovery and subresource paths.
	pub fn parse(path: &str) -> Option<Self> {
		let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
		let prefix_len = match segments.first() {
			Some(&"api") => 2,
			Some(&"apis") => 3,
			_ => return None,
		};
		if segments.len() <= prefix_len {
			return None;
		}

		let prefix = format!("/{}", segments[..prefix_len].join("/"));
		let (namespace, rest) = match &segments[prefix_len..] {
			["namespaces", namespace, rest @ ..] if !rest.is_empty() => {
				(Some((*namespace).to_string()), rest)
			}
			rest => (None, rest),
		};
		let (plural, name) = match rest {
			[plural] => (*plural, None),
			[plural, name] => (*plural, Some((*name).to_string())),
			_ => return None,
		};

		Some(Self {
			prefix,
			plural: plural.to_string(),
			namespace,
			name,
		})
	}

	pub fn key(&self, name: &str) -> ObjectKey {
		ObjectKey {
			prefix: self.prefix.clone(),
			plural: self.plural.clone(),
			namespace: self.namespace.clone(),
			name: name.to_string(),
		}
	}

	/// Whether `key` belongs to the collection this path addresses.
	///
	/// A path without a namespace addresses every namespace.
	fn contains(&self, key: &ObjectKey) -> bool {
		key.prefix == self.prefix
			&& key.plural == self.plural
			&& (self.namespace.is_none() || key.namespace == self.namespace)
	}
}

/// Stored objects plus the server-wide resource version counter.
#[derive(Debug, Default)]
pub struct Store {
	objects: BTreeMap<ObjectKey, serde_json::Value>,
	resource_version: u64,
}

impl Store {
	/// Store `object` under `key`, stamping a fresh `metadata.resourceVersion`.
	pub fn insert(&mut self, key: ObjectKey, mut object: serde_json::Value) -> serde_json::Value {
		self.resource_version += 1;
		if let Some(metadata) = object
			.as_object_mut()
			.map(|o| o.entry("metadata").or_insert_with(|| serde_json::json!({})))
			.and_then(serde_json::Value::as_object_mut)
		{
			metadata.insert(
				"resourceVersion".to_string(),
				self.resource_version.to_string().into(),
			);
		}
		self.objects.insert(key, object.clone());
		object
	}

	pub fn get(&self, key: &ObjectKey) -> Option<&serde_json::Value> {
		self.objects.get(key)
	}

	pub fn remove(&mut self, key: &ObjectKey) -> Option<serde_json::Value> {
		let removed = self.objects.remove(key)?;
		self.resource_version += 1;
		Some(removed)
	}

	/// Objects of the collection `path` addresses, ordered by namespace and name.
	pub fn list<'a>(&'a self, path: &'a ResourcePath) -> impl Iterator<Item = &'a serde_json::Value> {
		self.objects
			.iter()
			.filter(move |(key, _)| path.contains(key))
			.map(|(_, object)| object)
	}

	pub fn resource_version(&self) -> String {
		self.resource_version.to_string()
	}

	pub fn len(&self) -> usize {
		self.objects.len()
	}

	pub fn is_empty(&self) -> bool {
		self.objects.is_empty()
	}
}

/// Store shared between the mounted handlers and the test.
#[derive(Debug, Clone, Default)]
pub struct SharedStore(Arc<RwLock<Store>>);

impl SharedStore {
	pub fn read(&self) -> RwLockReadGuard<'_, Store> {
		self.0.read().unwrap_or_else(PoisonError::into_inner)
	}

	pub fn write(&self) -> RwLockWriteGuard<'_, Store> {
		self.0.write().unwrap_or_else(PoisonError::into_inner)
	}
}
