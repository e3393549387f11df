//! Per-cluster snapshot of the namespaces a principal may query.
//!
//! The snapshot is produced by an external authorization component and is
//! only read here. Its order is the order namespaces are visited in, which
//! keeps pagination reproducible within one walk.

use std::collections::HashMap;

use k8s_openapi::{api::core::v1::Namespace, apimachinery::pkg::apis::meta::v1::ObjectMeta};

/// Namespace label that names the tenant owning the namespace.
pub const TENANT_LABEL: &str = "toolkit.fluxcd.io/tenant";

/// Mapping from cluster name to the ordered namespaces visible in it.
#[derive(Debug, Clone, Default)]
pub struct AccessibleNamespaces {
	by_cluster: HashMap<String, Vec<Namespace>>,
}

impl AccessibleNamespaces {
	pub fn new() -> Self {
		Self::default()
	}

	/// Build a snapshot from plain namespace names.
	pub fn from_names<C, N, S>(clusters: C) -> Self
	where
		C: IntoIterator<Item = (S, N)>,
		N: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut snapshot = Self::new();
		for (cluster, names) in clusters {
			snapshot.insert(cluster, names.into_iter().map(namespace).collect());
		}
		snapshot
	}

	/// Replace the namespaces visible in `cluster`.
	pub fn insert(&mut self, cluster: impl Into<String>, namespaces: Vec<Namespace>) {
		self.by_cluster.insert(cluster.into(), namespaces);
	}

	/// Builder-style [`insert`](Self::insert).
	pub fn with_cluster(mut self, cluster: impl Into<String>, namespaces: Vec<Namespace>) -> Self {
		self.insert(cluster, namespaces);
		self
	}

	/// Namespace names of `cluster`, in visiting order.
	pub fn names<'a>(&'a self, cluster: &str) -> impl Iterator<Item = &'a str> + 'a {
		self.by_cluster
			.get(cluster)
			.into_iter()
			.flatten()
			.filter_map(|ns| ns.metadata.name.as_deref())
	}

	pub fn contains(&self, cluster: &str, namespace: &str) -> bool {
		self.names(cluster).any(|name| name == namespace)
	}

	/// The tenant owning `namespace` in `cluster`, if the namespace is
	/// accessible and labelled with [`TENANT_LABEL`].
	pub fn tenant(&self, cluster: &str, namespace: &str) -> Option<&str> {
		self.by_cluster
			.get(cluster)?
			.iter()
			.find(|ns| ns.metadata.name.as_deref() == Some(namespace))?
			.metadata
			.labels
			.as_ref()?
			.get(TENANT_LABEL)
			.map(String::as_str)
	}
}

/// A bare namespace object carrying only its name.
pub fn namespace(name: impl Into<String>) -> Namespace {
	Namespace {
		metadata: ObjectMeta {
			name: Some(name.into()),
			..Default::default()
		},
		..Default::default()
	}
}
