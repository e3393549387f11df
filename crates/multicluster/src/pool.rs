//! Registered clusters and the per-principal clients built for them.

use std::{
	collections::{BTreeMap, HashMap},
	fmt,
	sync::{Arc, PoisonError, RwLock},
	time::Duration,
};

use kube::{
	config::{AuthInfo, KubeConfigOptions},
	Client, Config,
};
use thiserror::Error;
use tracing::instrument;

use crate::{
	cluster::{Cluster, InvalidClusterError},
	principal::Principal,
};

/// Default timeout for Kubernetes API requests.
const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when registering a cluster.
#[derive(Debug, Error)]
pub enum RegisterError {
	#[error("cluster `{0}` is already registered")]
	DuplicateCluster(String),

	#[error("invalid cluster `{name}`")]
	InvalidCluster {
		name: String,
		#[source]
		source: InvalidClusterError,
	},
}

/// Errors building the underlying transport for a cluster.
#[derive(Debug, Error)]
pub enum ConnectionError {
	#[error(transparent)]
	Kubeconfig(#[from] kube::config::KubeconfigError),

	#[error(transparent)]
	Kube(#[from] kube::Error),
}

/// Errors resolving a client from the pool.
#[derive(Debug, Error)]
pub enum PoolError {
	#[error("cluster `{0}` not found")]
	ClusterNotFound(String),

	#[error("connecting to cluster `{cluster}`")]
	Connection {
		cluster: String,
		#[source]
		source: ConnectionError,
	},
}

/// Produces the credentials used to reach a cluster on behalf of a principal.
pub trait ClientConfigBuilder: Send + Sync + fmt::Debug {
	fn auth_info(&self, principal: &Principal) -> AuthInfo;
}

/// Authenticate with fixed credentials and impersonate the principal.
///
/// The credentials must be allowed to impersonate users and groups on the
/// target cluster.
#[derive(Debug, Clone, Default)]
pub struct ImpersonatingConfig {
	credentials: AuthInfo,
}

impl ImpersonatingConfig {
	pub fn new(credentials: AuthInfo) -> Self {
		Self { credentials }
	}
}

impl ClientConfigBuilder for ImpersonatingConfig {
	fn auth_info(&self, principal: &Principal) -> AuthInfo {
		AuthInfo {
			impersonate: Some(principal.id.clone()),
			impersonate_groups: (!principal.groups.is_empty()).then(|| principal.groups.clone()),
			..self.credentials.clone()
		}
	}
}

/// Authenticate with fixed credentials, ignoring the principal.
#[derive(Debug, Clone, Default)]
pub struct ServerIdentityConfig {
	credentials: AuthInfo,
}

impl ServerIdentityConfig {
	pub fn new(credentials: AuthInfo) -> Self {
		Self { credentials }
	}
}

impl ClientConfigBuilder for ServerIdentityConfig {
	fn auth_info(&self, _principal: &Principal) -> AuthInfo {
		AuthInfo {
			impersonate: None,
			impersonate_groups: None,
			..self.credentials.clone()
		}
	}
}

/// Identifies one cached client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
	pub cluster: String,
	pub principal: String,
}

impl ClientKey {
	pub fn new(cluster: impl Into<String>, principal: impl Into<String>) -> Self {
		Self {
			cluster: cluster.into(),
			principal: principal.into(),
		}
	}
}

#[derive(Debug)]
struct Registration {
	cluster: Cluster,
	config_builder: Arc<dyn ClientConfigBuilder>,
}

impl Registration {
	async fn connect(
		&self,
		principal: &Principal,
		read_timeout: Duration,
	) -> Result<Client, ConnectionError> {
		let kubeconfig = self
			.cluster
			.kubeconfig(self.config_builder.auth_info(principal));
		let mut config = Config::from_custom_kubeconfig(
			kubeconfig,
			&KubeConfigOptions {
				context: Some(self.cluster.name.clone()),
				..Default::default()
			},
		)
		.await?;
		config.read_timeout = Some(read_timeout);
		Ok(Client::try_from(config)?)
	}
}

/// Registry of clusters plus a cache of clients keyed by (cluster, principal).
///
/// Clients are built on first use and reused afterwards. Construction happens
/// outside of any lock, so callers resolving different keys never wait on each
/// other. Two callers racing on the same key may both build a client; the
/// first one stored wins and the other is dropped.
pub struct ClientsPool {
	clusters: RwLock<BTreeMap<String, Arc<Registration>>>,
	clients: RwLock<HashMap<ClientKey, Client>>,
	read_timeout: Duration,
}

impl Default for ClientsPool {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for ClientsPool {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ClientsPool")
			.field("clusters", &self.cluster_names())
			.field("cached_clients", &self.cached_clients())
			.finish_non_exhaustive()
	}
}

impl ClientsPool {
	pub fn new() -> Self {
		Self {
			clusters: RwLock::default(),
			clients: RwLock::default(),
			read_timeout: DEFAULT_API_TIMEOUT,
		}
	}

	/// Override the per-request read timeout of clients built from now on.
	pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
		self.read_timeout = read_timeout;
		self
	}

	/// Register a cluster together with the builder for its credentials.
	#[instrument(skip_all, fields(cluster = %cluster.name))]
	pub fn add(
		&self,
		cluster: Cluster,
		config_builder: Arc<dyn ClientConfigBuilder>,
	) -> Result<(), RegisterError> {
		cluster
			.validate()
			.map_err(|source| RegisterError::InvalidCluster {
				name: cluster.name.clone(),
				source,
			})?;

		let mut clusters = self.clusters.write().unwrap_or_else(PoisonError::into_inner);
		if clusters.contains_key(&cluster.name) {
			return Err(RegisterError::DuplicateCluster(cluster.name));
		}

		tracing::debug!(server = %cluster.server, "registered cluster");
		clusters.insert(
			cluster.name.clone(),
			Arc::new(Registration {
				cluster,
				config_builder,
			}),
		);
		Ok(())
	}

	/// Unregister a cluster and drop every client cached for it.
	///
	/// Returns the removed descriptor, if the cluster was registered.
	#[instrument(skip(self))]
	pub fn remove(&self, cluster: &str) -> Option<Cluster> {
		let removed = self
			.clusters
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(cluster)?;

		self.clients
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.retain(|key, _| key.cluster != cluster);

		tracing::debug!("removed cluster");
		Some(removed.cluster.clone())
	}

	/// Drop every client cached for one principal, e.g. after its
	/// credentials or group memberships changed.
	pub fn evict_principal(&self, principal_id: &str) {
		self.clients
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.retain(|key, _| key.principal != principal_id);
	}

	/// Names of all registered clusters, sorted.
	pub fn cluster_names(&self) -> Vec<String> {
		self.clusters
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.keys()
			.cloned()
			.collect()
	}

	pub fn cluster(&self, name: &str) -> Option<Cluster> {
		self.registration(name).map(|r| r.cluster.clone())
	}

	pub fn is_empty(&self) -> bool {
		self.clusters
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.is_empty()
	}

	/// Number of clients currently cached.
	pub fn cached_clients(&self) -> usize {
		self.clients
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.len()
	}

	pub fn is_cached(&self, key: &ClientKey) -> bool {
		self.clients
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.contains_key(key)
	}

	/// Get the client for `cluster` acting as `principal`, building it on first use.
	#[instrument(skip(self, principal), fields(principal = %principal.id))]
	pub async fn client_for(&self, principal: &Principal, cluster: &str) -> Result<Client, PoolError> {
		let key = ClientKey::new(cluster, &principal.id);

		let cached = self
			.clients
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.get(&key)
			.cloned();
		if let Some(client) = cached {
			tracing::trace!("client cache hit");
			return Ok(client);
		}

		let registration = self
			.registration(cluster)
			.ok_or_else(|| PoolError::ClusterNotFound(cluster.to_string()))?;

		let client = registration
			.connect(principal, self.read_timeout)
			.await
			.map_err(|source| PoolError::Connection {
				cluster: cluster.to_string(),
				source,
			})?;

		let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);

		// The cluster may have been removed or replaced while connecting.
		let still_registered = self
			.registration(cluster)
			.is_some_and(|current| Arc::ptr_eq(&current, &registration));
		if !still_registered {
			return Err(PoolError::ClusterNotFound(cluster.to_string()));
		}

		tracing::debug!("built client");
		Ok(clients.entry(key).or_insert(client).clone())
	}

	fn registration(&self, name: &str) -> Option<Arc<Registration>> {
		self.clusters
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.get(name)
			.cloned()
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;

	fn pool_with(names: &[&str]) -> ClientsPool {
		let pool = ClientsPool::new();
		for name in names {
			pool.add(
				Cluster::new(*name, "https://127.0.0.1:6443").insecure(),
				Arc::new(ImpersonatingConfig::default()),
			)
			.expect("cluster should register");
		}
		pool
	}

	#[test]
	fn test_impersonating_config_sets_user_and_groups() {
		let builder = ImpersonatingConfig::new(AuthInfo {
			username: Some("gateway".to_string()),
			..Default::default()
		});

		let auth = builder.auth_info(&Principal::new("anne", ["devs", "ops"]));

		assert_eq!(auth.username.as_deref(), Some("gateway"));
		assert_eq!(auth.impersonate.as_deref(), Some("anne"));
		assert_eq!(
			auth.impersonate_groups,
			Some(vec!["devs".to_string(), "ops".to_string()])
		);
	}

	#[test]
	fn test_impersonating_config_omits_empty_groups() {
		let auth = ImpersonatingConfig::default().auth_info(&Principal::user("anne"));
		assert_eq!(auth.impersonate_groups, None);
	}

	#[test]
	fn test_server_identity_config_never_impersonates() {
		let builder = ServerIdentityConfig::new(AuthInfo {
			impersonate: Some("leftover".to_string()),
			..Default::default()
		});

		let auth = builder.auth_info(&Principal::new("anne", ["devs"]));

		assert_eq!(auth.impersonate, None);
		assert_eq!(auth.impersonate_groups, None);
	}

	#[test]
	fn test_duplicate_cluster_rejected() {
		let pool = pool_with(&["prod"]);
		let result = pool.add(
			Cluster::new("prod", "https://10.0.0.2:6443"),
			Arc::new(ImpersonatingConfig::default()),
		);
		assert_matches!(result, Err(RegisterError::DuplicateCluster(name)) if name == "prod");
	}

	#[test]
	fn test_invalid_cluster_rejected() {
		let pool = ClientsPool::new();
		let result = pool.add(
			Cluster::new("prod", "not a url"),
			Arc::new(ImpersonatingConfig::default()),
		);
		assert_matches!(result, Err(RegisterError::InvalidCluster { name, .. }) if name == "prod");
		assert!(pool.is_empty());
	}

	#[test]
	fn test_cluster_names_sorted() {
		let pool = pool_with(&["west", "east", "north"]);
		assert_eq!(pool.cluster_names(), ["east", "north", "west"]);
	}

	#[tokio::test]
	async fn test_unknown_cluster() {
		let pool = pool_with(&["prod"]);
		let result = pool.client_for(&Principal::user("anne"), "staging").await;
		assert_matches!(result, Err(PoolError::ClusterNotFound(name)) if name == "staging");
	}

	#[tokio::test]
	async fn test_clients_cached_per_principal() {
		let pool = pool_with(&["prod"]);
		let anne = Principal::user("anne");
		let bob = Principal::user("bob");

		pool.client_for(&anne, "prod").await.expect("client for anne");
		pool.client_for(&anne, "prod").await.expect("cached client for anne");
		assert_eq!(pool.cached_clients(), 1);

		pool.client_for(&bob, "prod").await.expect("client for bob");
		assert_eq!(pool.cached_clients(), 2);
		assert!(pool.is_cached(&ClientKey::new("prod", "anne")));
		assert!(pool.is_cached(&ClientKey::new("prod", "bob")));
	}

	#[tokio::test]
	async fn test_remove_invalidates_clients() {
		let pool = pool_with(&["prod", "staging"]);
		let anne = Principal::user("anne");
		pool.client_for(&anne, "prod").await.unwrap();
		pool.client_for(&anne, "staging").await.unwrap();

		let removed = pool.remove("prod").expect("prod was registered");

		assert_eq!(removed.name, "prod");
		assert!(!pool.is_cached(&ClientKey::new("prod", "anne")));
		assert!(pool.is_cached(&ClientKey::new("staging", "anne")));
		assert_matches!(
			pool.client_for(&anne, "prod").await,
			Err(PoolError::ClusterNotFound(_))
		);
		assert!(pool.remove("prod").is_none());
	}

	#[tokio::test]
	async fn test_evict_principal() {
		let pool = pool_with(&["prod", "staging"]);
		let anne = Principal::user("anne");
		let bob = Principal::user("bob");
		for cluster in ["prod", "staging"] {
			pool.client_for(&anne, cluster).await.unwrap();
			pool.client_for(&bob, cluster).await.unwrap();
		}

		pool.evict_principal("anne");

		assert_eq!(pool.cached_clients(), 2);
		assert!(!pool.is_cached(&ClientKey::new("prod", "anne")));
		assert!(pool.is_cached(&ClientKey::new("prod", "bob")));
	}

	#[tokio::test]
	async fn test_unbuildable_transport_is_a_connection_error() {
		let pool = ClientsPool::new();
		pool.add(
			Cluster::new("prod", "https://127.0.0.1:6443").insecure(),
			Arc::new(ImpersonatingConfig::new(AuthInfo {
				token_file: Some("/nonexistent/path/to/token".to_string()),
				..Default::default()
			})),
		)
		.unwrap();

		let result = pool.client_for(&Principal::user("anne"), "prod").await;

		assert_matches!(result, Err(PoolError::Connection { cluster, .. }) if cluster == "prod");
		assert_eq!(pool.cached_clients(), 0);
	}
}
