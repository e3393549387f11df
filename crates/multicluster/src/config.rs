//! YAML configuration describing a fleet of clusters.
//!
//! ```yaml
//! clusters:
//!   - name: east
//!     server: https://east.example.com:6443
//!     certificateAuthorityData: LS0tLS1CRUdJTi...
//! credentials:
//!   token: gateway-service-account-token
//! principal:
//!   id: anne
//!   groups: [devs]
//! namespaces:
//!   east: [team-a, team-b]
//! ```

use std::{
	collections::BTreeMap,
	fs,
	path::{Path, PathBuf},
	sync::Arc,
	time::Duration,
};

use kube::config::AuthInfo;
use serde::Deserialize;
use thiserror::Error;

use crate::{
	aggregator::DEFAULT_MAX_CONCURRENT_REQUESTS,
	client::ClustersClient,
	cluster::Cluster,
	namespaces::AccessibleNamespaces,
	pool::{ClientConfigBuilder, ClientsPool, ImpersonatingConfig, RegisterError, ServerIdentityConfig},
	principal::Principal,
};

/// Environment variable naming the config file when no path is given.
pub const CONFIG_ENV_VAR: &str = "MCQ_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("no config file given and ${CONFIG_ENV_VAR} is not set")]
	NotConfigured,

	#[error("failed to read config file: {}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse config file: {}", path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_yaml::Error,
	},

	#[error(transparent)]
	Register(#[from] RegisterError),
}

/// Identity clusters see requests as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityMode {
	/// Impersonate the configured principal.
	#[default]
	Impersonate,
	/// Use the configured credentials as they are.
	Server,
}

fn default_max_concurrent_requests() -> usize {
	DEFAULT_MAX_CONCURRENT_REQUESTS
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetConfig {
	pub clusters: Vec<Cluster>,

	/// Kubeconfig-style user entry used to authenticate to every cluster.
	#[serde(default)]
	pub credentials: AuthInfo,

	#[serde(default)]
	pub identity: IdentityMode,

	pub principal: Principal,

	/// Accessible namespaces per cluster, in visiting order.
	#[serde(default)]
	pub namespaces: BTreeMap<String, Vec<String>>,

	#[serde(default = "default_max_concurrent_requests")]
	pub max_concurrent_requests: usize,

	/// Per-request read timeout in seconds.
	#[serde(default)]
	pub request_timeout_seconds: Option<u64>,
}

impl FleetConfig {
	/// Load from `path`, or from the file named by [`CONFIG_ENV_VAR`].
	pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
		match path {
			Some(path) => Self::load_from_file(path),
			None => {
				let path = std::env::var_os(CONFIG_ENV_VAR).ok_or(ConfigError::NotConfigured)?;
				Self::load_from_file(Path::new(&path))
			}
		}
	}

	pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
		let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})
	}

	fn config_builder(&self) -> Arc<dyn ClientConfigBuilder> {
		match self.identity {
			IdentityMode::Impersonate => Arc::new(ImpersonatingConfig::new(self.credentials.clone())),
			IdentityMode::Server => Arc::new(ServerIdentityConfig::new(self.credentials.clone())),
		}
	}

	/// Register every configured cluster in a new pool.
	pub fn build_pool(&self) -> Result<ClientsPool, RegisterError> {
		let mut pool = ClientsPool::new();
		if let Some(seconds) = self.request_timeout_seconds {
			pool = pool.with_read_timeout(Duration::from_secs(seconds));
		}

		let builder = self.config_builder();
		for cluster in &self.clusters {
			pool.add(cluster.clone(), Arc::clone(&builder))?;
		}
		Ok(pool)
	}

	pub fn accessible_namespaces(&self) -> AccessibleNamespaces {
		AccessibleNamespaces::from_names(
			self.namespaces
				.iter()
				.map(|(cluster, names)| (cluster.clone(), names.clone())),
		)
	}

	/// Build a client for the configured principal.
	pub fn client(&self) -> Result<ClustersClient, ConfigError> {
		let pool = Arc::new(self.build_pool()?);
		Ok(
			ClustersClient::new(pool, self.principal.clone(), self.accessible_namespaces())
				.with_max_concurrent_requests(self.max_concurrent_requests),
		)
	}
}
