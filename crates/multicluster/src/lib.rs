//! Identity-scoped query layer over a fleet of Kubernetes clusters.
//!
//! A [`ClustersClient`] acts as one principal against every cluster
//! registered in a [`ClientsPool`]. Single-object operations pass through to
//! one cluster; [`ClustersClient::clustered_list`] fans a list out over every
//! cluster and every namespace the principal may access, paginating each
//! scope independently behind a single opaque continue token.

mod aggregator;
pub mod client;
pub mod cluster;
pub mod clustered_list;
pub mod config;
pub mod continuation;
pub mod error;
pub mod kinds;
pub mod namespaces;
pub mod pool;
pub mod principal;
pub mod scope;

pub use aggregator::DEFAULT_MAX_CONCURRENT_REQUESTS;
pub use client::{ClustersClient, TenantObject};
pub use cluster::{Cluster, InvalidClusterError, TlsConfig};
pub use clustered_list::{ClusteredList, ClusteredListRequest, ScopedList};
pub use config::{ConfigError, FleetConfig, IdentityMode};
pub use continuation::{Continuation, ContinueTokenError, ResumptionState};
pub use error::{ClientError, ClusteredListError, ScopeError, ScopeFailure};
pub use kinds::{KindRegistry, ResourceKind};
pub use namespaces::{AccessibleNamespaces, TENANT_LABEL};
pub use pool::{
	ClientConfigBuilder, ClientsPool, ConnectionError, ImpersonatingConfig, PoolError,
	RegisterError, ServerIdentityConfig,
};
pub use principal::Principal;
pub use scope::{ResourceScope, Scope};
pub use tokio_util::sync::CancellationToken;
