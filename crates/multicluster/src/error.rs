//! Error types for the federated client.

use std::{fmt, sync::Arc};

use thiserror::Error;

use crate::{
	clustered_list::ClusteredList,
	continuation::ContinueTokenError,
	pool::{ConnectionError, PoolError},
	scope::Scope,
};

/// Errors returned by [`ClustersClient`](crate::client::ClustersClient).
#[derive(Debug, Error)]
pub enum ClientError {
	#[error("cluster `{0}` not found")]
	ClusterNotFound(String),

	#[error("connecting to cluster `{cluster}`")]
	Connection {
		cluster: String,
		#[source]
		source: ConnectionError,
	},

	/// The single-cluster API call failed; the upstream error is kept as is.
	#[error(transparent)]
	Kube(#[from] kube::Error),

	#[error("object has no metadata.name")]
	MissingName,

	#[error("unknown resource kind `{0}`")]
	UnknownKind(String),

	#[error("invalid continue token")]
	InvalidContinueToken(#[from] ContinueTokenError),

	#[error("no clusters registered")]
	NoClusters,

	#[error("none of the clusters could be reached")]
	NoReachableClusters(#[source] ClusteredListError),

	/// The clustered list was cancelled or timed out. `partial` holds what was
	/// collected before that; it is incomplete and carries no continue token.
	#[error("clustered list cancelled")]
	Cancelled { partial: Box<ClusteredList> },

	#[error("clustered list task panicked")]
	TaskPanicked(#[source] tokio::task::JoinError),
}

impl From<PoolError> for ClientError {
	fn from(err: PoolError) -> Self {
		match err {
			PoolError::ClusterNotFound(name) => Self::ClusterNotFound(name),
			PoolError::Connection { cluster, source } => Self::Connection { cluster, source },
		}
	}
}

/// Why one scope of a clustered list failed.
#[derive(Debug, Error)]
pub enum ScopeFailure {
	/// No client could be obtained for the scope's cluster. Shared by every
	/// scope of that cluster in the round.
	#[error(transparent)]
	Cluster(Arc<PoolError>),

	/// The list call itself failed.
	#[error(transparent)]
	Query(kube::Error),
}

/// One failed scope of a clustered list.
#[derive(Debug, Error)]
#[error("listing {scope}")]
pub struct ScopeError {
	pub scope: Scope,
	#[source]
	pub failure: ScopeFailure,
}

impl ScopeError {
	pub fn new(scope: Scope, failure: ScopeFailure) -> Self {
		Self { scope, failure }
	}

	/// Whether the upstream API answered with the given HTTP status.
	pub fn is_status(&self, code: u16) -> bool {
		matches!(&self.failure, ScopeFailure::Query(kube::Error::Api(response)) if response.code == code)
	}
}

/// Every scope that failed during one clustered-list round.
///
/// Failures never abort the round; the scopes that succeeded are still
/// returned next to this collection.
#[derive(Debug, Default, Error)]
pub struct ClusteredListError {
	errors: Vec<ScopeError>,
}

impl ClusteredListError {
	pub fn push(&mut self, error: ScopeError) {
		self.errors.push(error);
	}

	pub fn is_empty(&self) -> bool {
		self.errors.is_empty()
	}

	pub fn len(&self) -> usize {
		self.errors.len()
	}

	pub fn iter(&self) -> std::slice::Iter<'_, ScopeError> {
		self.errors.iter()
	}

	pub fn get(&self, scope: &Scope) -> Option<&ScopeError> {
		self.errors.iter().find(|e| &e.scope == scope)
	}

	pub fn into_inner(self) -> Vec<ScopeError> {
		self.errors
	}
}

impl fmt::Display for ClusteredListError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} scope(s) failed", self.errors.len())?;
		for (i, error) in self.errors.iter().enumerate() {
			let sep = if i == 0 { ": " } else { "; " };
			write!(f, "{sep}{}: {}", error.scope, error.failure)?;
		}
		Ok(())
	}
}

impl<'a> IntoIterator for &'a ClusteredListError {
	type Item = &'a ScopeError;
	type IntoIter = std::slice::Iter<'a, ScopeError>;

	fn into_iter(self) -> Self::IntoIter {
		self.errors.iter()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_display_lists_every_scope() {
		let mut errors = ClusteredListError::default();
		errors.push(ScopeError::new(
			Scope::namespaced("east", "a"),
			ScopeFailure::Cluster(Arc::new(PoolError::ClusterNotFound("east".to_string()))),
		));
		errors.push(ScopeError::new(
			Scope::cluster_wide("west"),
			ScopeFailure::Cluster(Arc::new(PoolError::ClusterNotFound("west".to_string()))),
		));

		assert_eq!(
			errors.to_string(),
			"2 scope(s) failed: cluster `east` namespace `a`: cluster `east` not found; \
			 cluster `west`: cluster `west` not found"
		);
	}

	#[test]
	fn test_lookup_by_scope() {
		let mut errors = ClusteredListError::default();
		errors.push(ScopeError::new(
			Scope::namespaced("east", "a"),
			ScopeFailure::Cluster(Arc::new(PoolError::ClusterNotFound("east".to_string()))),
		));

		assert!(errors.get(&Scope::namespaced("east", "a")).is_some());
		assert!(errors.get(&Scope::namespaced("east", "b")).is_none());
		assert!(!errors.get(&Scope::namespaced("east", "a")).unwrap().is_status(403));
	}
}
