//! Federated client: one logical client over every registered cluster.

use std::sync::Arc;

use kube::{
	api::{DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams},
	core::ObjectList,
	Api,
};
use tracing::instrument;

use crate::{
	aggregator::{Aggregator, DEFAULT_MAX_CONCURRENT_REQUESTS},
	clustered_list::{ClusteredList, ClusteredListRequest},
	error::ClientError,
	kinds::{KindRegistry, ResourceKind},
	namespaces::AccessibleNamespaces,
	pool::ClientsPool,
	principal::Principal,
};

/// An object fetched through [`ClustersClient::get_object`].
#[derive(Debug, Clone)]
pub struct TenantObject {
	pub cluster: String,
	pub object: DynamicObject,
	/// Tenant owning the object's namespace, if known.
	pub tenant: Option<String>,
}

/// Client acting as one principal across every cluster of a pool.
///
/// Single-cluster operations resolve the cluster's client from the pool and
/// pass the call through unchanged. [`clustered_list`](Self::clustered_list)
/// fans a list out over every cluster and every accessible namespace.
#[derive(Debug, Clone)]
pub struct ClustersClient {
	pool: Arc<ClientsPool>,
	principal: Principal,
	namespaces: Arc<AccessibleNamespaces>,
	max_concurrent_requests: usize,
}

impl ClustersClient {
	pub fn new(
		pool: Arc<ClientsPool>,
		principal: Principal,
		namespaces: impl Into<Arc<AccessibleNamespaces>>,
	) -> Self {
		Self {
			pool,
			principal,
			namespaces: namespaces.into(),
			max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
		}
	}

	/// Bound the number of list calls a clustered list keeps in flight.
	pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
		self.max_concurrent_requests = max.max(1);
		self
	}

	pub fn principal(&self) -> &Principal {
		&self.principal
	}

	pub fn namespaces(&self) -> &AccessibleNamespaces {
		&self.namespaces
	}

	pub fn pool(&self) -> &Arc<ClientsPool> {
		&self.pool
	}

	async fn api(
		&self,
		cluster: &str,
		kind: &ResourceKind,
		namespace: Option<&str>,
	) -> Result<Api<DynamicObject>, ClientError> {
		let client = self.pool.client_for(&self.principal, cluster).await?;
		Ok(kind.api(client, namespace))
	}

	#[instrument(skip(self, kind), fields(kind = %kind.kind()))]
	pub async fn get(
		&self,
		cluster: &str,
		kind: &ResourceKind,
		namespace: Option<&str>,
		name: &str,
	) -> Result<DynamicObject, ClientError> {
		let api = self.api(cluster, kind, namespace).await?;
		Ok(api.get(name).await?)
	}

	/// List within one cluster. `namespace = None` lists across all
	/// namespaces the principal's RBAC allows.
	#[instrument(skip(self, kind, params), fields(kind = %kind.kind()))]
	pub async fn list(
		&self,
		cluster: &str,
		kind: &ResourceKind,
		namespace: Option<&str>,
		params: &ListParams,
	) -> Result<ObjectList<DynamicObject>, ClientError> {
		let api = self.api(cluster, kind, namespace).await?;
		Ok(api.list(params).await?)
	}

	/// Create `object` in the namespace named by its metadata.
	#[instrument(skip_all, fields(cluster = %cluster, kind = %kind.kind()))]
	pub async fn create(
		&self,
		cluster: &str,
		kind: &ResourceKind,
		object: &DynamicObject,
		params: &PostParams,
	) -> Result<DynamicObject, ClientError> {
		let api = self
			.api(cluster, kind, object.metadata.namespace.as_deref())
			.await?;
		Ok(api.create(params, object).await?)
	}

	/// Replace `object`, identified by its metadata.
	#[instrument(skip_all, fields(cluster = %cluster, kind = %kind.kind()))]
	pub async fn update(
		&self,
		cluster: &str,
		kind: &ResourceKind,
		object: &DynamicObject,
		params: &PostParams,
	) -> Result<DynamicObject, ClientError> {
		let name = object
			.metadata
			.name
			.as_deref()
			.ok_or(ClientError::MissingName)?;
		let api = self
			.api(cluster, kind, object.metadata.namespace.as_deref())
			.await?;
		Ok(api.replace(name, params, object).await?)
	}

	/// Delete an object.
	///
	/// Returns the object when deletion is still in progress (e.g. pending
	/// finalizers), `None` once it is gone.
	#[instrument(skip(self, kind, params), fields(kind = %kind.kind()))]
	pub async fn delete(
		&self,
		cluster: &str,
		kind: &ResourceKind,
		namespace: Option<&str>,
		name: &str,
		params: &DeleteParams,
	) -> Result<Option<DynamicObject>, ClientError> {
		let api = self.api(cluster, kind, namespace).await?;
		Ok(api.delete(name, params).await?.left())
	}

	#[instrument(skip(self, kind, params, patch), fields(kind = %kind.kind()))]
	pub async fn patch(
		&self,
		cluster: &str,
		kind: &ResourceKind,
		namespace: Option<&str>,
		name: &str,
		params: &PatchParams,
		patch: &Patch<serde_json::Value>,
	) -> Result<DynamicObject, ClientError> {
		let api = self.api(cluster, kind, namespace).await?;
		Ok(api.patch(name, params, patch).await?)
	}

	/// Fetch an object by kind name and resolve the tenant of its namespace.
	pub async fn get_object(
		&self,
		kinds: &KindRegistry,
		cluster: &str,
		kind: &str,
		namespace: Option<&str>,
		name: &str,
	) -> Result<TenantObject, ClientError> {
		let resource_kind = kinds
			.lookup(kind)
			.ok_or_else(|| ClientError::UnknownKind(kind.to_string()))?;
		let object = self.get(cluster, resource_kind, namespace, name).await?;
		let tenant = object
			.metadata
			.namespace
			.as_deref()
			.and_then(|ns| self.namespaces.tenant(cluster, ns))
			.map(str::to_string);

		Ok(TenantObject {
			cluster: cluster.to_string(),
			object,
			tenant,
		})
	}

	/// List `request.kind` across every cluster and accessible namespace.
	///
	/// Returns the items of this round grouped by cluster in scope order,
	/// the token for the next round, and the scopes that failed. A failed
	/// scope never fails the call.
	pub async fn clustered_list(
		&self,
		request: &ClusteredListRequest,
	) -> Result<ClusteredList, ClientError> {
		Aggregator {
			pool: &self.pool,
			principal: &self.principal,
			namespaces: &self.namespaces,
			max_concurrent_requests: self.max_concurrent_requests,
		}
		.run(request)
		.await
	}
}
