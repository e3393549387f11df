//! Fan-out of one clustered-list round across clusters and scopes.

use std::{collections::HashMap, sync::Arc};

use kube::{
	api::{DynamicObject, ListParams},
	core::ObjectList,
};
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, Instrument};

use crate::{
	clustered_list::{ClusteredList, ClusteredListRequest, ScopedList},
	continuation::{Continuation, ResumptionState},
	error::{ClientError, ScopeError, ScopeFailure},
	kinds::ResourceKind,
	namespaces::AccessibleNamespaces,
	pool::{ClientsPool, PoolError},
	principal::Principal,
	scope::{PlannedScope, RoundPlan, Scope},
};

/// Default bound on list calls in flight across all clusters.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 8;

/// What happened to one scope.
enum ScopeOutcome {
	Listed {
		scope: Scope,
		list: ObjectList<DynamicObject>,
	},
	Failed(ScopeError),
}

/// Outcomes of one cluster, in scope order.
struct ClusterRound {
	outcomes: Vec<ScopeOutcome>,
	connected: bool,
	cancelled: bool,
}

/// Shared inputs of every per-cluster task.
#[derive(Clone)]
struct RoundContext {
	pool: Arc<ClientsPool>,
	principal: Principal,
	kind: ResourceKind,
	params: ListParams,
	permits: Arc<Semaphore>,
	cancel: CancellationToken,
}

/// Runs clustered-list rounds for one principal.
pub(crate) struct Aggregator<'a> {
	pub pool: &'a Arc<ClientsPool>,
	pub principal: &'a Principal,
	pub namespaces: &'a AccessibleNamespaces,
	pub max_concurrent_requests: usize,
}

impl Aggregator<'_> {
	/// Execute one round.
	///
	/// Scope failures are collected into the result. Only structural problems
	/// fail the call: a malformed token, no registered cluster, no reachable
	/// cluster, or cancellation.
	#[instrument(skip_all, fields(
		principal = %self.principal.id,
		kind = %request.kind.kind(),
		resumed = !request.continue_token.is_empty(),
	))]
	pub async fn run(&self, request: &ClusteredListRequest) -> Result<ClusteredList, ClientError> {
		let continuation = Continuation::decode(&request.continue_token)?;
		if request.cancel.is_cancelled() {
			return Err(ClientError::Cancelled {
				partial: Box::default(),
			});
		}

		let clusters = self.pool.cluster_names();
		if clusters.is_empty() {
			return Err(ClientError::NoClusters);
		}

		let plan = RoundPlan::new(
			clusters.iter().map(String::as_str),
			request.kind.scope,
			self.namespaces,
			continuation.state(),
		);
		tracing::debug!(
			clusters = plan.clusters.len(),
			scopes = plan.scope_count(),
			"planned round"
		);

		let cancel = request.cancel.child_token();
		let timer = request.timeout.map(|timeout| {
			let cancel = cancel.clone();
			tokio::spawn(async move {
				tokio::time::sleep(timeout).await;
				cancel.cancel();
			})
		});

		let ctx = RoundContext {
			pool: Arc::clone(self.pool),
			principal: self.principal.clone(),
			kind: request.kind.clone(),
			params: request.list_params(),
			permits: Arc::new(Semaphore::new(self.max_concurrent_requests.max(1))),
			cancel,
		};

		let planned_clusters = plan.clusters.len();
		let mut join_set = JoinSet::new();
		let mut task_clusters = HashMap::new();
		for (cluster, scopes) in plan.clusters {
			let span = tracing::debug_span!("cluster", cluster = %cluster);
			let handle =
				join_set.spawn(list_cluster(ctx.clone(), cluster.clone(), scopes).instrument(span));
			task_clusters.insert(handle.id(), cluster);
		}

		let mut rounds = HashMap::new();
		while let Some(joined) = join_set.join_next_with_id().await {
			match joined {
				Ok((id, round)) => {
					if let Some(cluster) = task_clusters.remove(&id) {
						rounds.insert(cluster, round);
					}
				}
				Err(e) => {
					if let Some(timer) = &timer {
						timer.abort();
					}
					return Err(ClientError::TaskPanicked(e));
				}
			}
		}
		if let Some(timer) = timer {
			timer.abort();
		}

		merge(rounds, plan.unregistered, planned_clusters)
	}
}

/// Combine per-cluster outcomes into the round's result.
fn merge(
	rounds: HashMap<String, ClusterRound>,
	unregistered: Vec<Scope>,
	planned_clusters: usize,
) -> Result<ClusteredList, ClientError> {
	let mut result = ClusteredList::default();
	let mut cursors = Vec::new();
	let mut cancelled = false;
	let mut reachable = 0;

	let mut rounds: Vec<_> = rounds.into_iter().collect();
	rounds.sort_by(|(a, _), (b, _)| a.cmp(b));

	for (_, round) in rounds {
		cancelled |= round.cancelled;
		if round.connected {
			reachable += 1;
		}
		for outcome in round.outcomes {
			match outcome {
				ScopeOutcome::Listed { scope, list } => {
					let cursor = list.metadata.continue_.filter(|c| !c.is_empty());
					if cursor.is_none() {
						tracing::debug!(%scope, "scope exhausted");
					}
					cursors.push((scope.clone(), cursor));
					result.push(ScopedList {
						scope,
						items: list.items,
						resource_version: list.metadata.resource_version,
					});
				}
				ScopeOutcome::Failed(error) => {
					tracing::warn!(scope = %error.scope, error = %error.failure, "scope query failed");
					result.push_error(error);
				}
			}
		}
	}

	for scope in unregistered {
		let failure = ScopeFailure::Cluster(Arc::new(PoolError::ClusterNotFound(
			scope.cluster.clone(),
		)));
		result.push_error(ScopeError::new(scope, failure));
	}

	if cancelled {
		return Err(ClientError::Cancelled {
			partial: Box::new(result),
		});
	}

	if planned_clusters > 0 && reachable == 0 {
		let (_, errors) = result.into_parts();
		return Err(ClientError::NoReachableClusters(errors.unwrap_or_default()));
	}

	result.set_next(ResumptionState::advance(cursors));
	Ok(result)
}

/// Visit the planned scopes of one cluster in order.
async fn list_cluster(ctx: RoundContext, cluster: String, scopes: Vec<PlannedScope>) -> ClusterRound {
	let mut round = ClusterRound {
		outcomes: Vec::with_capacity(scopes.len()),
		connected: false,
		cancelled: false,
	};

	let client = tokio::select! {
		biased;
		() = ctx.cancel.cancelled() => {
			round.cancelled = true;
			return round;
		}
		client = ctx.pool.client_for(&ctx.principal, &cluster) => client,
	};
	let client = match client {
		Ok(client) => client,
		Err(e) => {
			let failure = Arc::new(e);
			round.outcomes.extend(scopes.into_iter().map(|planned| {
				ScopeOutcome::Failed(ScopeError::new(
					planned.scope,
					ScopeFailure::Cluster(Arc::clone(&failure)),
				))
			}));
			return round;
		}
	};
	round.connected = true;

	for PlannedScope { scope, cursor } in scopes {
		let api = ctx.kind.api(client.clone(), scope.namespace.as_deref());
		let params = ListParams {
			continue_token: cursor,
			..ctx.params.clone()
		};

		let listed = tokio::select! {
			biased;
			() = ctx.cancel.cancelled() => {
				round.cancelled = true;
				break;
			}
			listed = async {
				let _permit = ctx.permits.acquire().await;
				api.list(&params).await
			} => listed,
		};

		round.outcomes.push(match listed {
			Ok(list) => ScopeOutcome::Listed { scope, list },
			Err(e) => ScopeOutcome::Failed(ScopeError::new(scope, ScopeFailure::Query(e))),
		});
	}

	round
}
