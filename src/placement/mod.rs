//! PlacementReconciler (C4): reconcile desired vs observed service
//! placement across the current node set (spec.md §4.4).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;
use crate::ids::{NodeId, ServiceId};
use crate::node::{InstanceStatus, NodePartition};

/// Outcome of one remote placement RPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcOutcome {
    Ok,
    /// `start` on an instance that already exists (idempotent, spec.md §4.4).
    AlreadyStarted,
}

/// Opaque, canonical configuration for a service, as handed out by
/// ConfigStore and carried verbatim in start/update RPCs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub version_hash: String,
    pub payload: Vec<u8>,
}

/// ConfigStore: source of the canonical service spec (spec.md §1).
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn current_spec(&self, service: &ServiceId) -> ServiceSpec;
}

/// ServiceRuntime: per-node runtime that can start/stop/update/replace a
/// service instance (spec.md §1, §6). All RPCs are safe to retry.
#[async_trait]
pub trait ServiceRuntime: Send + Sync {
    async fn start(&self, node: &NodeId, spec: ServiceSpec) -> Result<RpcOutcome>;
    async fn stop(&self, node: &NodeId, service: &ServiceId) -> Result<RpcOutcome>;
    async fn update(&self, node: &NodeId, spec: ServiceSpec) -> Result<RpcOutcome>;
    async fn replace(&self, node: &NodeId, service: &ServiceId, spec: ServiceSpec) -> Result<RpcOutcome>;
}

/// Summary of the RPCs one reconciliation pass decided to issue. Useful for
/// tests and observability; the reconciler itself never awaits these RPCs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub to_stop: Vec<NodeId>,
    pub to_start: Vec<NodeId>,
    pub to_update: Vec<NodeId>,
    pub dropped_unknown: Vec<NodeId>,
}

impl ReconcilePlan {
    pub fn is_noop(&self) -> bool {
        self.to_stop.is_empty() && self.to_start.is_empty() && self.to_update.is_empty()
    }
}

pub struct PlacementReconciler {
    service_id: ServiceId,
    runtime: Arc<dyn ServiceRuntime>,
    config_store: Arc<dyn ConfigStore>,
}

impl PlacementReconciler {
    pub fn new(
        service_id: ServiceId,
        runtime: Arc<dyn ServiceRuntime>,
        config_store: Arc<dyn ConfigStore>,
    ) -> Self {
        Self {
            service_id,
            runtime,
            config_store,
        }
    }

    /// Single-pass reconciliation (spec.md §4.4). Mutates `instances` to
    /// drop rows for nodes the leader no longer knows about (step 3); all
    /// RPCs are dispatched to detached worker tasks and never awaited here
    /// (spec.md §5) — failures are logged, not retried synchronously, and
    /// self-heal on the next trigger.
    pub async fn reconcile(
        &self,
        partition: &NodePartition,
        instances: &mut HashMap<NodeId, InstanceStatus>,
        current_version: &str,
    ) -> ReconcilePlan {
        let running: HashSet<NodeId> = partition.running.iter().cloned().collect();
        let not_running: HashSet<NodeId> = partition.not_running.iter().cloned().collect();
        let known: HashSet<NodeId> = instances.keys().cloned().collect();

        let to_stop: Vec<NodeId> = not_running.intersection(&known).cloned().collect();
        let to_start: Vec<NodeId> = running.difference(&known).cloned().collect();
        let dropped_unknown: Vec<NodeId> = known
            .iter()
            .filter(|n| !running.contains(*n) && !not_running.contains(*n))
            .cloned()
            .collect();

        for node in &dropped_unknown {
            instances.remove(node);
        }

        let to_update: Vec<NodeId> = instances
            .iter()
            .filter(|(node, status)| {
                running.contains(*node) && status.version_hash != current_version
            })
            .map(|(node, _)| node.clone())
            .collect();

        for node in &to_stop {
            self.spawn_stop(node.clone());
        }
        for node in &to_start {
            self.spawn_start(node.clone());
        }
        for node in &to_update {
            self.spawn_update(node.clone());
        }

        if !dropped_unknown.is_empty() {
            info!(service = %self.service_id, ?dropped_unknown, "dropped instance rows for unknown nodes");
        }

        ReconcilePlan {
            to_stop,
            to_start,
            to_update,
            dropped_unknown,
        }
    }

    fn spawn_stop(&self, node: NodeId) {
        let runtime = Arc::clone(&self.runtime);
        let service_id = self.service_id.clone();
        tokio::spawn(async move {
            if let Err(err) = runtime.stop(&node, &service_id).await {
                warn!(%node, %err, "stop RPC failed, will retry on next reconciliation");
            }
        });
    }

    fn spawn_start(&self, node: NodeId) {
        let runtime = Arc::clone(&self.runtime);
        let config_store = Arc::clone(&self.config_store);
        let service_id = self.service_id.clone();
        tokio::spawn(async move {
            let spec = config_store.current_spec(&service_id).await;
            if let Err(err) = runtime.start(&node, spec).await {
                warn!(%node, %err, "start RPC failed, will retry on next reconciliation");
            }
        });
    }

    fn spawn_update(&self, node: NodeId) {
        let runtime = Arc::clone(&self.runtime);
        let config_store = Arc::clone(&self.config_store);
        let service_id = self.service_id.clone();
        tokio::spawn(async move {
            let spec = config_store.current_spec(&service_id).await;
            if let Err(err) = runtime.update(&node, spec).await {
                warn!(%node, %err, "update RPC failed, will retry on next reconciliation");
            }
        });
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum RecordedCall {
        Start(NodeId),
        Stop(NodeId),
        Update(NodeId),
    }

    #[derive(Default)]
    pub struct RecordingRuntime {
        pub calls: Mutex<Vec<RecordedCall>>,
    }

    #[async_trait]
    impl ServiceRuntime for RecordingRuntime {
        async fn start(&self, node: &NodeId, _spec: ServiceSpec) -> Result<RpcOutcome> {
            self.calls.lock().push(RecordedCall::Start(node.clone()));
            Ok(RpcOutcome::Ok)
        }

        async fn stop(&self, node: &NodeId, _service: &ServiceId) -> Result<RpcOutcome> {
            self.calls.lock().push(RecordedCall::Stop(node.clone()));
            Ok(RpcOutcome::Ok)
        }

        async fn update(&self, node: &NodeId, _spec: ServiceSpec) -> Result<RpcOutcome> {
            self.calls.lock().push(RecordedCall::Update(node.clone()));
            Ok(RpcOutcome::Ok)
        }

        async fn replace(&self, node: &NodeId, _service: &ServiceId, _spec: ServiceSpec) -> Result<RpcOutcome> {
            self.calls.lock().push(RecordedCall::Update(node.clone()));
            Ok(RpcOutcome::Ok)
        }
    }

    pub struct StaticConfigStore(pub ServiceSpec);

    #[async_trait]
    impl ConfigStore for StaticConfigStore {
        async fn current_spec(&self, _service: &ServiceId) -> ServiceSpec {
            self.0.clone()
        }
    }
}
