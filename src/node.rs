//! Node and instance status types supplied by NodeService / ServiceRuntime.
//!
//! Both are read-only to this crate (spec.md §3): the core only observes and
//! partitions them, the way the teacher's `MembershipView` treats `Node`
//! snapshots as data to fold, not to mutate in place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;

use crate::ids::NodeId;

/// Node liveness status as published by NodeService.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Normal,
    Down,
    Other,
}

/// Node metadata as published by NodeService. Read-only to this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub status: NodeStatus,
    pub last_seen: DateTime<Utc>,
}

impl NodeInfo {
    pub fn new(status: NodeStatus) -> Self {
        Self {
            status,
            last_seen: Utc::now(),
        }
    }
}

/// Instance status as pushed by ServiceRuntime on every node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub node: NodeId,
    pub version_hash: String,
    pub reported_at: DateTime<Utc>,
}

impl InstanceStatus {
    pub fn new(node: NodeId, version_hash: impl Into<String>) -> Self {
        Self {
            node,
            version_hash: version_hash.into(),
            reported_at: Utc::now(),
        }
    }
}

/// The three-way partition of a node set used by PlacementReconciler
/// (spec.md §4.4).
#[derive(Debug, Clone, Default)]
pub struct NodePartition {
    pub running: Vec<NodeId>,
    pub not_running: Vec<NodeId>,
    pub unknown: Vec<NodeId>,
}

impl NodePartition {
    pub fn from_nodes(nodes: &HashMap<NodeId, NodeInfo>) -> Self {
        let mut partition = NodePartition::default();
        for (id, info) in nodes {
            match info.status {
                NodeStatus::Normal => partition.running.push(id.clone()),
                NodeStatus::Down => partition.not_running.push(id.clone()),
                NodeStatus::Other => partition.unknown.push(id.clone()),
            }
        }
        partition
    }
}

/// External collaborator (spec.md §6): pushes `node_set_update` snapshots to
/// a subscribed MasterLoop asynchronously. One subscription per node.
#[async_trait]
pub trait NodeService: Send + Sync {
    async fn subscribe(&self) -> mpsc::UnboundedReceiver<HashMap<NodeId, NodeInfo>>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tokio::sync::Mutex;

    /// Test double: holds the sender from the last `subscribe` call so tests
    /// can `publish` snapshots as if NodeService pushed them.
    #[derive(Default)]
    pub struct InMemoryNodeService {
        tx: Mutex<Option<mpsc::UnboundedSender<HashMap<NodeId, NodeInfo>>>>,
    }

    impl InMemoryNodeService {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn publish(&self, nodes: HashMap<NodeId, NodeInfo>) {
            if let Some(tx) = self.tx.lock().await.as_ref() {
                let _ = tx.send(nodes);
            }
        }
    }

    #[async_trait]
    impl NodeService for InMemoryNodeService {
        async fn subscribe(&self) -> mpsc::UnboundedReceiver<HashMap<NodeId, NodeInfo>> {
            let (tx, rx) = mpsc::unbounded_channel();
            *self.tx.lock().await = Some(tx);
            rx
        }
    }
}
