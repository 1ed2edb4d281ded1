//! MasterState (spec.md §3): one per service, per node.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::ids::{NodeId, ServiceId};
use crate::node::{InstanceStatus, NodeInfo};

/// Per-service, per-node coordinator state. Owned exclusively by the
/// MasterLoop task — single-writer, no internal locking (spec.md §5).
pub struct MasterState {
    pub service_id: ServiceId,
    pub is_leader: bool,
    /// Whom we currently believe is leader (monitored).
    pub leader_node: Option<NodeId>,
    /// Populated only while leader: node -> time it registered as follower.
    pub followers: HashMap<NodeId, DateTime<Utc>>,
    pub nodes: HashMap<NodeId, NodeInfo>,
    /// Leader-only view of per-node runtime status.
    pub instances: HashMap<NodeId, InstanceStatus>,
    /// Leader's current version hash, authoritative for reconciliation.
    pub current_version: String,
}

impl MasterState {
    pub fn new(service_id: ServiceId, initial_version: impl Into<String>) -> Self {
        Self {
            service_id,
            is_leader: false,
            leader_node: None,
            followers: HashMap::new(),
            nodes: HashMap::new(),
            instances: HashMap::new(),
            current_version: initial_version.into(),
        }
    }
}

/// Read-only snapshot returned by `get_info` (spec.md §4.5).
#[derive(Debug, Clone)]
pub struct MasterInfo {
    pub service_id: ServiceId,
    pub is_leader: bool,
    pub leader_node: Option<NodeId>,
    pub followers: Vec<NodeId>,
    pub nodes: HashMap<NodeId, NodeInfo>,
    pub instances: HashMap<NodeId, InstanceStatus>,
}

impl From<&MasterState> for MasterInfo {
    fn from(state: &MasterState) -> Self {
        Self {
            service_id: state.service_id.clone(),
            is_leader: state.is_leader,
            leader_node: state.leader_node.clone(),
            followers: state.followers.keys().cloned().collect(),
            nodes: state.nodes.clone(),
            instances: state.instances.clone(),
        }
    }
}
