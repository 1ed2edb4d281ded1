//! LeaderElector (C3): claim / observe / resolve the per-service global name.

pub mod elector;
pub mod memory_registry;

pub use elector::{LeaderElector, TickOutcome};
pub use memory_registry::InMemoryNameRegistry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::ids::NodeId;

/// One candidate in a leader claim: the node plus its immutable start time,
/// the tiebreak key the conflict resolver uses (spec.md §4.3). Modeled as a
/// node-local constant read by the resolver, per spec.md §9 design notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub node: NodeId,
    pub start_time: DateTime<Utc>,
}

impl Candidate {
    pub fn new(node: NodeId, start_time: DateTime<Utc>) -> Self {
        Self { node, start_time }
    }
}

/// Outcome of a `claim` call, after the resolver has run if there was a
/// concurrent claimant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Won,
    Lost(Candidate),
}

/// Events the registry pushes to a subscribed node out-of-band from a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// This node believed it was leader; the registry disagrees. Orderly
    /// shutdown follows (spec.md §4.3 step 3, §7).
    OtherIsLeader,
    /// A peer just won a claim; run the elector tick now instead of waiting
    /// for the timer (spec.md §4.3 step 6).
    CheckLeaderHint,
    /// A follower re-registered with the name this node holds (spec.md
    /// §4.3 step 4); routed here so the leader's `MasterLoop` can record it
    /// in `MasterState::followers`.
    FollowerRegistered(NodeId),
}

/// The cluster-global name registry (part of the Transport collaborator,
/// spec.md §1/§6): atomic `claim` with a conflict resolver, plus the
/// broadcast channel used for the `check_leader` convergence hint.
#[async_trait]
pub trait NameRegistry: Send + Sync {
    /// Subscribe this node to registry events for later claims/hints.
    async fn subscribe(&self, node: NodeId) -> mpsc::UnboundedReceiver<RegistryEvent>;

    /// Attempt to atomically claim `name` for `candidate`. If another
    /// candidate already holds it, the registry's conflict resolver decides
    /// the winner (spec.md §4.3).
    async fn claim(&self, name: &str, candidate: Candidate) -> ClaimOutcome;

    /// Current registered holder of `name`, if any.
    async fn current(&self, name: &str) -> Option<Candidate>;

    /// Re-register as a follower of the currently believed leader.
    async fn register_follower(&self, name: &str, follower: Candidate);

    /// Broadcast a `check_leader` hint to every subscriber but `from`.
    async fn broadcast_check_leader(&self, name: &str, from: &NodeId);
}

/// The global name this crate claims for a service's leader.
pub fn leader_name(service_id: &crate::ids::ServiceId) -> String {
    format!("leader({service_id})")
}
