//! Cluster-master error taxonomy.

use thiserror::Error;

use crate::ids::{NodeId, ServiceId};

/// Result type for cluster-master operations.
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Wire-visible error taxonomy (spec.md §7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClusterError {
    /// No registered leader at call time; client retries with backoff.
    #[error("no registered leader for service {0}")]
    LeaderNotFound(ServiceId),

    /// Registry lookup miss.
    #[error("actor not found")]
    ActorNotFound,

    /// `(class, name)` bound to a different host.
    #[error("actor already registered to a different host")]
    AlreadyRegistered,

    /// Registration carried an empty uid (spec.md §3: uid must be nonempty).
    #[error("actor uid must be nonempty")]
    EmptyUid,

    /// Request carried a service id different from the leader's.
    #[error("invalid service: expected {expected}, got {got}")]
    InvalidService { expected: ServiceId, got: ServiceId },

    /// Transport-level failure; placement-only, never surfaced to user path.
    #[error("rpc error: {0}")]
    RpcError(String),

    /// This node is not the leader for the service.
    #[error("not leader (current: {0:?})")]
    NotLeader(Option<NodeId>),

    /// The service is not configured on this node.
    #[error("service not configured: {0}")]
    UnknownService(ServiceId),
}

impl From<tokio::task::JoinError> for ClusterError {
    fn from(err: tokio::task::JoinError) -> Self {
        ClusterError::RpcError(format!("detached worker join error: {err}"))
    }
}
