//! Per-service cluster leader.
//!
//! One [`master::MasterLoop`] runs per configured service on every node:
//! exactly one instance cluster-wide holds the leader role at a time
//! (decided by [`election::LeaderElector`]), reconciles desired vs observed
//! placement across the node set ([`placement::PlacementReconciler`]), and
//! owns an in-memory, pid-keyed actor registry
//! ([`actor::ActorIndex`]/[`actor::UidCache`]). Every other node runs a
//! follower instance that tracks the leader and is a candidate to take over
//! on failure.
//!
//! This crate models its external collaborators — NodeService,
//! ServiceRuntime, ConfigStore, UserCallbacks, the cluster-global name
//! registry — as traits. No concrete transport, CLI, or packaging is
//! included; callers supply implementations of those traits for their
//! cluster's actual RPC layer.

pub mod actor;
pub mod client;
pub mod config;
pub mod election;
pub mod error;
pub mod ids;
pub mod master;
pub mod node;
pub mod placement;
pub mod supervisor;

pub use client::call_with_retry;
pub use config::{ClientConfig, ElectionConfig, MasterConfig, SupervisorConfig};
pub use error::{ClusterError, Result};
pub use ids::{ActorHost, ActorId, NodeId, ServiceId, Uid};
pub use master::{FindActorOutcome, MasterHandle, MasterInfo, MasterLoop, UserCallbacks};
pub use node::{InstanceStatus, NodeInfo, NodePartition, NodeService, NodeStatus};
pub use supervisor::{MasterSupervisor, RestartIntensity};
