//! Cluster-master timing and retry configuration.
//!
//! Mirrors the teacher's per-concern config structs (`ConsensusConfig`,
//! `FailoverConfig`) that each hold the `Duration`/count constants for one
//! component and derive `Default` from the values the spec calls out.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Leader election timing (spec.md §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// Periodic tick interval. Spec: "every 5 s, jitter optional".
    pub tick_interval: Duration,

    /// Optional jitter added to each tick, uniformly in `[0, jitter)`.
    pub tick_jitter: Duration,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            tick_jitter: Duration::from_millis(0),
        }
    }
}

/// Client-side call semantics (spec.md §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Per-call timeout.
    pub call_timeout: Duration,

    /// Retry backoff between attempts.
    pub retry_backoff: Duration,

    /// Maximum retry attempts, only on `leader_not_found`.
    pub retry_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_secs(1),
            retry_attempts: 10,
        }
    }
}

/// MasterSupervisor restart-intensity limits (spec.md §4.6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Maximum restarts allowed within `restart_window` before giving up.
    pub max_restarts: u32,

    /// Sliding window over which restarts are counted.
    pub restart_window: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_restarts: 10,
            restart_window: Duration::from_secs(60),
        }
    }
}

/// Top-level configuration bundle for one service's MasterLoop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MasterConfig {
    pub election: ElectionConfig,
    pub client: ClientConfig,
    pub supervisor: SupervisorConfig,
}
