//! In-memory actor registry (C1) and node-local uid cache (C2).
//!
//! Both components key off [`ActorHost`] liveness. The only component that
//! installs actor monitors is [`ActorIndex`] (spec.md §4.1); [`UidCache`]
//! eviction is driven by MasterLoop re-dispatching the same liveness
//! notification, not by a monitor of its own.

pub mod index;
pub mod uid_cache;

pub use index::ActorIndex;
pub use uid_cache::UidCache;

use async_trait::async_trait;

use crate::ids::ActorHost;

/// Liveness-token abstraction (spec.md §9 design notes): a capability that
/// resolves once the given host is observed unreachable. Implementations
/// without first-class process monitoring may poll or piggy-back on
/// transport keepalives; this crate only needs the resolved future.
#[async_trait]
pub trait LivenessMonitor: Send + Sync {
    /// Suspend until `host` is confirmed dead. Must be cancel-safe: dropping
    /// the returned future (e.g. via task abort on explicit removal) must
    /// not leak resources.
    async fn await_death(&self, host: ActorHost);
}
