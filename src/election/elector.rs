//! LeaderElector tick logic (spec.md §4.3).

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Candidate, ClaimOutcome, NameRegistry, RegistryEvent};
use crate::actor::LivenessMonitor;
use crate::ids::{ActorHost, NodeId, ServiceId};

/// The sentinel address a believed-leader's node is watched under. Leader
/// liveness is node-level, not process-level, but reuses the same
/// `LivenessMonitor` machinery [`crate::actor::ActorIndex`] uses.
const LEADER_WATCH_ADDR: &str = "__leader__";

/// Result of one elector tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    RemainedLeader,
    BecameLeader,
    RemainedFollower { leader: NodeId },
    /// This node believed it was leader but the registry disagrees; the
    /// caller must shut down (spec.md §4.3 step 3).
    StepDown,
    /// Registry shows a different holder than last believed; watching, no
    /// re-registration yet (spec.md §4.3 step 5).
    Watching { candidate: NodeId },
    /// No leader registered and our claim lost to a concurrent claimant.
    ClaimLost { winner: NodeId },
}

pub struct LeaderElector {
    service_id: ServiceId,
    name: String,
    local: Candidate,
    registry: Arc<dyn NameRegistry>,
    liveness: Arc<dyn LivenessMonitor>,
    is_leader: bool,
    believed_leader: Option<Candidate>,
    watcher: Option<JoinHandle<()>>,
    /// Fires when the believed leader (or self, if we were leader) is
    /// observed dead; consumed by MasterLoop to trigger an immediate tick.
    death_tx: mpsc::UnboundedSender<()>,
    death_rx: mpsc::UnboundedReceiver<()>,
}

impl LeaderElector {
    pub fn new(
        service_id: ServiceId,
        local_node: NodeId,
        registry: Arc<dyn NameRegistry>,
        liveness: Arc<dyn LivenessMonitor>,
    ) -> Self {
        let (death_tx, death_rx) = mpsc::unbounded_channel();
        Self {
            name: super::leader_name(&service_id),
            service_id,
            local: Candidate::new(local_node, Utc::now()),
            registry,
            liveness,
            is_leader: false,
            believed_leader: None,
            watcher: None,
            death_tx,
            death_rx,
        }
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    pub fn local_node(&self) -> &NodeId {
        &self.local.node
    }

    pub fn believed_leader(&self) -> Option<&NodeId> {
        self.believed_leader.as_ref().map(|c| &c.node)
    }

    /// Subscribe this elector's node to registry events; callers should
    /// drain the returned receiver alongside [`death_notifications`] and
    /// re-run [`tick`] on `OtherIsLeader` / `CheckLeaderHint`.
    pub async fn subscribe_registry_events(&self) -> mpsc::UnboundedReceiver<RegistryEvent> {
        self.registry.subscribe(self.local.node.clone()).await
    }

    /// Receiver side of the death-notification channel (spec.md §4.3
    /// "Liveness"): fires once when the watched node dies, prompting an
    /// immediate tick instead of waiting for the timer.
    pub fn death_notifications(&mut self) -> &mut mpsc::UnboundedReceiver<()> {
        &mut self.death_rx
    }

    /// One periodic tick (spec.md §4.3 steps 1-6).
    pub async fn tick(&mut self) -> TickOutcome {
        let current = self.registry.current(&self.name).await;

        match current {
            Some(ref holder) if holder.node == self.local.node => {
                // Step 2: we (still) hold the name.
                if !self.is_leader {
                    self.become_leader();
                }
                TickOutcome::RemainedLeader
            }
            Some(ref holder) if self.is_leader => {
                // Step 3: we believe we're leader, registry disagrees.
                warn!(service = %self.service_id, "registry disagrees with believed leadership, stepping down");
                self.step_down();
                TickOutcome::StepDown
            }
            Some(holder) => {
                if self.believed_leader.as_ref() == Some(&holder) {
                    // Step 4: matches last known leader, register as follower.
                    self.registry
                        .register_follower(&self.name, self.local.clone())
                        .await;
                    TickOutcome::RemainedFollower { leader: holder.node }
                } else {
                    // Step 5: different than believed; watch, don't register yet.
                    self.watch(holder.node.clone());
                    self.believed_leader = Some(holder.clone());
                    TickOutcome::Watching { candidate: holder.node }
                }
            }
            None => {
                // Step 6: no leader; attempt claim.
                match self.registry.claim(&self.name, self.local.clone()).await {
                    ClaimOutcome::Won => {
                        self.become_leader();
                        self.registry
                            .broadcast_check_leader(&self.name, &self.local.node)
                            .await;
                        TickOutcome::BecameLeader
                    }
                    ClaimOutcome::Lost(winner) => {
                        self.watch(winner.node.clone());
                        self.believed_leader = Some(winner.clone());
                        TickOutcome::ClaimLost { winner: winner.node }
                    }
                }
            }
        }
    }

    fn become_leader(&mut self) {
        info!(service = %self.service_id, node = %self.local.node, "became leader");
        self.is_leader = true;
        self.believed_leader = Some(self.local.clone());
        self.cancel_watch();
    }

    fn step_down(&mut self) {
        self.is_leader = false;
        self.believed_leader = None;
        self.cancel_watch();
    }

    fn watch(&mut self, node: NodeId) {
        if self.watcher.is_some() {
            // Already watching someone; let tick() decide whether to
            // replace based on believed_leader comparison.
            return;
        }
        let liveness = Arc::clone(&self.liveness);
        let death_tx = self.death_tx.clone();
        let host = ActorHost::new(node, LEADER_WATCH_ADDR);
        self.watcher = Some(tokio::spawn(async move {
            debug!(node = %host.node, "watching believed leader for liveness");
            liveness.await_death(host).await;
            let _ = death_tx.send(());
        }));
    }

    fn cancel_watch(&mut self) {
        if let Some(handle) = self.watcher.take() {
            handle.abort();
        }
    }
}

impl Drop for LeaderElector {
    fn drop(&mut self) {
        self.cancel_watch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::test_support::ManualLivenessMonitor;
    use crate::election::InMemoryNameRegistry;

    fn elector(service: &str, node: &str, registry: Arc<dyn NameRegistry>) -> LeaderElector {
        LeaderElector::new(
            ServiceId::new(service),
            NodeId::new(node),
            registry,
            Arc::new(ManualLivenessMonitor::new()),
        )
    }

    #[tokio::test]
    async fn solo_node_becomes_leader_on_first_tick() {
        let registry: Arc<dyn NameRegistry> = Arc::new(InMemoryNameRegistry::new());
        let mut e = elector("svc", "n1", registry);

        assert_eq!(e.tick().await, TickOutcome::BecameLeader);
        assert!(e.is_leader());
    }

    #[tokio::test]
    async fn follower_registers_once_leader_is_seen_twice() {
        let registry: Arc<dyn NameRegistry> = Arc::new(InMemoryNameRegistry::new());
        let mut leader = elector("svc", "n1", Arc::clone(&registry));
        let mut follower = elector("svc", "n2", Arc::clone(&registry));

        leader.tick().await;

        let first = follower.tick().await;
        assert_eq!(first, TickOutcome::Watching { candidate: NodeId::new("n1") });

        let second = follower.tick().await;
        assert_eq!(second, TickOutcome::RemainedFollower { leader: NodeId::new("n1") });
        assert!(!follower.is_leader());
    }

    #[tokio::test]
    async fn stale_leader_steps_down_when_registry_disagrees() {
        let registry: Arc<dyn NameRegistry> = Arc::new(InMemoryNameRegistry::new());
        let mut leader = elector("svc", "n1", Arc::clone(&registry));
        leader.tick().await;
        assert!(leader.is_leader());

        // Someone else forcibly takes the name in the registry (simulating
        // an external re-claim after this node was wrongly presumed dead).
        registry
            .claim(
                &super::super::leader_name(&ServiceId::new("svc")),
                Candidate::new(NodeId::new("n2"), Utc::now() - chrono::Duration::seconds(100)),
            )
            .await;

        let outcome = leader.tick().await;
        assert_eq!(outcome, TickOutcome::StepDown);
        assert!(!leader.is_leader());
    }
}
