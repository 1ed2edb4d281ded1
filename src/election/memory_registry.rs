//! In-memory `NameRegistry` test double, including the default conflict
//! resolver. Mirrors the teacher's habit of exercising distributed logic
//! (`consensus::leader::LeaderElection`) against an in-process double rather
//! than a real network.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Candidate, ClaimOutcome, NameRegistry, RegistryEvent};
use crate::ids::NodeId;

/// Default conflict resolver (spec.md §4.3): earlier `start_time` wins;
/// ties broken by a stable ordering of node identifiers.
///
/// Open question from spec.md §9: the original picks the *second* candidate
/// on an exact tie, which is non-deterministic in a symmetric conflict. This
/// crate takes the spec's own recommendation and uses a stable tiebreaker —
/// the lexicographically smaller `NodeId` wins (decision recorded in
/// DESIGN.md).
pub fn default_resolver(a: &Candidate, b: &Candidate) -> Candidate {
    if a.start_time < b.start_time {
        a.clone()
    } else if b.start_time < a.start_time {
        b.clone()
    } else if a.node <= b.node {
        a.clone()
    } else {
        b.clone()
    }
}

type Resolver = Box<dyn Fn(&Candidate, &Candidate) -> Candidate + Send + Sync>;

struct Inner {
    holders: HashMap<String, Candidate>,
    subscribers: HashMap<NodeId, mpsc::UnboundedSender<RegistryEvent>>,
}

pub struct InMemoryNameRegistry {
    resolver: Resolver,
    inner: Mutex<Inner>,
}

impl InMemoryNameRegistry {
    pub fn new() -> Self {
        Self::with_resolver(default_resolver)
    }

    pub fn with_resolver(
        resolver: impl Fn(&Candidate, &Candidate) -> Candidate + Send + Sync + 'static,
    ) -> Self {
        Self {
            resolver: Box::new(resolver),
            inner: Mutex::new(Inner {
                holders: HashMap::new(),
                subscribers: HashMap::new(),
            }),
        }
    }
}

impl Default for InMemoryNameRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NameRegistry for InMemoryNameRegistry {
    async fn subscribe(&self, node: NodeId) -> mpsc::UnboundedReceiver<RegistryEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().subscribers.insert(node, tx);
        rx
    }

    async fn claim(&self, name: &str, candidate: Candidate) -> ClaimOutcome {
        let mut inner = self.inner.lock();
        match inner.holders.get(name).cloned() {
            None => {
                inner.holders.insert(name.to_string(), candidate);
                ClaimOutcome::Won
            }
            Some(existing) if existing.node == candidate.node => ClaimOutcome::Won,
            Some(existing) => {
                let winner = (self.resolver)(&existing, &candidate);
                if winner.node == candidate.node {
                    inner.holders.insert(name.to_string(), candidate);
                    if let Some(tx) = inner.subscribers.get(&existing.node) {
                        let _ = tx.send(RegistryEvent::OtherIsLeader);
                    }
                    ClaimOutcome::Won
                } else {
                    ClaimOutcome::Lost(winner)
                }
            }
        }
    }

    async fn current(&self, name: &str) -> Option<Candidate> {
        self.inner.lock().holders.get(name).cloned()
    }

    async fn register_follower(&self, name: &str, follower: Candidate) {
        let inner = self.inner.lock();
        let Some(holder) = inner.holders.get(name) else {
            return;
        };
        if let Some(tx) = inner.subscribers.get(&holder.node) {
            let _ = tx.send(RegistryEvent::FollowerRegistered(follower.node));
        }
    }

    async fn broadcast_check_leader(&self, name: &str, from: &NodeId) {
        let inner = self.inner.lock();
        for (node, tx) in inner.subscribers.iter() {
            if node != from && inner.holders.get(name).map(|c| &c.node) == Some(from) {
                let _ = tx.send(RegistryEvent::CheckLeaderHint);
            }
        }
    }
}
