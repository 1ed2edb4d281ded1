//! ActorIndex (C1): registry of actors hosted on this node's leader.
//!
//! Three logical mappings kept mutually consistent under a single-writer
//! discipline (spec.md §4.1): by-uid, by-name, by-host. All three live
//! behind one lock so the cross-map invariants spec.md calls out — a host
//! appears at most once, removing a host removes both other rows atomically
//! — hold structurally, not by convention.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use super::LivenessMonitor;
use crate::error::{ClusterError, Result};
use crate::ids::{ActorHost, ActorId, ServiceId, Uid};

#[derive(Default)]
struct Inner {
    by_uid: HashMap<Uid, (String, String, ActorHost)>,
    by_name: HashMap<(String, String), (Uid, ActorHost)>,
    by_host: HashMap<ActorHost, Uid>,
    watchers: HashMap<ActorHost, JoinHandle<()>>,
}

/// Registry of actors hosted on this node's leader for one service.
pub struct ActorIndex {
    service_id: ServiceId,
    monitor: Arc<dyn LivenessMonitor>,
    /// Fires once per host death, consumed by MasterLoop's event loop.
    death_tx: mpsc::UnboundedSender<ActorHost>,
    inner: Mutex<Inner>,
}

impl ActorIndex {
    /// `death_tx` is how this index reports a dead host back to the owning
    /// MasterLoop; the loop is expected to call [`remove_by_host`] and also
    /// evict the corresponding [`crate::actor::UidCache`] entry.
    pub fn new(
        service_id: ServiceId,
        monitor: Arc<dyn LivenessMonitor>,
        death_tx: mpsc::UnboundedSender<ActorHost>,
    ) -> Self {
        Self {
            service_id,
            monitor,
            death_tx,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Register an actor incarnation.
    ///
    /// - No entry for `(class, name)`: install a monitor, insert all three
    ///   rows, return `Ok`.
    /// - Entry for `(class, name)` bound to the *same* host: rename — drop
    ///   the old rows, install for the new identity, return `Ok`.
    /// - Entry for `(class, name)` bound to a *different* host:
    ///   `Err(AlreadyRegistered)`.
    pub fn register(&self, actor: ActorId) -> Result<()> {
        if actor.uid.is_empty() {
            return Err(ClusterError::EmptyUid);
        }

        let key = actor.key();
        let mut inner = self.inner.lock();

        if let Some((_, existing_host)) = inner.by_name.get(&key) {
            if existing_host != &actor.host {
                return Err(ClusterError::AlreadyRegistered);
            }
            // Rename on the same host: drop old rows first (spec.md §9 open
            // question — a concurrent lookup can observe the gap).
            self.remove_locked(&mut inner, &actor.host);
        }

        let watcher = self.spawn_watcher(actor.host.clone());
        inner
            .by_uid
            .insert(actor.uid.clone(), (actor.class.clone(), actor.name.clone(), actor.host.clone()));
        inner
            .by_name
            .insert(key, (actor.uid.clone(), actor.host.clone()));
        inner.by_host.insert(actor.host.clone(), actor.uid);
        inner.watchers.insert(actor.host, watcher);

        Ok(())
    }

    /// Look up by `(service, class, name)`. Requires `service` to match this
    /// index's service; otherwise logs and returns `ActorNotFound`.
    pub fn find_by_name(&self, service: &ServiceId, class: &str, name: &str) -> Result<ActorId> {
        if service != &self.service_id {
            warn!(
                requested = %service,
                expected = %self.service_id,
                "find_by_name called with mismatched service id"
            );
            return Err(ClusterError::ActorNotFound);
        }

        let inner = self.inner.lock();
        let key = (class.to_string(), name.to_string());
        let (uid, host) = inner.by_name.get(&key).ok_or(ClusterError::ActorNotFound)?;

        // Consistency cross-check: resolve the uid back through by_uid. Our
        // three maps share a single lock so this can never diverge; no log
        // is emitted per spec.md's exception for atomic multi-row updates.
        match inner.by_uid.get(uid) {
            Some((c, n, h)) if c == class && n == name && h == host => Ok(ActorId::new(
                self.service_id.clone(),
                class,
                name,
                uid.clone(),
                host.clone(),
            )),
            _ => Err(ClusterError::ActorNotFound),
        }
    }

    /// Look up by uid.
    pub fn find_by_uid(&self, uid: &Uid) -> Result<ActorId> {
        let inner = self.inner.lock();
        let (class, name, host) = inner.by_uid.get(uid).ok_or(ClusterError::ActorNotFound)?;
        Ok(ActorId::new(
            self.service_id.clone(),
            class.clone(),
            name.clone(),
            uid.clone(),
            host.clone(),
        ))
    }

    /// Remove all rows for `host`, aborting its liveness watcher. Returns
    /// whether anything was present.
    pub fn remove_by_host(&self, host: &ActorHost) -> bool {
        let mut inner = self.inner.lock();
        self.remove_locked(&mut inner, host)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove_locked(&self, inner: &mut Inner, host: &ActorHost) -> bool {
        let Some(uid) = inner.by_host.remove(host) else {
            return false;
        };
        if let Some((class, name, _)) = inner.by_uid.remove(&uid) {
            inner.by_name.remove(&(class, name));
        }
        if let Some(watcher) = inner.watchers.remove(host) {
            watcher.abort();
        }
        true
    }

    fn spawn_watcher(&self, host: ActorHost) -> JoinHandle<()> {
        let monitor = Arc::clone(&self.monitor);
        let death_tx = self.death_tx.clone();
        tokio::spawn(async move {
            let watched = host.clone();
            monitor.await_death(host).await;
            let _ = death_tx.send(watched);
        })
    }
}
