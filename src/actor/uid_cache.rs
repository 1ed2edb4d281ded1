//! UidCache (C2): node-local cache of recently resolved actor identities.
//!
//! Indexed by uid, keyed additionally by owning host so entries can be
//! evicted in bulk when that host dies. Never performs RPC; no expiration
//! beyond liveness-driven eviction (spec.md §4.2).

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::error::{ClusterError, Result};
use crate::ids::{ActorHost, ActorId, Uid};

#[derive(Default)]
struct Inner {
    by_uid: HashMap<Uid, ActorId>,
    by_host: HashMap<ActorHost, HashSet<Uid>>,
}

pub struct UidCache {
    inner: Mutex<Inner>,
}

impl UidCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Local-only lookup; never performs RPC.
    pub fn lookup(&self, uid: &Uid) -> Result<ActorId> {
        self.inner
            .lock()
            .by_uid
            .get(uid)
            .cloned()
            .ok_or(ClusterError::ActorNotFound)
    }

    /// Record a successful remote resolution or registration.
    pub fn insert(&self, actor: ActorId) {
        let mut inner = self.inner.lock();
        inner
            .by_host
            .entry(actor.host.clone())
            .or_default()
            .insert(actor.uid.clone());
        inner.by_uid.insert(actor.uid.clone(), actor);
    }

    /// Drop every entry owned by `host`. MasterLoop calls this alongside
    /// `ActorIndex::remove_by_host` for the same liveness notification —
    /// UidCache does not install its own monitor (spec.md §4.1).
    pub fn evict_host(&self, host: &ActorHost) {
        let mut inner = self.inner.lock();
        if let Some(uids) = inner.by_host.remove(host) {
            for uid in uids {
                inner.by_uid.remove(&uid);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_uid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for UidCache {
    fn default() -> Self {
        Self::new()
    }
}
