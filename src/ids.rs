//! Core identifiers (spec.md §3).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, stable identifier of a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceId(String);

impl ServiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ServiceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ServiceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Cluster-unique node identifier. Minted by NodeService, not by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Globally unique, immutable identifier for one actor incarnation.
///
/// Opaque bytes per spec.md §3; backed by a UUID in practice since every
/// producer in this corpus mints identities that way, but never interpreted
/// as anything other than an opaque key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uid(Vec<u8>);

impl Uid {
    /// Generate a new, globally unique uid.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().as_bytes().to_vec())
    }

    /// Wrap existing opaque bytes. Empty uids are invalid once registered
    /// (spec.md §3) but construction itself does not reject them — callers
    /// enforce nonempty-ness at registration time.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl From<uuid::Uuid> for Uid {
    fn from(u: uuid::Uuid) -> Self {
        Self(u.as_bytes().to_vec())
    }
}

/// Process handle: a liveness-observable reference to some node's process
/// hosting an actor. Transport supplies the concrete address; this crate only
/// needs equality, hashing, and a way to obtain a liveness subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorHost {
    pub node: NodeId,
    /// Opaque, transport-defined address of the hosting process (pid,
    /// connection id, etc). Only compared for equality here.
    pub address: String,
}

impl ActorHost {
    pub fn new(node: NodeId, address: impl Into<String>) -> Self {
        Self {
            node,
            address: address.into(),
        }
    }
}

impl fmt::Display for ActorHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.address)
    }
}

/// `{service, class, name, uid, host}` — uniquely names and locates one
/// actor incarnation (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorId {
    pub service: ServiceId,
    pub class: String,
    pub name: String,
    pub uid: Uid,
    pub host: ActorHost,
}

impl ActorId {
    pub fn new(
        service: ServiceId,
        class: impl Into<String>,
        name: impl Into<String>,
        uid: Uid,
        host: ActorHost,
    ) -> Self {
        Self {
            service,
            class: class.into(),
            name: name.into(),
            uid,
            host,
        }
    }

    /// The `(class, name)` half of the identity.
    pub fn key(&self) -> (String, String) {
        (self.class.clone(), self.name.clone())
    }
}
