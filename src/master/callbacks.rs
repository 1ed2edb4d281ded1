//! UserCallbacks (spec.md §1, §4.5, §6): opaque per-service hooks.
//!
//! The core never inspects `State`; it is threaded through by value the way
//! the teacher's `RpcService` threads opaque request/response bytes through
//! its registered handlers without interpreting them.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::ids::{ActorId, ServiceId, Uid};

/// Reply a `find_uid` callback may give for a uid the ActorIndex missed.
pub enum FindUidReply<A> {
    /// Caller should receive this actor.
    Found(A),
    /// No such actor; the MasterLoop's reply is `actor_not_found`.
    NotFound,
    /// The callback asked the loop to terminate (programmer-error style
    /// escape hatch available to user code, spec.md §6).
    Stop,
}

/// Per-service user hooks, generic over the opaque state they thread
/// through `init`/`terminate` and every handler (spec.md §4.5).
#[async_trait]
pub trait UserCallbacks: Send + Sync + 'static {
    type State: Send + 'static;
    /// What `find_uid` returns to the caller when the ActorIndex misses.
    type Actor: Send + 'static;

    /// `empty_map` is always empty at call time (spec.md §6: no persisted
    /// state, the registry is rebuilt from scratch on every loop start) —
    /// handed through verbatim so a callback's `init` matches the shape of
    /// the map it will later see via `find_uid`.
    async fn init(&self, service_id: &ServiceId, empty_map: &HashMap<Uid, ActorId>) -> Self::State;

    async fn find_uid(&self, uid: &Uid, state: &mut Self::State) -> FindUidReply<Self::Actor>;

    async fn handle_call(&self, request: Vec<u8>, state: &mut Self::State) -> Result<Vec<u8>>;

    async fn handle_cast(&self, message: Vec<u8>, state: &mut Self::State);

    async fn handle_info(&self, message: Vec<u8>, state: &mut Self::State);

    async fn code_change(&self, old_vsn: &str, state: &mut Self::State, extra: Vec<u8>) -> Result<()>;

    async fn terminate(&self, reason: &str, state: Self::State);
}

/// A no-op UserCallbacks implementation for services with no custom hooks,
/// and for tests that only exercise placement/registration/election.
pub struct NoopCallbacks;

#[async_trait]
impl UserCallbacks for NoopCallbacks {
    type State = ();
    type Actor = ();

    async fn init(&self, _service_id: &ServiceId, _empty_map: &HashMap<Uid, ActorId>) -> Self::State {}

    async fn find_uid(&self, _uid: &Uid, _state: &mut Self::State) -> FindUidReply<Self::Actor> {
        FindUidReply::NotFound
    }

    async fn handle_call(&self, request: Vec<u8>, _state: &mut Self::State) -> Result<Vec<u8>> {
        Ok(request)
    }

    async fn handle_cast(&self, _message: Vec<u8>, _state: &mut Self::State) {}

    async fn handle_info(&self, _message: Vec<u8>, _state: &mut Self::State) {}

    async fn code_change(&self, _old_vsn: &str, _state: &mut Self::State, _extra: Vec<u8>) -> Result<()> {
        Ok(())
    }

    async fn terminate(&self, _reason: &str, _state: Self::State) {}
}
