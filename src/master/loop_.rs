//! MasterLoop (C5): single-writer per-service coordinator (spec.md §4.5).
//!
//! One task per service, per node, owning [`MasterState`] and every other
//! leader-only component (ActorIndex, UidCache, PlacementReconciler). No
//! locks are needed on its internal maps — only the task itself ever
//! mutates them (spec.md §5), the same single-writer-actor shape the
//! teacher uses for `MembershipService`/`FailoverManager`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::actor::{ActorIndex, LivenessMonitor, UidCache};
use crate::config::MasterConfig;
use crate::election::{LeaderElector, NameRegistry, RegistryEvent, TickOutcome};
use crate::error::{ClusterError, Result};
use crate::ids::{ActorHost, ActorId, NodeId, ServiceId, Uid};
use crate::node::{InstanceStatus, NodeInfo, NodePartition, NodeService};
use crate::placement::{ConfigStore, PlacementReconciler, ServiceRuntime};

use super::callbacks::{FindUidReply, UserCallbacks};
use super::state::{MasterInfo, MasterState};

/// What `find_actor_by_uid` resolves to: either an ActorIndex hit, or
/// whatever the service's `find_uid` callback supplies on a miss.
#[derive(Debug, Clone)]
pub enum FindActorOutcome<A> {
    Indexed(ActorId),
    Custom(A),
}

pub enum MasterMessage<C: UserCallbacks> {
    GetInfo(oneshot::Sender<Result<MasterInfo>>),
    StopService(oneshot::Sender<Result<()>>),
    FindActorByName {
        class: String,
        name: String,
        reply: oneshot::Sender<Result<ActorId>>,
    },
    FindActorByUid {
        uid: Uid,
        reply: oneshot::Sender<Result<FindActorOutcome<C::Actor>>>,
    },
    RegisterActor {
        actor: ActorId,
        reply: oneshot::Sender<Result<NodeId>>,
    },
    NodeSetUpdate(HashMap<NodeId, NodeInfo>),
    InstanceStatusUpdate(InstanceStatus),
    RegisterFollower(NodeId),
    OtherIsLeader,
    CheckLeaderHint,
    Shutdown,
}

/// Handle to a running [`MasterLoop`]; cheap to clone, one per caller.
pub struct MasterHandle<C: UserCallbacks> {
    tx: mpsc::Sender<MasterMessage<C>>,
    shutdown: watch::Receiver<bool>,
}

impl<C: UserCallbacks> Clone for MasterHandle<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<C: UserCallbacks> MasterHandle<C> {
    pub async fn get_info(&self) -> Result<MasterInfo> {
        self.call(MasterMessage::GetInfo).await
    }

    pub async fn stop_service(&self) -> Result<()> {
        self.call(MasterMessage::StopService).await
    }

    pub async fn find_actor_by_name(
        &self,
        class: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<ActorId> {
        let (reply, rx) = oneshot::channel();
        self.send(MasterMessage::FindActorByName {
            class: class.into(),
            name: name.into(),
            reply,
        })
        .await?;
        Self::recv(rx).await
    }

    pub async fn find_actor_by_uid(&self, uid: Uid) -> Result<FindActorOutcome<C::Actor>> {
        let (reply, rx) = oneshot::channel();
        self.send(MasterMessage::FindActorByUid { uid, reply }).await?;
        Self::recv(rx).await
    }

    pub async fn register_actor(&self, actor: ActorId) -> Result<NodeId> {
        let (reply, rx) = oneshot::channel();
        self.send(MasterMessage::RegisterActor { actor, reply }).await?;
        Self::recv(rx).await
    }

    pub async fn node_set_update(&self, nodes: HashMap<NodeId, NodeInfo>) -> Result<()> {
        self.send(MasterMessage::NodeSetUpdate(nodes)).await
    }

    pub async fn instance_status(&self, status: InstanceStatus) -> Result<()> {
        self.send(MasterMessage::InstanceStatusUpdate(status)).await
    }

    pub async fn register_follower(&self, node: NodeId) -> Result<()> {
        self.send(MasterMessage::RegisterFollower(node)).await
    }

    pub async fn other_is_leader(&self) -> Result<()> {
        self.send(MasterMessage::OtherIsLeader).await
    }

    pub async fn check_leader_hint(&self) -> Result<()> {
        self.send(MasterMessage::CheckLeaderHint).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(MasterMessage::Shutdown).await
    }

    /// Resolves once the loop has exited (leader-demoted or shut down).
    pub async fn closed(&self) {
        let mut rx = self.shutdown.clone();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    async fn send(&self, msg: MasterMessage<C>) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| ClusterError::RpcError("master loop is no longer running".into()))
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> MasterMessage<C>,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        Self::recv(rx).await
    }

    async fn recv<T>(rx: oneshot::Receiver<Result<T>>) -> Result<T> {
        rx.await
            .map_err(|_| ClusterError::RpcError("master loop dropped its reply".into()))?
    }
}

/// The per-service, per-node coordinator task (spec.md §4.5).
pub struct MasterLoop<C: UserCallbacks> {
    service_id: ServiceId,
    local_node: NodeId,
    config: MasterConfig,
    state: MasterState,
    actor_index: ActorIndex,
    uid_cache: UidCache,
    elector: LeaderElector,
    reconciler: PlacementReconciler,
    runtime: Arc<dyn ServiceRuntime>,
    node_service: Arc<dyn NodeService>,
    callbacks: Arc<C>,
    user_state: Option<C::State>,
    requests: mpsc::Receiver<MasterMessage<C>>,
    actor_death_rx: mpsc::UnboundedReceiver<ActorHost>,
    shutdown_tx: watch::Sender<bool>,
    shutting_down: bool,
}

impl<C: UserCallbacks> MasterLoop<C> {
    /// Build and spawn the loop, returning a handle to it.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        service_id: ServiceId,
        local_node: NodeId,
        initial_version: impl Into<String>,
        registry: Arc<dyn NameRegistry>,
        leader_liveness: Arc<dyn LivenessMonitor>,
        actor_liveness: Arc<dyn LivenessMonitor>,
        runtime: Arc<dyn ServiceRuntime>,
        config_store: Arc<dyn ConfigStore>,
        node_service: Arc<dyn NodeService>,
        callbacks: Arc<C>,
        config: MasterConfig,
    ) -> MasterHandle<C> {
        let (tx, requests) = mpsc::channel(256);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (death_tx, actor_death_rx) = mpsc::unbounded_channel();

        let actor_index = ActorIndex::new(service_id.clone(), actor_liveness, death_tx);
        let uid_cache = UidCache::new();
        let elector = LeaderElector::new(service_id.clone(), local_node.clone(), registry, leader_liveness);
        let reconciler = PlacementReconciler::new(service_id.clone(), Arc::clone(&runtime), config_store);
        let state = MasterState::new(service_id.clone(), initial_version);

        let master_loop = MasterLoop {
            service_id,
            local_node,
            config,
            state,
            actor_index,
            uid_cache,
            elector,
            reconciler,
            runtime,
            node_service,
            callbacks,
            user_state: None,
            requests,
            actor_death_rx,
            shutdown_tx,
            shutting_down: false,
        };

        tokio::spawn(master_loop.run());

        MasterHandle {
            tx,
            shutdown: shutdown_rx,
        }
    }

    async fn run(mut self) {
        self.user_state = Some(self.callbacks.init(&self.service_id, &HashMap::new()).await);

        let mut tick = interval(self.config.election.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut registry_events = self.elector.subscribe_registry_events().await;
        let mut node_events = self.node_service.subscribe().await;

        info!(service = %self.service_id, node = %self.local_node, "master loop started");

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.run_tick().await;
                }
                Some(msg) = self.requests.recv() => {
                    self.handle_message(msg).await;
                }
                Some(host) = self.actor_death_rx.recv() => {
                    self.actor_index.remove_by_host(&host);
                    self.uid_cache.evict_host(&host);
                }
                _ = self.elector.death_notifications().recv() => {
                    self.run_tick().await;
                }
                Some(event) = registry_events.recv() => {
                    match event {
                        RegistryEvent::OtherIsLeader => self.step_down_and_exit("other_is_leader").await,
                        RegistryEvent::CheckLeaderHint => self.run_tick().await,
                        RegistryEvent::FollowerRegistered(node) => self.handle_register_follower(node),
                    }
                }
                Some(nodes) = node_events.recv() => {
                    self.handle_node_set_update(nodes).await;
                }
                else => break,
            }

            if self.shutting_down {
                break;
            }
        }

        info!(service = %self.service_id, node = %self.local_node, "master loop exited");
    }

    async fn handle_message(&mut self, msg: MasterMessage<C>) {
        match msg {
            MasterMessage::GetInfo(reply) => {
                let _ = reply.send(self.handle_get_info());
            }
            MasterMessage::StopService(reply) => {
                let _ = reply.send(self.handle_stop_service());
            }
            MasterMessage::FindActorByName { class, name, reply } => {
                let _ = reply.send(self.handle_find_by_name(&class, &name));
            }
            MasterMessage::FindActorByUid { uid, reply } => {
                let res = self.handle_find_by_uid(&uid).await;
                let _ = reply.send(res);
            }
            MasterMessage::RegisterActor { actor, reply } => {
                let _ = reply.send(self.handle_register(actor));
            }
            MasterMessage::NodeSetUpdate(nodes) => {
                self.handle_node_set_update(nodes).await;
            }
            MasterMessage::InstanceStatusUpdate(status) => {
                self.handle_instance_status(status).await;
            }
            MasterMessage::RegisterFollower(node) => {
                self.handle_register_follower(node);
            }
            MasterMessage::OtherIsLeader => {
                self.step_down_and_exit("other_is_leader").await;
            }
            MasterMessage::CheckLeaderHint => {
                self.run_tick().await;
            }
            MasterMessage::Shutdown => {
                self.step_down_and_exit("shutdown_requested").await;
            }
        }
    }

    fn require_leader(&self) -> Result<()> {
        if self.state.is_leader {
            Ok(())
        } else {
            Err(ClusterError::NotLeader(self.state.leader_node.clone()))
        }
    }

    fn handle_get_info(&self) -> Result<MasterInfo> {
        self.require_leader()?;
        Ok(MasterInfo::from(&self.state))
    }

    fn handle_stop_service(&self) -> Result<()> {
        self.require_leader()?;
        for node in self.state.nodes.keys().cloned() {
            let runtime = Arc::clone(&self.runtime);
            let service_id = self.service_id.clone();
            tokio::spawn(async move {
                if let Err(err) = runtime.stop(&node, &service_id).await {
                    warn!(%node, %err, "stop_service broadcast failed for node");
                }
            });
        }
        Ok(())
    }

    fn handle_find_by_name(&self, class: &str, name: &str) -> Result<ActorId> {
        self.require_leader()?;
        self.actor_index.find_by_name(&self.service_id, class, name)
    }

    async fn handle_find_by_uid(&mut self, uid: &Uid) -> Result<FindActorOutcome<C::Actor>> {
        self.require_leader()?;
        if let Ok(actor) = self.actor_index.find_by_uid(uid) {
            return Ok(FindActorOutcome::Indexed(actor));
        }
        let state = self
            .user_state
            .as_mut()
            .expect("user_state is present for the lifetime of the loop");
        match self.callbacks.find_uid(uid, state).await {
            FindUidReply::Found(actor) => Ok(FindActorOutcome::Custom(actor)),
            FindUidReply::NotFound => Err(ClusterError::ActorNotFound),
            FindUidReply::Stop => {
                warn!(service = %self.service_id, "find_uid callback requested stop");
                Err(ClusterError::ActorNotFound)
            }
        }
    }

    fn handle_register(&mut self, actor: ActorId) -> Result<NodeId> {
        self.require_leader()?;
        if actor.service != self.service_id {
            return Err(ClusterError::InvalidService {
                expected: self.service_id.clone(),
                got: actor.service,
            });
        }
        self.actor_index.register(actor.clone())?;
        self.uid_cache.insert(actor);
        Ok(self.local_node.clone())
    }

    async fn handle_node_set_update(&mut self, nodes: HashMap<NodeId, NodeInfo>) {
        self.state.nodes = nodes;
        if self.state.is_leader {
            self.reconcile().await;
        }
    }

    async fn handle_instance_status(&mut self, status: InstanceStatus) {
        if !self.state.is_leader {
            warn!(service = %self.service_id, node = %status.node, "instance_status received while follower, dropping");
            return;
        }
        self.state.instances.insert(status.node.clone(), status);
        self.reconcile().await;
    }

    fn handle_register_follower(&mut self, node: NodeId) {
        if !self.state.is_leader {
            warn!(service = %self.service_id, %node, "register_follower received while not leader, dropping");
            return;
        }
        self.state.followers.insert(node, Utc::now());
    }

    async fn reconcile(&mut self) {
        let partition = NodePartition::from_nodes(&self.state.nodes);
        self.reconciler
            .reconcile(&partition, &mut self.state.instances, &self.state.current_version)
            .await;
    }

    async fn run_tick(&mut self) {
        match self.elector.tick().await {
            TickOutcome::BecameLeader => {
                self.state.is_leader = true;
                self.state.leader_node = Some(self.local_node.clone());
                self.state.followers.clear();
                self.state.instances.clear();
                info!(service = %self.service_id, node = %self.local_node, "became leader");
            }
            TickOutcome::RemainedLeader => {}
            TickOutcome::RemainedFollower { leader } => {
                self.state.is_leader = false;
                self.state.leader_node = Some(leader);
            }
            TickOutcome::Watching { candidate } => {
                self.state.leader_node = Some(candidate);
            }
            TickOutcome::ClaimLost { winner } => {
                self.state.is_leader = false;
                self.state.leader_node = Some(winner);
            }
            TickOutcome::StepDown => {
                self.step_down_and_exit("registry_disagreement").await;
            }
        }
    }

    async fn step_down_and_exit(&mut self, reason: &str) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        self.state.is_leader = false;
        let _ = self.shutdown_tx.send(true);
        if let Some(state) = self.user_state.take() {
            self.callbacks.terminate(reason, state).await;
        }
        info!(service = %self.service_id, node = %self.local_node, reason, "master loop stepping down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::test_support::ManualLivenessMonitor;
    use crate::election::InMemoryNameRegistry;
    use crate::master::callbacks::NoopCallbacks;
    use crate::node::test_support::InMemoryNodeService;
    use crate::node::NodeStatus;
    use crate::placement::test_support::{RecordingRuntime, StaticConfigStore};
    use crate::placement::ServiceSpec;
    use std::time::Duration;

    fn spec() -> ServiceSpec {
        ServiceSpec {
            version_hash: "v1".to_string(),
            payload: vec![],
        }
    }

    fn spawn_loop(
        service: &str,
        node: &str,
    ) -> (
        MasterHandle<NoopCallbacks>,
        Arc<InMemoryNameRegistry>,
        Arc<ManualLivenessMonitor>,
        Arc<InMemoryNodeService>,
    ) {
        let registry = Arc::new(InMemoryNameRegistry::new());
        let leader_liveness = Arc::new(ManualLivenessMonitor::new());
        let actor_liveness = Arc::new(ManualLivenessMonitor::new());
        let runtime = Arc::new(RecordingRuntime::default());
        let config_store = Arc::new(StaticConfigStore(spec()));
        let node_service = Arc::new(InMemoryNodeService::new());

        let handle = MasterLoop::spawn(
            ServiceId::new(service),
            NodeId::new(node),
            "v1",
            registry.clone() as Arc<dyn NameRegistry>,
            leader_liveness.clone() as Arc<dyn LivenessMonitor>,
            actor_liveness.clone() as Arc<dyn LivenessMonitor>,
            runtime as Arc<dyn ServiceRuntime>,
            config_store,
            node_service.clone() as Arc<dyn NodeService>,
            Arc::new(NoopCallbacks),
            MasterConfig::default(),
        );
        (handle, registry, leader_liveness, node_service)
    }

    /// Spawn a node sharing `registry` with whatever else is already
    /// claiming the same service name, so two loops can race an election.
    fn spawn_peer(
        service: &str,
        node: &str,
        registry: Arc<InMemoryNameRegistry>,
    ) -> MasterHandle<NoopCallbacks> {
        let leader_liveness = Arc::new(ManualLivenessMonitor::new());
        let actor_liveness = Arc::new(ManualLivenessMonitor::new());
        let runtime = Arc::new(RecordingRuntime::default());
        let config_store = Arc::new(StaticConfigStore(spec()));

        MasterLoop::spawn(
            ServiceId::new(service),
            NodeId::new(node),
            "v1",
            registry as Arc<dyn NameRegistry>,
            leader_liveness as Arc<dyn LivenessMonitor>,
            actor_liveness as Arc<dyn LivenessMonitor>,
            runtime as Arc<dyn ServiceRuntime>,
            config_store,
            Arc::new(InMemoryNodeService::new()),
            Arc::new(NoopCallbacks),
            MasterConfig::default(),
        )
    }

    /// Give cross-task channel sends (registry event -> peer loop) a chance
    /// to be observed; paused-clock tests still need real task scheduling.
    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn s1_solo_node_becomes_leader() {
        let (handle, _registry, _liveness, _nodes) = spawn_loop("svc", "n1");

        tokio::time::advance(Duration::from_secs(6)).await;
        // Let the spawned task actually run its tick.
        tokio::task::yield_now().await;

        let info = handle.get_info().await.unwrap();
        assert!(info.is_leader);
        assert_eq!(info.leader_node, Some(NodeId::new("n1")));
        assert!(info.followers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn register_then_find_round_trips() {
        let (handle, _registry, _liveness, _nodes) = spawn_loop("svc", "n1");
        tokio::time::advance(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;

        let host = ActorHost::new(NodeId::new("n1"), "pid-7");
        let actor = ActorId::new(ServiceId::new("svc"), "worker", "w1", Uid::generate(), host);
        let leader = handle.register_actor(actor.clone()).await.unwrap();
        assert_eq!(leader, NodeId::new("n1"));

        let found = handle.find_actor_by_name("worker", "w1").await.unwrap();
        assert_eq!(found, actor);

        match handle.find_actor_by_uid(actor.uid.clone()).await.unwrap() {
            FindActorOutcome::Indexed(found) => assert_eq!(found, actor),
            FindActorOutcome::Custom(_) => panic!("expected index hit"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn follower_rejects_leader_only_requests() {
        let registry = Arc::new(InMemoryNameRegistry::new());
        // Pre-seed a leader so the second node starts as a follower.
        registry
            .claim(
                &crate::election::leader_name(&ServiceId::new("svc")),
                crate::election::Candidate::new(NodeId::new("n1"), Utc::now() - chrono::Duration::seconds(30)),
            )
            .await;

        let leader_liveness = Arc::new(ManualLivenessMonitor::new());
        let actor_liveness = Arc::new(ManualLivenessMonitor::new());
        let runtime = Arc::new(RecordingRuntime::default());
        let config_store = Arc::new(StaticConfigStore(spec()));

        let handle = MasterLoop::spawn(
            ServiceId::new("svc"),
            NodeId::new("n2"),
            "v1",
            registry as Arc<dyn NameRegistry>,
            leader_liveness as Arc<dyn LivenessMonitor>,
            actor_liveness as Arc<dyn LivenessMonitor>,
            runtime as Arc<dyn ServiceRuntime>,
            config_store,
            Arc::new(InMemoryNodeService::new()),
            Arc::new(NoopCallbacks),
            MasterConfig::default(),
        );

        tokio::time::advance(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;

        let err = handle.get_info().await.unwrap_err();
        assert_eq!(err, ClusterError::NotLeader(Some(NodeId::new("n1"))));
    }

    /// S2 (spec.md §8): a follower's repeated tick observing the same
    /// leader re-registers with it, and the leader's `followers` map is
    /// populated — across two real `MasterLoop`s sharing one registry, not
    /// by calling `register_follower` directly.
    #[tokio::test(start_paused = true)]
    async fn s2_follower_registers_with_the_real_leader() {
        let registry = Arc::new(InMemoryNameRegistry::new());
        let n1 = spawn_peer("svc", "n1", Arc::clone(&registry));
        let n2 = spawn_peer("svc", "n2", registry);

        // First tick: n1 claims the name (its Candidate was constructed
        // first, so it has the earlier start_time), n2 sees it and watches.
        tokio::time::advance(Duration::from_secs(6)).await;
        settle().await;
        assert!(n1.get_info().await.unwrap().is_leader);

        // Second tick: n2 sees the same believed leader again and registers
        // as a follower; the registry routes that to n1's subscription.
        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;

        let info = n1.get_info().await.unwrap();
        assert!(info.followers.contains(&NodeId::new("n2")));
    }

    fn node_map(status: NodeStatus) -> HashMap<NodeId, NodeInfo> {
        let mut m = HashMap::new();
        m.insert(NodeId::new("n1"), NodeInfo::new(status));
        m
    }

    #[tokio::test(start_paused = true)]
    async fn s5_leader_reconciles_on_node_set_update() {
        let (handle, _registry, _liveness, _nodes) = spawn_loop("svc", "n1");
        tokio::time::advance(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;
        assert!(handle.get_info().await.unwrap().is_leader);

        handle
            .node_set_update(node_map(NodeStatus::Normal))
            .await
            .unwrap();
        tokio::task::yield_now().await;

        let info = handle.get_info().await.unwrap();
        assert!(info.nodes.contains_key(&NodeId::new("n1")));
    }

    /// The real `NodeService` subscription path (spec.md §6 "Inputs received
    /// from NodeService"), not the manual `MasterHandle::node_set_update`
    /// override used above.
    #[tokio::test(start_paused = true)]
    async fn node_service_push_reaches_the_loop() {
        let (handle, _registry, _liveness, node_service) = spawn_loop("svc", "n1");
        tokio::time::advance(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;
        assert!(handle.get_info().await.unwrap().is_leader);

        node_service.publish(node_map(NodeStatus::Normal)).await;
        settle().await;

        let info = handle.get_info().await.unwrap();
        assert!(info.nodes.contains_key(&NodeId::new("n1")));
    }
}
