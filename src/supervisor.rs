//! MasterSupervisor (C6, spec.md §4.6): one-for-one supervision of
//! per-service MasterLoops with a bounded restart intensity.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::config::SupervisorConfig;
use crate::master::{MasterHandle, UserCallbacks};

/// Sliding-window restart tracker. Bounds the *rate* of restarts, not the
/// lifetime total — a crash every twenty minutes never trips it, ten
/// crashes in one minute does (spec.md §4.6, §8).
pub struct RestartIntensity {
    max_restarts: u32,
    window: Duration,
    restarts: VecDeque<Instant>,
}

impl RestartIntensity {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            max_restarts: config.max_restarts,
            window: config.restart_window,
            restarts: VecDeque::new(),
        }
    }

    /// Record a restart attempt; returns whether it is still permitted
    /// under the sliding window.
    pub fn record(&mut self) -> bool {
        let now = Instant::now();
        while let Some(&front) = self.restarts.front() {
            if now.duration_since(front) > self.window {
                self.restarts.pop_front();
            } else {
                break;
            }
        }
        self.restarts.push_back(now);
        self.restarts.len() as u32 <= self.max_restarts
    }
}

/// Factory invoked to (re)spawn a service's MasterLoop. Synchronous because
/// [`crate::master::MasterLoop::spawn`] itself only sets up channels and
/// detaches the task; it never awaits.
pub type SpawnFn<C> = Arc<dyn Fn() -> MasterHandle<C> + Send + Sync>;

/// One-for-one supervisor: one watchdog task per configured service,
/// restarting its child on unexpected exit up to a bounded intensity
/// (spec.md §4.6). Transient leader loss is common and expected; repeated
/// crashes within the window indicate a real fault and the child is left
/// down.
pub struct MasterSupervisor<C: UserCallbacks> {
    config: SupervisorConfig,
    _marker: PhantomData<C>,
}

impl<C: UserCallbacks> MasterSupervisor<C> {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            _marker: PhantomData,
        }
    }

    /// Start supervising one service. Spawns the child immediately and a
    /// watchdog task that respawns it every time it exits, until the
    /// restart intensity is exceeded.
    pub fn start_child(&self, service: impl Into<String>, spawn: SpawnFn<C>) {
        let service = service.into();
        let config = self.config;
        tokio::spawn(async move {
            let mut intensity = RestartIntensity::new(config);
            loop {
                let handle = spawn();
                info!(%service, "child master loop started");
                handle.closed().await;
                warn!(%service, "child master loop exited, considering restart");

                if !intensity.record() {
                    error!(
                        %service,
                        max_restarts = config.max_restarts,
                        window_secs = config.restart_window.as_secs(),
                        "restart intensity exceeded, giving up on child"
                    );
                    break;
                }
            }
        });
    }
}
