//! Host service core logic.
//!
//! Boots one session with the built-in core, optionally drives a set of
//! demo users through the turn queue, and tears everything down when
//! stopped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use letsplay_core::turn::DEFAULT_PONG_TIMEOUT;
use letsplay_core::{
    Broadcaster, EmuId, SessionController, SessionError, SessionProxy, User, UserId, UserRegistry,
};

use crate::broadcast::LogBroadcaster;
use crate::config::HostConfig;
use crate::pattern::TestPatternCore;

// ── HostService ──────────────────────────────────────────────────

/// The top-level host service.
pub struct HostService {
    config: HostConfig,
    running: Arc<AtomicBool>,
    broadcaster: Arc<LogBroadcaster>,
}

impl HostService {
    /// Create a new host service with the given config.
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            broadcaster: Arc::new(LogBroadcaster::new()),
        }
    }

    /// Obtain a handle that can be used to stop the service from
    /// another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Traffic counters for this service's session.
    pub fn broadcaster(&self) -> &Arc<LogBroadcaster> {
        &self.broadcaster
    }

    /// Run the service until stopped.
    ///
    /// 1. Boots the session (core, scheduler, frame timer).
    /// 2. Registers the configured demo users and keeps them queueing.
    /// 3. Waits for `running` to become `false`.
    /// 4. Shuts the session down, then disconnects the demo users.
    pub async fn run(&self) -> Result<(), SessionError> {
        self.running.store(true, Ordering::SeqCst);

        let registry = Arc::new(UserRegistry::new());
        let broadcaster: Arc<dyn Broadcaster> = self.broadcaster.clone();
        let controller = SessionController::new(
            EmuId::from(self.config.game.emu_id.as_str()),
            self.config.session.clone(),
            Arc::clone(&registry),
            broadcaster,
        );

        let mut session = match controller
            .start(TestPatternCore::new(), self.config.game_source())
            .await
        {
            Ok(session) => session,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        let proxy = session.proxy();

        let demo = self.spawn_demo_users(&registry, &proxy);

        Self::wait_for_stop(&self.running).await;

        let demo_users = match demo {
            Some(task) => task.await?,
            None => Vec::new(),
        };
        session.shutdown().await?;

        for id in demo_users {
            proxy.user_disconnected(id);
            registry.remove(id);
        }

        info!(
            "{}: {} notices, {} frames ({} bytes) broadcast",
            session.emu_id(),
            self.broadcaster.notices(),
            self.broadcaster.frames(),
            self.broadcaster.frame_bytes()
        );
        self.running.store(false, Ordering::SeqCst);
        info!("host service stopped");
        Ok(())
    }

    /// Signal the service to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the service is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ── Internal ─────────────────────────────────────────────────

    fn spawn_demo_users(
        &self,
        registry: &Arc<UserRegistry>,
        proxy: &SessionProxy,
    ) -> Option<JoinHandle<Vec<UserId>>> {
        if self.config.demo.users == 0 {
            return None;
        }

        let ids: Vec<UserId> = (0..self.config.demo.users)
            .map(|i| {
                let id = registry.insert(User::new(format!("demo{}", i + 1)));
                proxy.user_connected(id);
                id
            })
            .collect();
        info!("registered {} demo users", ids.len());

        Some(tokio::spawn(drive_demo_users(
            proxy.clone(),
            Arc::clone(registry),
            ids,
            self.config.request_interval(),
            Arc::clone(&self.running),
        )))
    }

    /// Async helper: resolves when `running` becomes false.
    async fn wait_for_stop(running: &Arc<AtomicBool>) {
        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Keep every demo user alive and queued until the service stops.
/// Returns the users still registered.
async fn drive_demo_users(
    proxy: SessionProxy,
    registry: Arc<UserRegistry>,
    mut ids: Vec<UserId>,
    interval: Duration,
    running: Arc<AtomicBool>,
) -> Vec<UserId> {
    let mut ticker = tokio::time::interval(interval);

    while running.load(Ordering::SeqCst) {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = HostService::wait_for_stop(&running) => break,
        }

        for id in &ids {
            let Some(user) = registry.get(*id) else {
                continue;
            };
            user.touch();
            if !user.requested_turn() {
                proxy.add_turn_request(*id);
            }
        }

        for id in registry.stale_users(DEFAULT_PONG_TIMEOUT) {
            warn!("user {id} missed its heartbeat; disconnecting");
            proxy.user_disconnected(id);
            registry.remove(id);
        }
        ids.retain(|id| registry.contains(*id));

        let scheduler = proxy.scheduler();
        if let Some(user) = scheduler.active_user().and_then(|id| registry.get(id)) {
            debug!(
                "{} playing, {} queued, {} online",
                user.username(),
                scheduler.queue_len(),
                scheduler.users_connected()
            );
        }
    }

    ids
}

// ── Tests ────────────────────────────────────────────────────────
