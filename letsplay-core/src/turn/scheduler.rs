//! FIFO turn scheduling.
//!
//! One async loop owns the decision of who holds the controller. Users
//! queue with [`TurnScheduler::request_turn`]; the front of the queue
//! is granted a turn that lasts until the turn length elapses, the user
//! disconnects, or the scheduler shuts down, whichever comes first.
//!
//! ```text
//!            request_turn           grant                 expiry / disconnect
//!   Idle ─────────────────► Active ───────► (wait) ─────────────────────► Ending
//!    ▲                                                                      │
//!    └───────────────────────── queue empty ◄──────────────────────────────┘
//! ```
//!
//! The queue is guarded by a mutex paired with a [`Notify`]. Every wait
//! is bounded and re-checks its predicate after waking, so stray or
//! early notifications are harmless and none can be lost.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::session::broadcast::{Broadcaster, EmuId, Payload};
use crate::turn::registry::{User, UserId, UserRegistry};

#[derive(Debug, Default)]
struct TurnQueue {
    entries: VecDeque<UserId>,
    /// Front entry while its turn is running.
    active: Option<UserId>,
    /// The active holder disconnected before the turn ran out.
    ended_early: bool,
}

// ── TurnScheduler ────────────────────────────────────────────────

/// Serialises controller access among the users of one session.
pub struct TurnScheduler {
    emu: EmuId,
    turn_length: Duration,
    registry: Arc<UserRegistry>,
    broadcaster: Arc<dyn Broadcaster>,
    queue: Mutex<TurnQueue>,
    wake: Notify,
    shutdown: CancellationToken,
    users_connected: AtomicU64,
}

impl TurnScheduler {
    pub fn new(
        emu: EmuId,
        turn_length: Duration,
        registry: Arc<UserRegistry>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            emu,
            turn_length,
            registry,
            broadcaster,
            queue: Mutex::new(TurnQueue::default()),
            wake: Notify::new(),
            shutdown: CancellationToken::new(),
            users_connected: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TurnQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn turn_length(&self) -> Duration {
        self.turn_length
    }

    // ── Serving-layer operations ─────────────────────────────────

    /// Queue `id` for a turn. Never blocks on the turn itself.
    ///
    /// Returns `false` if the handle is stale or the user's request is
    /// still pending (queued or holding the turn).
    pub fn request_turn(&self, id: UserId) -> bool {
        let Some(user) = self.registry.get(id) else {
            debug!("turn request from unknown user {id}");
            return false;
        };

        {
            let mut queue = self.lock();
            if !user.try_request_turn() {
                return false;
            }
            queue.entries.push_back(id);
        }

        debug!("{} ({}) requested a turn", user.username(), user.uuid());
        self.wake.notify_one();
        true
    }

    /// A user left the session.
    ///
    /// If they hold the turn it ends early; if they are only queued they
    /// are dropped from the queue without reordering anyone else.
    pub fn user_disconnected(&self, id: UserId) {
        let _ = self
            .users_connected
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)));

        let mut queue = self.lock();
        if queue.active == Some(id) {
            queue.ended_early = true;
            if let Some(user) = self.registry.get(id) {
                user.set_has_turn(false);
            }
            drop(queue);
            self.wake.notify_one();
        } else {
            queue.entries.retain(|entry| *entry != id);
            if let Some(user) = self.registry.get(id) {
                user.set_requested_turn(false);
            }
        }
    }

    pub fn user_connected(&self, id: UserId) {
        let n = self.users_connected.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("user {id} connected to {} ({n} online)", self.emu);
    }

    // ── Introspection ────────────────────────────────────────────

    pub fn users_connected(&self) -> u64 {
        self.users_connected.load(Ordering::SeqCst)
    }

    /// Queued users, including the one currently playing.
    pub fn queue_len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn active_user(&self) -> Option<UserId> {
        self.lock().active
    }

    /// Place in line; `0` is the active (or next) player.
    pub fn position(&self, id: UserId) -> Option<usize> {
        self.lock().entries.iter().position(|entry| *entry == id)
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Ask the loop to exit. It stops before granting another turn.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.wake.notify_one();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// The scheduling loop. Spawn it once per session.
    pub async fn run(self: Arc<Self>) {
        info!("turn scheduler for {} started", self.emu);

        while !self.shutdown.is_cancelled() {
            let Some((id, user)) = self.begin_next_turn() else {
                tokio::select! {
                    _ = self.wake.notified() => {}
                    _ = self.shutdown.cancelled() => {}
                }
                continue;
            };

            let username = user.username().to_owned();
            info!("{}: {username} now has a turn", self.emu);
            self.announce(format!("{}: {username} now has a turn!", self.emu))
                .await;

            let deadline = Instant::now() + self.turn_length;
            let interrupted = self.wait_for_turn_end(id, &user, deadline).await;
            self.finish_turn(id);

            if interrupted {
                break;
            }

            info!("{}: {username}'s turn has ended", self.emu);
            self.announce(format!("{}: {username}'s turn has ended!", self.emu))
                .await;
        }

        info!("turn scheduler for {} stopped", self.emu);
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Grant the turn to the first queued user that still exists.
    /// Entries whose user vanished are dropped silently.
    fn begin_next_turn(&self) -> Option<(UserId, Arc<User>)> {
        let mut queue = self.lock();
        while let Some(&id) = queue.entries.front() {
            match self.registry.get(id) {
                Some(user) => {
                    user.set_has_turn(true);
                    queue.active = Some(id);
                    queue.ended_early = false;
                    return Some((id, user));
                }
                None => {
                    debug!("dropping stale turn request {id}");
                    queue.entries.pop_front();
                }
            }
        }
        None
    }

    /// Wait until the deadline, an early end, or shutdown.
    ///
    /// Returns `true` only when interrupted by shutdown.
    async fn wait_for_turn_end(&self, id: UserId, user: &User, deadline: Instant) -> bool {
        loop {
            if !self.still_holds_turn(id, user) {
                return false;
            }
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return true,
                _ = tokio::time::sleep_until(deadline) => return false,
                _ = self.wake.notified() => {}
            }
        }
    }

    fn still_holds_turn(&self, id: UserId, user: &User) -> bool {
        let queue = self.lock();
        queue.active == Some(id)
            && !queue.ended_early
            && user.has_turn()
            && self.registry.contains(id)
    }

    /// Clear turn state and pop the front entry. Safe to call once per
    /// turn regardless of how the turn ended.
    fn finish_turn(&self, id: UserId) {
        let mut queue = self.lock();
        if let Some(user) = self.registry.get(id) {
            user.set_has_turn(false);
            user.set_requested_turn(false);
        }
        if queue.entries.front() == Some(&id) {
            queue.entries.pop_front();
        }
        queue.active = None;
        queue.ended_early = false;
    }

    async fn announce(&self, text: String) {
        if let Err(e) = self.broadcaster.broadcast(&self.emu, Payload::Text(text)).await {
            warn!("turn notice for {} not delivered: {e}", self.emu);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
