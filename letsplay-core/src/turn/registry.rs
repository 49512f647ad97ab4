//! Connected users and generation-tagged handles to them.
//!
//! The serving layer owns the registry; the turn queue only stores
//! [`UserId`]s. Removing a user bumps its slot's generation, so any
//! handle still sitting in a queue resolves to `None` from then on and
//! can never observe a recycled slot's new occupant.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use uuid::Uuid;

/// Default heartbeat timeout before a silent user is dropped.
pub const DEFAULT_PONG_TIMEOUT: Duration = Duration::from_secs(10);

// ── UserId ───────────────────────────────────────────────────────

/// Stable handle to a registry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId {
    index: u32,
    generation: u32,
}

impl UserId {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

// ── User ─────────────────────────────────────────────────────────

/// A viewer connected to a session.
#[derive(Debug)]
pub struct User {
    uuid: Uuid,
    username: String,
    admin: bool,
    has_turn: AtomicBool,
    requested_turn: AtomicBool,
    last_pong: Mutex<Instant>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            username: username.into(),
            admin: false,
            has_turn: AtomicBool::new(false),
            requested_turn: AtomicBool::new(false),
            last_pong: Mutex::new(Instant::now()),
        }
    }

    /// Grant or revoke the admin flag.
    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    /// Random id assigned at construction. Unlike [`UserId`] it is
    /// never reused, so it is safe to show to other viewers.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn has_turn(&self) -> bool {
        self.has_turn.load(Ordering::SeqCst)
    }

    pub fn set_has_turn(&self, value: bool) {
        self.has_turn.store(value, Ordering::SeqCst);
    }

    pub fn requested_turn(&self) -> bool {
        self.requested_turn.load(Ordering::SeqCst)
    }

    pub fn set_requested_turn(&self, value: bool) {
        self.requested_turn.store(value, Ordering::SeqCst);
    }

    /// Atomically mark a turn as requested.
    ///
    /// Returns `false` if a request was already pending.
    pub fn try_request_turn(&self) -> bool {
        !self.requested_turn.swap(true, Ordering::SeqCst)
    }

    /// Record a heartbeat reply.
    pub fn touch(&self) {
        *self.last_pong.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Whether no heartbeat has arrived within `timeout`.
    pub fn should_disconnect(&self, timeout: Duration) -> bool {
        self.last_pong
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
            > timeout
    }
}

// ── UserRegistry ─────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    user: Option<Arc<User>>,
}

#[derive(Debug, Default)]
struct Slots {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

/// Arena of connected users addressed by [`UserId`].
#[derive(Debug, Default)]
pub struct UserRegistry {
    inner: Mutex<Slots>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a user, reusing a freed slot when one exists.
    pub fn insert(&self, user: User) -> UserId {
        let mut inner = self.lock();
        inner.live += 1;
        let user = Some(Arc::new(user));

        if let Some(index) = inner.free.pop() {
            let slot = &mut inner.slots[index as usize];
            slot.user = user;
            return UserId {
                index,
                generation: slot.generation,
            };
        }

        let index = inner.slots.len() as u32;
        inner.slots.push(Slot {
            generation: 0,
            user,
        });
        UserId {
            index,
            generation: 0,
        }
    }

    /// Resolve a handle. Stale handles resolve to `None`.
    pub fn get(&self, id: UserId) -> Option<Arc<User>> {
        let inner = self.lock();
        inner
            .slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.user.clone())
    }

    pub fn contains(&self, id: UserId) -> bool {
        self.get(id).is_some()
    }

    /// Remove a user and invalidate every outstanding handle to it.
    pub fn remove(&self, id: UserId) -> Option<Arc<User>> {
        let mut inner = self.lock();
        let slot = inner.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let user = slot.user.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        inner.free.push(id.index);
        inner.live -= 1;
        Some(user)
    }

    /// Number of live users.
    pub fn len(&self) -> usize {
        self.lock().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handles of users whose heartbeat is older than `timeout`.
    pub fn stale_users(&self, timeout: Duration) -> Vec<UserId> {
        let inner = self.lock();
        inner
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let user = slot.user.as_ref()?;
                user.should_disconnect(timeout).then_some(UserId {
                    index: index as u32,
                    generation: slot.generation,
                })
            })
            .collect()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let reg = UserRegistry::new();
        let id = reg.insert(User::new("alice").with_admin(true));
        let user = reg.get(id).unwrap();
        assert_eq!(user.username(), "alice");
        assert!(user.is_admin());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn removed_handle_goes_stale() {
        let reg = UserRegistry::new();
        let id = reg.insert(User::new("alice"));
        assert!(reg.remove(id).is_some());
        assert!(reg.get(id).is_none());
        assert!(reg.remove(id).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn recycled_slot_does_not_alias_old_handle() {
        let reg = UserRegistry::new();
        let old = reg.insert(User::new("alice"));
        reg.remove(old);
        let new = reg.insert(User::new("bob"));

        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert!(reg.get(old).is_none());
        assert_eq!(reg.get(new).unwrap().username(), "bob");
    }

    #[test]
    fn uuid_is_stable_and_unique() {
        let reg = UserRegistry::new();
        let old = reg.insert(User::new("alice"));
        let alice = reg.get(old).unwrap().uuid();
        assert_eq!(reg.get(old).unwrap().uuid(), alice);
        assert_eq!(alice.get_version_num(), 4);

        // Same slot, same name, different person.
        reg.remove(old);
        let new = reg.insert(User::new("alice"));
        assert_ne!(reg.get(new).unwrap().uuid(), alice);
    }

    #[test]
    fn turn_request_is_exclusive() {
        let user = User::new("alice");
        assert!(user.try_request_turn());
        assert!(!user.try_request_turn());
        user.set_requested_turn(false);
        assert!(user.try_request_turn());
    }

    #[test]
    fn heartbeat_timeout() {
        let reg = UserRegistry::new();
        let id = reg.insert(User::new("alice"));
        assert!(reg.stale_users(Duration::from_secs(60)).is_empty());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(reg.stale_users(Duration::ZERO), vec![id]);

        let user = reg.get(id).unwrap();
        user.touch();
        assert!(!user.should_disconnect(DEFAULT_PONG_TIMEOUT));
    }

    #[test]
    fn display_includes_generation() {
        let reg = UserRegistry::new();
        let id = reg.insert(User::new("alice"));
        assert_eq!(id.to_string(), "0v0");
    }
}
