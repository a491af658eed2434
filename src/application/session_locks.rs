//! Per-session execution locks.
//!
//! Each session id maps to its own async mutex. Acquisition never waits: if
//! the session's lock is held, the caller is told immediately. Slots are
//! removed again when the last holder releases them, so the arena only holds
//! entries for sessions with work in flight.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::foundation::SessionId;

type Slot = Arc<Mutex<()>>;

/// Arena of per-session locks.
#[derive(Debug, Clone, Default)]
pub struct SessionLocks {
    slots: Arc<DashMap<SessionId, Slot>>,
}

/// Exclusive right to mutate one session. Released on drop.
#[derive(Debug)]
pub struct SessionGuard {
    session_id: SessionId,
    slots: Arc<DashMap<SessionId, Slot>>,
    _held: OwnedMutexGuard<()>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the session's lock, or returns `None` if it is already held.
    pub fn try_acquire(&self, session_id: SessionId) -> Option<SessionGuard> {
        let slot = self.slots.entry(session_id).or_default().clone();
        let held = slot.try_lock_owned().ok()?;
        Some(SessionGuard {
            session_id,
            slots: Arc::clone(&self.slots),
            _held: held,
        })
    }

    /// Returns true if a guard for this session is alive.
    pub fn is_held(&self, session_id: &SessionId) -> bool {
        self.slots
            .get(session_id)
            .map(|slot| slot.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Number of sessions with a live slot.
    pub fn active_count(&self) -> usize {
        self.slots.len()
    }
}

impl SessionGuard {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // map + this guard; anything more means someone else has a handle
        self.slots
            .remove_if(&self.session_id, |_, slot| Arc::strong_count(slot) <= 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_on_same_session_fails() {
        let locks = SessionLocks::new();
        let id = SessionId::new();

        let guard = locks.try_acquire(id);
        assert!(guard.is_some());
        assert!(locks.try_acquire(id).is_none());
        assert!(locks.is_held(&id));
    }

    #[test]
    fn different_sessions_do_not_block_each_other() {
        let locks = SessionLocks::new();
        let _a = locks.try_acquire(SessionId::new()).unwrap();
        let _b = locks.try_acquire(SessionId::new()).unwrap();
        assert_eq!(locks.active_count(), 2);
    }

    #[test]
    fn dropping_guard_releases_and_cleans_up() {
        let locks = SessionLocks::new();
        let id = SessionId::new();

        drop(locks.try_acquire(id).unwrap());

        assert!(!locks.is_held(&id));
        assert_eq!(locks.active_count(), 0);
        assert!(locks.try_acquire(id).is_some());
    }

    #[tokio::test]
    async fn guard_can_move_into_spawned_task() {
        let locks = SessionLocks::new();
        let id = SessionId::new();
        let guard = locks.try_acquire(id).unwrap();

        let handle = tokio::spawn(async move {
            assert_eq!(guard.session_id(), &id);
        });
        handle.await.unwrap();

        assert!(locks.try_acquire(id).is_some());
    }
}
