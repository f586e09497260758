//! Per-session concurrency control.
//!
//! Tool execution, respond, and end each read session state, perform
//! I/O, and write back. Serializing them per session keeps the
//! at-most-one-visit and at-most-one-resolution invariants without
//! holding the session map lock across I/O. Different sessions proceed
//! independently.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use porter_domain::error::{Error, Result};

/// Maps each session id to a `Semaphore(1)`; holding the permit grants
/// exclusive access to that session's multi-step operations.
pub struct SessionLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for SessionLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the lock for a session, waiting if another operation on
    /// the same session is in flight. The permit releases on drop.
    pub async fn acquire(&self, session_id: &str) -> Result<OwnedSemaphorePermit> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(session_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        sem.acquire_owned()
            .await
            .map_err(|_| Error::Other("session lock closed".into()))
    }

    /// Number of tracked sessions (for monitoring).
    pub fn session_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop lock entries nobody currently holds.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequential_access() {
        let map = SessionLockMap::new();
        let p1 = map.acquire("s1").await.unwrap();
        drop(p1);
        let p2 = map.acquire("s1").await.unwrap();
        drop(p2);
    }

    #[tokio::test]
    async fn different_sessions_do_not_block() {
        let map = SessionLockMap::new();
        let _p1 = map.acquire("s1").await.unwrap();
        let _p2 = map.acquire("s2").await.unwrap();
        assert_eq!(map.session_count(), 2);
    }

    #[tokio::test]
    async fn same_session_waits_for_release() {
        let map = Arc::new(SessionLockMap::new());
        let p1 = map.acquire("s1").await.unwrap();

        let map2 = Arc::clone(&map);
        let waiter = tokio::spawn(async move {
            let _p = map2.acquire("s1").await.unwrap();
            7
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drop(p1);
        assert_eq!(waiter.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let map = SessionLockMap::new();
        let _held = map.acquire("held").await.unwrap();
        let released = map.acquire("released").await.unwrap();
        drop(released);

        map.prune_idle();
        assert_eq!(map.session_count(), 1);
    }
}
