//! Per-session turn serialization

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// One async lock per session id
///
/// A turn holds its session's guard from load to save, so two turns for the
/// same session never interleave. Different sessions never contend.
#[derive(Clone, Default)]
pub struct SessionLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a session
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        debug!(%session_id, "acquire: waiting for session lock");
        lock.lock_owned().await
    }

    /// Drop a session's lock if nobody holds or waits on it
    pub fn release(&self, session_id: &str) -> bool {
        self.locks
            .remove_if(session_id, |_, lock| Arc::strong_count(lock) == 1)
            .is_some()
    }

    /// Drop locks nobody holds or waits on; returns how many were dropped
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - self.locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
