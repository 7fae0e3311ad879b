//! SessionStore - keyed session payloads with inactivity expiry

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::clock::Clock;
use crate::error::{StoreError, StoreResult};

/// A stored payload and its expiry bookkeeping
#[derive(Debug, Clone)]
struct Entry {
    payload: String,
    touched_at: DateTime<Utc>,
    ttl: Duration,
}

impl Entry {
    fn expires_at(&self) -> DateTime<Utc> {
        self.touched_at + self.ttl
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

/// Keyed store of JSON payloads
///
/// Every `put` resets the entry's inactivity window. Expired entries are
/// invisible to `get` and are evicted on access or by `purge_expired`.
pub struct SessionStore {
    entries: HashMap<String, Entry>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl SessionStore {
    /// Create an empty store
    pub fn new(clock: Arc<dyn Clock>, default_ttl: Duration) -> Self {
        debug!(default_ttl_secs = default_ttl.num_seconds(), "SessionStore::new: called");
        Self {
            entries: HashMap::new(),
            clock,
            default_ttl,
        }
    }

    /// The TTL applied by `put` when none is given
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Current time according to the injected clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Fetch the raw payload for a key, evicting it if expired
    pub fn get_raw(&mut self, key: &str) -> Option<String> {
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                debug!(%key, expired_at = %entry.expires_at(), "get_raw: entry expired, evicting");
                self.entries.remove(key);
                None
            }
            Some(entry) => Some(entry.payload.clone()),
            None => None,
        }
    }

    /// Store a raw payload with an explicit TTL
    pub fn put_raw(&mut self, key: &str, payload: String, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        debug!(%key, ttl_secs = ttl.num_seconds(), "put_raw: called");
        self.entries.insert(
            key.to_string(),
            Entry {
                payload,
                touched_at: self.clock.now(),
                ttl,
            },
        );
    }

    /// Fetch and deserialize a payload
    ///
    /// A payload that no longer deserializes is reported as `Corrupted`; the
    /// entry is left in place so the caller decides whether to discard it.
    pub fn get<T: DeserializeOwned>(&mut self, key: &str) -> StoreResult<Option<T>> {
        match self.get_raw(key) {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Corrupted {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Serialize and store a payload
    pub fn put<T: Serialize>(&mut self, key: &str, value: &T, ttl: Option<Duration>) -> StoreResult<()> {
        let raw = serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.put_raw(key, raw, ttl);
        Ok(())
    }

    /// Remove a key, returning whether anything was there
    pub fn remove(&mut self, key: &str) -> bool {
        debug!(%key, "remove: called");
        self.entries.remove(key).is_some()
    }

    /// Whether a live (unexpired) entry exists
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.entries.get(key).is_some_and(|e| !e.is_expired(now))
    }

    /// Evict every expired entry, returning how many were removed
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before - self.entries.len();
        debug!(purged, remaining = self.entries.len(), "purge_expired: done");
        purged
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries.values().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
