//! CachedResolver - TTL cache and bounded retry in front of any resolver

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use sessionstore::Clock;
use tracing::{debug, warn};

use super::resolver::{AgentEndpoint, AgentResolver, RegistryError};

#[derive(Debug, Clone)]
struct CachedEndpoint {
    endpoint: AgentEndpoint,
    resolved_at: DateTime<Utc>,
}

/// Wraps a resolver so repeated lookups of a capability reuse one answer
///
/// Only successful resolutions are cached; a miss is retried on the next
/// call. Each call makes at most `max_attempts` attempts against the inner
/// resolver.
pub struct CachedResolver {
    inner: Arc<dyn AgentResolver>,
    cache: DashMap<String, CachedEndpoint>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    max_attempts: u32,
    backoff: Duration,
}

impl CachedResolver {
    pub fn new(
        inner: Arc<dyn AgentResolver>,
        clock: Arc<dyn Clock>,
        ttl: chrono::Duration,
        max_attempts: u32,
        backoff: Duration,
    ) -> Self {
        debug!(
            inner = inner.name(),
            ttl_secs = ttl.num_seconds(),
            max_attempts,
            "CachedResolver::new: called"
        );
        Self {
            inner,
            cache: DashMap::new(),
            clock,
            ttl,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Forget a capability so the next lookup asks the inner resolver
    pub fn invalidate(&self, capability: &str) {
        self.cache.remove(capability);
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    fn cached(&self, capability: &str) -> Option<AgentEndpoint> {
        let now = self.clock.now();
        let hit = self.cache.get(capability).map(|entry| entry.value().clone())?;
        if now - hit.resolved_at < self.ttl {
            return Some(hit.endpoint);
        }
        debug!(%capability, "cached: entry expired");
        self.cache.remove(capability);
        None
    }

    fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff.saturating_mul(2u32.saturating_pow(attempt));
        let jitter_ms = rand::rng().random_range(0..=self.backoff.as_millis() as u64 / 2);
        base + Duration::from_millis(jitter_ms)
    }
}

#[async_trait]
impl AgentResolver for CachedResolver {
    async fn resolve(&self, capability: &str) -> Result<AgentEndpoint, RegistryError> {
        if let Some(endpoint) = self.cached(capability) {
            debug!(%capability, url = %endpoint.url, "CachedResolver::resolve: cache hit");
            return Ok(endpoint);
        }

        let mut attempt = 0;
        loop {
            match self.inner.resolve(capability).await {
                Ok(endpoint) => {
                    debug!(%capability, url = %endpoint.url, attempt, "CachedResolver::resolve: resolved");
                    self.cache.insert(
                        capability.to_string(),
                        CachedEndpoint {
                            endpoint: endpoint.clone(),
                            resolved_at: self.clock.now(),
                        },
                    );
                    return Ok(endpoint);
                }
                Err(e) if attempt + 1 < self.max_attempts => {
                    let delay = self.delay(attempt);
                    warn!(%capability, error = %e, attempt, delay_ms = delay.as_millis() as u64, "CachedResolver::resolve: retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(%capability, error = %e, attempts = attempt + 1, "CachedResolver::resolve: giving up");
                    return Err(e);
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "cached"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sessionstore::ManualClock;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Resolver that answers from a script and counts calls
    struct Scripted {
        replies: Mutex<Vec<Result<AgentEndpoint, RegistryError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(replies: Vec<Result<AgentEndpoint, RegistryError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AgentResolver for Scripted {
        async fn resolve(&self, capability: &str) -> Result<AgentEndpoint, RegistryError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let replies = self.replies.lock().unwrap();
            replies
                .get(n)
                .or_else(|| replies.last())
                .cloned()
                .unwrap_or_else(|| Err(RegistryError::AgentNotFound(capability.to_string())))
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn endpoint() -> AgentEndpoint {
        AgentEndpoint {
            capability: "air_tickets".to_string(),
            name: "air-agent".to_string(),
            url: "http://air.local".to_string(),
        }
    }

    fn unavailable() -> RegistryError {
        RegistryError::Unavailable {
            capability: "air_tickets".to_string(),
            reason: "connection refused".to_string(),
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap()))
    }

    #[tokio::test]
    async fn test_second_lookup_hits_cache() {
        let inner = Scripted::new(vec![Ok(endpoint())]);
        let resolver = CachedResolver::new(inner.clone(), clock(), chrono::Duration::minutes(5), 2, Duration::ZERO);

        assert_eq!(resolver.resolve("air_tickets").await.unwrap(), endpoint());
        assert_eq!(resolver.resolve("air_tickets").await.unwrap(), endpoint());
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refreshed() {
        let inner = Scripted::new(vec![Ok(endpoint())]);
        let clock = clock();
        let resolver = CachedResolver::new(inner.clone(), clock.clone(), chrono::Duration::minutes(5), 1, Duration::ZERO);

        resolver.resolve("air_tickets").await.unwrap();
        clock.advance(chrono::Duration::minutes(6));
        resolver.resolve("air_tickets").await.unwrap();

        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let inner = Scripted::new(vec![Err(unavailable()), Ok(endpoint())]);
        let resolver = CachedResolver::new(inner.clone(), clock(), chrono::Duration::minutes(5), 2, Duration::from_millis(1));

        assert_eq!(resolver.resolve("air_tickets").await.unwrap(), endpoint());
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let inner = Scripted::new(vec![Err(unavailable())]);
        let resolver = CachedResolver::new(inner.clone(), clock(), chrono::Duration::minutes(5), 2, Duration::ZERO);

        assert!(resolver.resolve("air_tickets").await.is_err());
        assert_eq!(inner.calls(), 2);
        assert_eq!(resolver.cached_len(), 0);

        assert!(resolver.resolve("air_tickets").await.is_err());
        assert_eq!(inner.calls(), 4);
    }

    #[tokio::test]
    async fn test_invalidate_forces_lookup() {
        let inner = Scripted::new(vec![Ok(endpoint())]);
        let resolver = CachedResolver::new(inner.clone(), clock(), chrono::Duration::minutes(5), 1, Duration::ZERO);

        resolver.resolve("air_tickets").await.unwrap();
        resolver.invalidate("air_tickets");
        resolver.resolve("air_tickets").await.unwrap();
        assert_eq!(inner.calls(), 2);
    }
}
