//! Agent registry client
//!
//! Resolves a task's capability name to a callable agent endpoint. The
//! configured source (remote directory or static map) is always wrapped in a
//! [`CachedResolver`].

use std::sync::Arc;
use std::time::Duration;

use sessionstore::Clock;
use tracing::debug;

mod cache;
mod card;
mod directory;
mod resolver;

pub use cache::CachedResolver;
pub use card::{AgentCapabilities, AgentCard, AgentSkill};
pub use directory::DirectoryRegistry;
pub use resolver::{AgentEndpoint, AgentResolver, RegistryError, StaticRegistry};

use crate::config::RegistryConfig;

/// Build the resolver described by config
pub fn build_resolver(config: &RegistryConfig, clock: Arc<dyn Clock>) -> eyre::Result<Arc<dyn AgentResolver>> {
    debug!(directory_url = ?config.directory_url, static_agents = config.agents.len(), "build_resolver: called");
    let inner: Arc<dyn AgentResolver> = match &config.directory_url {
        Some(url) => Arc::new(DirectoryRegistry::new(url, Duration::from_millis(config.timeout_ms))?),
        None => Arc::new(StaticRegistry::new(config.agents.clone())),
    };

    Ok(Arc::new(CachedResolver::new(
        inner,
        clock,
        chrono::Duration::seconds(config.cache_ttl_secs as i64),
        config.max_attempts,
        Duration::from_millis(config.backoff_ms),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessionstore::SystemClock;

    #[tokio::test]
    async fn test_build_static_resolver() {
        let mut config = RegistryConfig {
            max_attempts: 1,
            ..Default::default()
        };
        config.agents.insert("air_tickets".to_string(), "http://air.local".to_string());

        let resolver = build_resolver(&config, Arc::new(SystemClock)).unwrap();
        assert_eq!(resolver.name(), "cached");
        assert_eq!(resolver.resolve("air_tickets").await.unwrap().url, "http://air.local");
        assert!(matches!(
            resolver.resolve("car_rental").await,
            Err(RegistryError::AgentNotFound(_))
        ));
    }
}
