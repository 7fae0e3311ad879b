//! AgentResolver trait and the static implementation

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors from agent resolution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No agent is registered for the capability
    #[error("No agent found for capability '{0}'")]
    AgentNotFound(String),

    /// The directory could not be asked
    #[error("Agent directory unavailable for '{capability}': {reason}")]
    Unavailable { capability: String, reason: String },
}

impl RegistryError {
    pub fn capability(&self) -> &str {
        match self {
            Self::AgentNotFound(capability) | Self::Unavailable { capability, .. } => capability,
        }
    }
}

/// A callable agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEndpoint {
    pub capability: String,
    pub name: String,
    pub url: String,
}

/// Maps a capability name to an agent endpoint
#[async_trait]
pub trait AgentResolver: Send + Sync {
    async fn resolve(&self, capability: &str) -> Result<AgentEndpoint, RegistryError>;

    /// Resolver name for logs
    fn name(&self) -> &'static str;
}

/// Resolver backed by the configured capability -> URL map
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    agents: BTreeMap<String, String>,
}

impl StaticRegistry {
    pub fn new(agents: BTreeMap<String, String>) -> Self {
        debug!(agent_count = agents.len(), "StaticRegistry::new: called");
        Self { agents }
    }

    pub fn with_agent(mut self, capability: impl Into<String>, url: impl Into<String>) -> Self {
        self.agents.insert(capability.into(), url.into());
        self
    }
}

#[async_trait]
impl AgentResolver for StaticRegistry {
    async fn resolve(&self, capability: &str) -> Result<AgentEndpoint, RegistryError> {
        debug!(%capability, "StaticRegistry::resolve: called");
        self.agents
            .get(capability)
            .map(|url| AgentEndpoint {
                capability: capability.to_string(),
                name: format!("{}-agent", capability),
                url: url.clone(),
            })
            .ok_or_else(|| RegistryError::AgentNotFound(capability.to_string()))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_resolve() {
        let registry = StaticRegistry::default().with_agent("air_tickets", "http://air.local");

        let endpoint = registry.resolve("air_tickets").await.unwrap();
        assert_eq!(endpoint.url, "http://air.local");
        assert_eq!(endpoint.capability, "air_tickets");

        let err = registry.resolve("hotel_accommodation").await.unwrap_err();
        assert_eq!(err, RegistryError::AgentNotFound("hotel_accommodation".to_string()));
        assert_eq!(err.capability(), "hotel_accommodation");
    }
}
