//! DirectoryRegistry - resolves capabilities through a remote agent directory

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::card::AgentCard;
use super::resolver::{AgentEndpoint, AgentResolver, RegistryError};

/// Asks `GET <base-url>/agents/<capability>` for an agent card
pub struct DirectoryRegistry {
    base_url: String,
    http: Client,
}

impl DirectoryRegistry {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        debug!(%base_url, timeout_ms = timeout.as_millis() as u64, "DirectoryRegistry::new: called");
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn unavailable(capability: &str, reason: impl ToString) -> RegistryError {
        RegistryError::Unavailable {
            capability: capability.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl AgentResolver for DirectoryRegistry {
    async fn resolve(&self, capability: &str) -> Result<AgentEndpoint, RegistryError> {
        let url = format!("{}/agents/{}", self.base_url, capability);
        debug!(%capability, %url, "DirectoryRegistry::resolve: called");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::unavailable(capability, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(%capability, "DirectoryRegistry::resolve: directory has no agent");
            return Err(RegistryError::AgentNotFound(capability.to_string()));
        }
        if !status.is_success() {
            warn!(%capability, %status, "DirectoryRegistry::resolve: directory error");
            return Err(Self::unavailable(capability, format!("directory returned {}", status)));
        }

        let card: AgentCard = response
            .json()
            .await
            .map_err(|e| Self::unavailable(capability, format!("malformed agent card: {}", e)))?;

        debug!(%capability, agent = %card.name, url = %card.url, "DirectoryRegistry::resolve: resolved");
        Ok(AgentEndpoint {
            capability: capability.to_string(),
            name: card.name,
            url: card.url,
        })
    }

    fn name(&self) -> &'static str {
        "directory"
    }
}
