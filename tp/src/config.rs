//! Trip planner configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main trip planner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Extraction retry/fallback policy
    pub extraction: ExtractionConfig,

    /// Conversation limits and session expiry
    pub conversation: ConversationConfig,

    /// Agent discovery
    pub registry: RegistryConfig,

    /// Task dispatch limits
    pub dispatch: DispatchConfig,

    /// This planner's own discovery document
    pub agent: AgentConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .tripplanner.yml
        let local_config = PathBuf::from(".tripplanner.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/tripplanner/tripplanner.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tripplanner").join("tripplanner.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Whether the model collaborator can be used (flag on and key present)
    pub fn model_available(&self) -> bool {
        self.extraction.use_model && std::env::var(&self.llm.api_key_env).is_ok()
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (currently only "anthropic" supported)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 2048,
            timeout_ms: 30_000,
        }
    }
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .map_err(|_| eyre::eyre!("LLM API key not found. Set the {} environment variable.", self.api_key_env))
    }
}

/// How the extractor calls the model and what it does when that fails
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Use the model collaborator at all (otherwise keyword extraction only)
    #[serde(rename = "use-model")]
    pub use_model: bool,

    /// Bound on a single model call in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Retries after the first failed model call
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// First retry delay; doubles each attempt
    #[serde(rename = "initial-backoff-ms")]
    pub initial_backoff_ms: u64,

    /// Fall back to the keyword extractor when the model keeps failing
    #[serde(rename = "keyword-fallback")]
    pub keyword_fallback: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            use_model: true,
            timeout_ms: 20_000,
            max_retries: 2,
            initial_backoff_ms: 250,
            keyword_fallback: true,
        }
    }
}

impl ExtractionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(2u64.saturating_pow(attempt)))
    }
}

/// Conversation limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Turns kept verbatim in the history buffer
    #[serde(rename = "history-max-turns")]
    pub history_max_turns: usize,

    /// Cap on the rolling summary of older turns
    #[serde(rename = "summary-max-chars")]
    pub summary_max_chars: usize,

    /// User turns allowed in one round before giving up
    #[serde(rename = "max-turns")]
    pub max_turns: u32,

    /// Inactivity window before a session expires
    #[serde(rename = "session-ttl-secs")]
    pub session_ttl_secs: u64,

    /// How often expired sessions and idle locks are swept
    #[serde(rename = "purge-interval-secs")]
    pub purge_interval_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_max_turns: 10,
            summary_max_chars: 600,
            max_turns: 12,
            session_ttl_secs: 24 * 60 * 60,
            purge_interval_secs: 300,
        }
    }
}

impl ConversationConfig {
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl_secs as i64)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs.max(1))
    }
}

/// Agent discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Remote agent directory; static `agents` are used when absent
    #[serde(rename = "directory-url")]
    pub directory_url: Option<String>,

    /// Static capability -> endpoint URL map
    pub agents: BTreeMap<String, String>,

    /// How long a resolved endpoint is reused
    #[serde(rename = "cache-ttl-secs")]
    pub cache_ttl_secs: u64,

    /// Resolution attempts before reporting a miss
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Delay between resolution attempts
    #[serde(rename = "backoff-ms")]
    pub backoff_ms: u64,

    /// Directory request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            directory_url: None,
            agents: BTreeMap::new(),
            cache_ttl_secs: 300,
            max_attempts: 2,
            backoff_ms: 100,
            timeout_ms: 10_000,
        }
    }
}

/// Task dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Bound on one agent call in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { timeout_ms: 60_000 }
    }
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Identity advertised in the planner's discovery document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    pub description: String,
    pub url: String,
    pub version: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "trip-planner".to_string(),
            description: "Plans trips through conversation and delegates bookings to specialist agents".to_string(),
            url: "http://localhost:10001".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.conversation.session_ttl_secs, 86_400);
        assert_eq!(config.conversation.max_turns, 12);
        assert_eq!(config.conversation.purge_interval(), Duration::from_secs(300));
        assert!(config.extraction.keyword_fallback);
        assert!(config.registry.directory_url.is_none());
    }

    #[test]
    fn test_backoff_doubles() {
        let config = ExtractionConfig {
            initial_backoff_ms: 100,
            ..Default::default()
        };
        assert_eq!(config.backoff(0), Duration::from_millis(100));
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(3), Duration::from_millis(800));
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
llm:
  model: claude-haiku
  api-key-env: MY_API_KEY
  timeout-ms: 5000

extraction:
  use-model: false
  max-retries: 4
  keyword-fallback: false

conversation:
  history-max-turns: 6
  max-turns: 8
  session-ttl-secs: 3600

registry:
  directory-url: http://directory.local
  agents:
    air_tickets: http://air.local
    hotel_accommodation: http://hotel.local
  cache-ttl-secs: 60

dispatch:
  timeout-ms: 1500
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.llm.model, "claude-haiku");
        assert_eq!(config.llm.api_key_env, "MY_API_KEY");
        assert!(!config.extraction.use_model);
        assert_eq!(config.extraction.max_retries, 4);
        assert!(!config.extraction.keyword_fallback);
        assert_eq!(config.conversation.history_max_turns, 6);
        assert_eq!(config.conversation.session_ttl(), chrono::Duration::hours(1));
        assert_eq!(config.registry.directory_url.as_deref(), Some("http://directory.local"));
        assert_eq!(config.registry.agents.get("air_tickets").unwrap(), "http://air.local");
        assert_eq!(config.dispatch.timeout(), Duration::from_millis(1500));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
conversation:
  max-turns: 3
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.conversation.max_turns, 3);

        // Defaults for unspecified
        assert_eq!(config.conversation.history_max_turns, 10);
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.registry.max_attempts, 2);
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("planner.yml");
        std::fs::write(&path, "agent:\n  name: test-planner\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.agent.name, "test-planner");
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/definitely/not/here.yml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
