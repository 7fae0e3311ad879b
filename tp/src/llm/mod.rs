//! LLM client module
//!
//! The model collaborator used by the extractor. Only the Anthropic
//! Messages API is supported.

use std::sync::Arc;

use tracing::debug;

mod anthropic;
pub mod client;
mod error;
mod types;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use error::LlmError;
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StopReason, TokenUsage, ToolCall, ToolDefinition};

use crate::config::LlmConfig;

/// Create an LLM client based on the provider specified in config
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicClient::from_config(config)?)),
        other => {
            debug!(provider = %other, "create_client: unknown provider");
            Err(LlmError::NotConfigured(format!(
                "Unknown LLM provider: '{}'. Supported: anthropic",
                other
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_rejected() {
        let config = LlmConfig {
            provider: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        let result = create_client(&config);
        assert!(matches!(result, Err(LlmError::NotConfigured(_))));
    }
}
