//! LLM error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during LLM operations
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("LLM not configured: {0}")]
    NotConfigured(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::ApiError { status, .. } => matches!(status, 408 | 429 | 500..=599),
            LlmError::Network(_) => true,
            LlmError::Timeout(_) => true,
            LlmError::InvalidResponse(_) => false,
            LlmError::NotConfigured(_) => false,
            LlmError::Json(_) => false,
        }
    }

    /// Get the retry duration if this is a rate limit error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(
            LlmError::RateLimited {
                retry_after: Duration::from_secs(1)
            }
            .is_retryable()
        );

        // 5xx errors should be retryable
        assert!(
            LlmError::ApiError {
                status: 529,
                message: "Overloaded".to_string()
            }
            .is_retryable()
        );

        // 4xx errors should not be retryable
        assert!(
            !LlmError::ApiError {
                status: 401,
                message: "Unauthorized".to_string()
            }
            .is_retryable()
        );

        assert!(LlmError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(!LlmError::InvalidResponse("Bad JSON".to_string()).is_retryable());
        assert!(!LlmError::NotConfigured("no key".to_string()).is_retryable());
    }

    #[test]
    fn test_retry_after() {
        let err = LlmError::RateLimited {
            retry_after: Duration::from_secs(42),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(42)));
        assert_eq!(LlmError::Timeout(Duration::from_secs(1)).retry_after(), None);
    }
}
