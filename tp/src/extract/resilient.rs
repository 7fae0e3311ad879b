//! ResilientExtractor - timeout, bounded retry and keyword fallback

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{ExtractionError, ExtractionInput, ExtractionOutcome, TripExtractor};
use crate::config::ExtractionConfig;

/// Wraps a primary extractor with the recovery policy
///
/// Each primary attempt is bounded by the configured timeout. Retryable
/// failures are retried up to `max-retries` times with exponential backoff;
/// once the primary is exhausted the fallback (if any) gets the turn.
pub struct ResilientExtractor {
    primary: Option<Arc<dyn TripExtractor>>,
    fallback: Option<Arc<dyn TripExtractor>>,
    config: ExtractionConfig,
}

impl ResilientExtractor {
    pub fn new(
        primary: Option<Arc<dyn TripExtractor>>,
        fallback: Option<Arc<dyn TripExtractor>>,
        config: ExtractionConfig,
    ) -> Self {
        let fallback = if config.keyword_fallback { fallback } else { None };
        Self {
            primary,
            fallback,
            config,
        }
    }

    /// Run the primary with timeout and retries
    async fn run_primary(
        &self,
        primary: &Arc<dyn TripExtractor>,
        input: &ExtractionInput,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let timeout = self.config.timeout();
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = last_error
                    .as_ref()
                    .and_then(ExtractionError::retry_after)
                    .unwrap_or_else(|| self.config.backoff(attempt - 1));
                warn!(
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    extractor = primary.name(),
                    "run_primary: retrying after transient error"
                );
                tokio::time::sleep(backoff).await;
            }

            let result = match tokio::time::timeout(timeout, primary.extract(input)).await {
                Ok(result) => result,
                Err(_) => Err(ExtractionError::Timeout(timeout)),
            };

            match result {
                Ok(outcome) => {
                    debug!(attempt, "run_primary: success");
                    return Ok(outcome);
                }
                Err(e) if e.is_retryable() => {
                    debug!(attempt, error = %e, "run_primary: retryable failure");
                    last_error = Some(e);
                }
                Err(e) => {
                    debug!(attempt, error = %e, "run_primary: permanent failure");
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or(ExtractionError::Timeout(timeout)))
    }
}

#[async_trait]
impl TripExtractor for ResilientExtractor {
    async fn extract(&self, input: &ExtractionInput) -> Result<ExtractionOutcome, ExtractionError> {
        debug!(
            has_primary = self.primary.is_some(),
            has_fallback = self.fallback.is_some(),
            "ResilientExtractor::extract: called"
        );

        let primary_error = match &self.primary {
            Some(primary) => match self.run_primary(primary, input).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => Some(e),
            },
            None => None,
        };

        match (&self.fallback, primary_error) {
            (Some(fallback), error) => {
                if let Some(e) = &error {
                    warn!(error = %e, fallback = fallback.name(), "extract: primary exhausted, falling back");
                }
                let outcome = fallback.extract(input).await?;
                info!(source = %outcome.source, "extract: fallback produced update");
                Ok(outcome)
            }
            (None, Some(e)) => Err(e),
            (None, None) => Err(ExtractionError::Unparsable("no extractor configured".to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "resilient"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ExtractionSource, KeywordExtractor, ModelExtractor, UPDATE_TRIP_INFO_TOOL};
    use crate::llm::client::mock::{MockLlmClient, MockReply};
    use chrono::NaiveDate;

    fn config() -> ExtractionConfig {
        ExtractionConfig {
            use_model: true,
            timeout_ms: 50,
            max_retries: 2,
            initial_backoff_ms: 1,
            keyword_fallback: true,
        }
    }

    fn input() -> ExtractionInput {
        ExtractionInput::standalone("I want to visit Paris", NaiveDate::from_ymd_opt(2024, 1, 10).unwrap())
    }

    fn keyword() -> Option<Arc<dyn TripExtractor>> {
        Some(Arc::new(KeywordExtractor::new().unwrap()))
    }

    fn model(llm: &Arc<MockLlmClient>) -> Option<Arc<dyn TripExtractor>> {
        Some(Arc::new(ModelExtractor::new(llm.clone(), 256)))
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let llm = Arc::new(MockLlmClient::new(vec![
            MockReply::Fail(503),
            MockReply::tool(UPDATE_TRIP_INFO_TOOL, serde_json::json!({ "destination": "Paris" })),
        ]));
        let extractor = ResilientExtractor::new(model(&llm), keyword(), config());

        let outcome = extractor.extract(&input()).await.unwrap();
        assert_eq!(outcome.source, ExtractionSource::Model);
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fall_back_to_keywords() {
        let llm = Arc::new(MockLlmClient::new(vec![
            MockReply::Fail(503),
            MockReply::Fail(502),
            MockReply::Fail(500),
            MockReply::Fail(500),
        ]));
        let extractor = ResilientExtractor::new(model(&llm), keyword(), config());

        let outcome = extractor.extract(&input()).await.unwrap();
        assert_eq!(outcome.source, ExtractionSource::Keyword);
        assert_eq!(outcome.update.destination.as_deref(), Some("Paris"));
        assert_eq!(llm.call_count(), 3, "one attempt plus max-retries");
    }

    #[tokio::test]
    async fn test_permanent_error_skips_retries() {
        let llm = Arc::new(MockLlmClient::new(vec![MockReply::Fail(401), MockReply::Fail(401)]));
        let extractor = ResilientExtractor::new(model(&llm), keyword(), config());

        let outcome = extractor.extract(&input()).await.unwrap();
        assert_eq!(outcome.source, ExtractionSource::Keyword);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_bounded() {
        let llm = Arc::new(MockLlmClient::new(vec![MockReply::Hang, MockReply::Hang, MockReply::Hang]));
        let extractor = ResilientExtractor::new(model(&llm), None, config());

        let started = std::time::Instant::now();
        let result = extractor.extract(&input()).await;
        assert!(matches!(result, Err(ExtractionError::Timeout(_))));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_fallback_disabled_by_config() {
        let llm = Arc::new(MockLlmClient::new(vec![MockReply::Fail(400)]));
        let config = ExtractionConfig {
            keyword_fallback: false,
            ..config()
        };
        let extractor = ResilientExtractor::new(model(&llm), keyword(), config);

        let result = extractor.extract(&input()).await;
        assert!(matches!(result, Err(ExtractionError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_keyword_only() {
        let extractor = ResilientExtractor::new(None, keyword(), config());
        let outcome = extractor.extract(&input()).await.unwrap();
        assert_eq!(outcome.source, ExtractionSource::Keyword);
    }
}
