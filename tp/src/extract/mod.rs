//! TripInfo extraction
//!
//! Turns one utterance plus what is already known into a [`TripUpdate`].
//! Three implementations:
//! - [`ModelExtractor`] asks the language model through an `update_trip_info` tool
//! - [`KeywordExtractor`] is a deterministic regex pass that never fails
//! - [`ResilientExtractor`] wraps a primary extractor with a timeout, bounded
//!   retries and the keyword fallback

mod keyword;
mod model;
mod resilient;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{TripField, TripInfo, TripUpdate, Turn};
use crate::llm::LlmError;

pub use keyword::KeywordExtractor;
pub use model::{ModelExtractor, UPDATE_TRIP_INFO_TOOL};
pub use resilient::ResilientExtractor;

/// Errors from a single extraction attempt
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Model unreachable: {0}")]
    Unreachable(#[from] LlmError),

    #[error("Unparsable extraction output: {0}")]
    Unparsable(String),

    #[error("Extraction timed out after {0:?}")]
    Timeout(Duration),
}

impl ExtractionError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ExtractionError::Unreachable(e) => e.is_retryable(),
            ExtractionError::Unparsable(_) => true,
            ExtractionError::Timeout(_) => true,
        }
    }

    /// Server-requested wait before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ExtractionError::Unreachable(e) => e.retry_after(),
            _ => None,
        }
    }
}

/// Everything an extractor may look at for one turn
#[derive(Debug, Clone)]
pub struct ExtractionInput {
    /// Facts known before this utterance
    pub previous: TripInfo,
    pub utterance: String,
    /// Recent turns, oldest first
    pub recent_turns: Vec<Turn>,
    /// Rolling summary of turns that fell out of the buffer
    pub summary: String,
    /// Reference date for resolving relative and year-less dates
    pub today: NaiveDate,
    /// Field the planner last asked about
    pub pending_question: Option<TripField>,
}

impl ExtractionInput {
    /// Input for a single self-contained utterance
    pub fn standalone(utterance: impl Into<String>, today: NaiveDate) -> Self {
        Self {
            previous: TripInfo::default(),
            utterance: utterance.into(),
            recent_turns: Vec::new(),
            summary: String::new(),
            today,
            pending_question: None,
        }
    }
}

/// Which path produced an extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionSource {
    Model,
    Keyword,
}

impl std::fmt::Display for ExtractionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Model => write!(f, "model"),
            Self::Keyword => write!(f, "keyword"),
        }
    }
}

/// Structured result of one extraction
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub update: TripUpdate,
    /// Confidence per stated field
    pub confidence: BTreeMap<TripField, f32>,
    pub source: ExtractionSource,
}

impl ExtractionOutcome {
    /// Build an outcome giving every stated field the same confidence
    pub fn uniform(update: TripUpdate, confidence: f32, source: ExtractionSource) -> Self {
        let confidence = update.stated_fields().into_iter().map(|f| (f, confidence)).collect();
        Self {
            update,
            confidence,
            source,
        }
    }

    pub fn confidence_for(&self, field: TripField) -> f32 {
        self.confidence.get(&field).copied().unwrap_or(0.0)
    }
}

/// Anything that can turn an utterance into a trip update
#[async_trait]
pub trait TripExtractor: Send + Sync {
    async fn extract(&self, input: &ExtractionInput) -> Result<ExtractionOutcome, ExtractionError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}
