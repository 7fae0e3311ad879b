//! Request and response shapes for the planning endpoints

use serde::{Deserialize, Serialize};

use super::task::TaskList;
use super::trip::TripInfo;

/// A conversational turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub query: String,
    /// Session to continue; a new one is generated when absent
    #[serde(default, alias = "context_id", skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
}

impl TurnRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            context_id: None,
        }
    }

    pub fn with_context(query: impl Into<String>, context_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            context_id: Some(context_id.into()),
        }
    }
}

/// A stateless single-shot planning request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuickPlanRequest {
    pub query: String,
}

/// Outcome of one planning step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlanResponse {
    /// More information is needed before tasks can be generated
    InputRequired {
        question: String,
        #[serde(rename = "tripInfoSoFar")]
        trip_info_so_far: TripInfo,
        #[serde(rename = "contextId", default, skip_serializing_if = "Option::is_none")]
        context_id: Option<String>,
    },
    /// Planning finished
    Completed {
        data: TaskList,
        #[serde(rename = "contextId", default, skip_serializing_if = "Option::is_none")]
        context_id: Option<String>,
    },
    /// The round failed; the session can be retried
    Error {
        message: String,
        #[serde(rename = "contextId", default, skip_serializing_if = "Option::is_none")]
        context_id: Option<String>,
    },
}

impl PlanResponse {
    pub fn status(&self) -> &'static str {
        match self {
            Self::InputRequired { .. } => "input_required",
            Self::Completed { .. } => "completed",
            Self::Error { .. } => "error",
        }
    }

    pub fn context_id(&self) -> Option<&str> {
        match self {
            Self::InputRequired { context_id, .. } | Self::Completed { context_id, .. } | Self::Error { context_id, .. } => {
                context_id.as_deref()
            }
        }
    }

    /// Attach the session id the response belongs to
    pub fn with_context_id(mut self, id: Option<String>) -> Self {
        match &mut self {
            Self::InputRequired { context_id, .. } | Self::Completed { context_id, .. } | Self::Error { context_id, .. } => {
                *context_id = id;
            }
        }
        self
    }

    pub fn question(&self) -> Option<&str> {
        match self {
            Self::InputRequired { question, .. } => Some(question),
            _ => None,
        }
    }

    pub fn task_list(&self) -> Option<&TaskList> {
        match self {
            Self::Completed { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}
