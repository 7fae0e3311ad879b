//! Round results and progress events

use serde::{Deserialize, Serialize};

use crate::domain::{PlanResponse, TaskList};

/// Final status of one task in a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// What happened to one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    pub task_id: String,
    pub status: TaskStatus,
    /// Agent summary, failure reason or skip reason
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

impl TaskOutcome {
    pub fn succeeded(task_id: &str, agent: String, detail: String) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: TaskStatus::Succeeded,
            detail,
            agent: Some(agent),
        }
    }

    pub fn failed(task_id: &str, detail: String) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: TaskStatus::Failed,
            detail,
            agent: None,
        }
    }

    pub fn skipped(task_id: &str, detail: String) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: TaskStatus::Skipped,
            detail,
            agent: None,
        }
    }
}

/// Aggregated result of dispatching a TaskList
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundReport {
    pub task_list: TaskList,
    /// One outcome per task, in TaskList order
    pub outcomes: Vec<TaskOutcome>,
    /// The round stopped early on a cancel signal or closed progress stream
    pub cancelled: bool,
}

impl RoundReport {
    pub fn outcome(&self, task_id: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.task_id == task_id)
    }

    pub fn status_of(&self, task_id: &str) -> Option<TaskStatus> {
        self.outcome(task_id).map(|o| o.status)
    }

    fn with_status(&self, status: TaskStatus) -> Vec<&TaskOutcome> {
        self.outcomes.iter().filter(|o| o.status == status).collect()
    }

    pub fn succeeded(&self) -> Vec<&TaskOutcome> {
        self.with_status(TaskStatus::Succeeded)
    }

    pub fn failed(&self) -> Vec<&TaskOutcome> {
        self.with_status(TaskStatus::Failed)
    }

    pub fn skipped(&self) -> Vec<&TaskOutcome> {
        self.with_status(TaskStatus::Skipped)
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.status == TaskStatus::Succeeded)
    }
}

/// Streamed while a round runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    RoundStarted { task_count: usize, wave_count: usize },
    WaveStarted { wave: usize, task_ids: Vec<String> },
    TaskDispatched { task_id: String, capability: String },
    TaskSucceeded { task_id: String, agent: String, summary: String },
    TaskFailed { task_id: String, reason: String },
    TaskSkipped { task_id: String, reason: String },
    RoundFinished {
        succeeded: usize,
        failed: usize,
        skipped: usize,
        cancelled: bool,
    },
}

/// Planner response plus the dispatch round it triggered, if any
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnReply {
    pub response: PlanResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<RoundReport>,
}
