//! PlannerTask and TaskList - the output of a completed planning round

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::trip::TripInfo;

/// Kind of booking work a task delegates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Airfare,
    Hotel,
    CarRental,
}

impl TaskType {
    /// Registry capability that handles this task type
    pub fn capability(&self) -> &'static str {
        match self {
            Self::Airfare => "air_tickets",
            Self::Hotel => "hotel_accommodation",
            Self::CarRental => "car_rental",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Airfare => "airfare",
            Self::Hotel => "hotel",
            Self::CarRental => "car_rental",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scheduling hints attached to a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetadata {
    /// Lower runs first; 1 is the highest priority
    pub priority: u8,
    pub estimated_minutes: u32,
}

/// One unit of delegated booking work
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerTask {
    pub id: String,
    pub task_type: TaskType,
    /// Capability name resolved through the agent registry
    pub capability: String,
    pub description: String,
    /// Natural-language request sent to the agent
    pub query: String,
    /// Ids of tasks that must succeed first
    pub depends_on: Vec<String>,
    pub metadata: TaskMetadata,
}

impl PlannerTask {
    pub fn priority(&self) -> u8 {
        self.metadata.priority
    }

    pub fn has_dependencies(&self) -> bool {
        !self.depends_on.is_empty()
    }
}

/// The full planning output
///
/// Built once when a round completes and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskList {
    pub trip_info: TripInfo,
    pub tasks: Vec<PlannerTask>,
    /// Audit trail of which generation rules fired
    pub reasoning: String,
    /// Critical-path estimate across dependency waves
    pub estimated_minutes: u32,
    pub created_at: DateTime<Utc>,
}

impl TaskList {
    pub fn task(&self, id: &str) -> Option<&PlannerTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn tasks_of_type(&self, task_type: TaskType) -> impl Iterator<Item = &PlannerTask> {
        self.tasks.iter().filter(move |t| t.task_type == task_type)
    }

    pub fn has_task_type(&self, task_type: TaskType) -> bool {
        self.tasks_of_type(task_type).next().is_some()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
