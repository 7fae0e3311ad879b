//! ConversationState - everything the planner remembers about one session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use super::task::TaskList;
use super::trip::{TripField, TripInfo};

/// Planning machine state tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    /// Collecting trip facts
    #[default]
    Gathering,
    /// A TaskList was produced for this round
    Complete,
    /// The round failed and must restart
    Error,
}

impl MachineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gathering => write!(f, "gathering"),
            Self::Complete => write!(f, "complete"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Who said a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One utterance in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Capped turn buffer with a rolling summary of what fell off the front
///
/// Holds at most `max_turns` turns. Older turns are folded into `summary`,
/// which is itself kept to `max_summary_chars` by dropping its oldest text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnHistory {
    turns: VecDeque<Turn>,
    summary: String,
    /// Number of turns folded into the summary so far
    dropped: usize,
    max_turns: usize,
    max_summary_chars: usize,
}

impl TurnHistory {
    pub fn new(max_turns: usize, max_summary_chars: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            summary: String::new(),
            dropped: 0,
            max_turns: max_turns.max(1),
            max_summary_chars,
        }
    }

    /// Append a turn, folding the oldest into the summary when over capacity
    pub fn push(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.max_turns {
            if let Some(old) = self.turns.pop_front() {
                debug!(dropped = self.dropped + 1, "TurnHistory::push: folding oldest turn into summary");
                self.fold_into_summary(&old);
                self.dropped += 1;
            }
        }
    }

    fn fold_into_summary(&mut self, turn: &Turn) {
        let speaker = match turn.role {
            Role::User => "user",
            Role::Assistant => "planner",
        };
        if !self.summary.is_empty() {
            self.summary.push_str(" | ");
        }
        self.summary.push_str(&format!("{}: {}", speaker, turn.text.trim()));

        let len = self.summary.chars().count();
        if len > self.max_summary_chars {
            let skip = len - self.max_summary_chars;
            self.summary = self.summary.chars().skip(skip).collect();
        }
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn recent(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Per-session planning state
///
/// The store owns the authoritative copy. The planning engine receives a
/// clone, returns an updated clone, and the service decides what to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub session_id: String,
    /// Planning round; bumps when a completed session receives a new turn
    pub round: u32,
    pub trip_info: TripInfo,
    pub history: TurnHistory,
    pub machine: MachineState,
    /// User turns taken in the current round
    pub turn_count: u32,
    /// Field the last question asked about
    pub pending_question: Option<TripField>,
    /// Output of the round, once complete
    pub task_list: Option<TaskList>,
    pub created_at: DateTime<Utc>,
    pub last_touched: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(session_id: impl Into<String>, history: TurnHistory, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            round: 1,
            trip_info: TripInfo::default(),
            history,
            machine: MachineState::Gathering,
            turn_count: 0,
            pending_question: None,
            task_list: None,
            created_at: now,
            last_touched: now,
        }
    }

    /// Reset for a fresh round on the same session id
    pub fn begin_new_round(&mut self, history: TurnHistory, now: DateTime<Utc>) {
        debug!(session_id = %self.session_id, round = self.round + 1, "begin_new_round: called");
        self.round += 1;
        self.trip_info = TripInfo::default();
        self.history = history;
        self.machine = MachineState::Gathering;
        self.turn_count = 0;
        self.pending_question = None;
        self.task_list = None;
        self.last_touched = now;
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_touched = now;
    }
}
