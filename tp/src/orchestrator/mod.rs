//! Orchestrator: turns a completed TaskList into agent dispatches
//!
//! - [`Orchestrator`]: wave-by-wave dispatch with partial-failure semantics
//! - [`AgentDispatcher`] / [`HttpDispatcher`]: delivery of one task
//! - [`RoundReport`] / [`ProgressEvent`]: results and streamed progress

mod core;
mod dispatch;
mod report;

pub use self::core::{Orchestrator, OrchestratorError};
pub use dispatch::{AgentDispatcher, AgentReply, DispatchError, HttpDispatcher};
pub use report::{ProgressEvent, RoundReport, TaskOutcome, TaskStatus, TurnReply};
