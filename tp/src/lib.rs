//! Trip planner - conversational travel planning with agent dispatch
//!
//! A user's free-form request is turned, over one or more turns, into a
//! validated [`domain::TripInfo`] and a dependency-ordered
//! [`domain::TaskList`], which the [`orchestrator::Orchestrator`] dispatches
//! to booking agents found through the [`registry`].
//!
//! Layers, leaves first:
//! - [`extract`]: utterance to structured trip update (model or keywords)
//! - [`planning`]: gap analysis, validation and the planning state machine
//! - [`graph`]: TaskList generation and DAG checks
//! - [`session`]: expiring per-session state and the turn endpoint
//! - [`registry`]: capability to agent endpoint resolution
//! - [`orchestrator`]: wave-by-wave dispatch and progress streaming

pub mod app;
pub mod chat;
pub mod cli;
pub mod config;
pub mod domain;
pub mod extract;
pub mod graph;
pub mod llm;
pub mod orchestrator;
pub mod planning;
pub mod registry;
pub mod session;

pub use config::Config;
pub use domain::{ConversationState, PlanResponse, PlannerTask, TaskList, TripInfo, TurnRequest};
pub use orchestrator::{Orchestrator, RoundReport};
pub use session::PlannerService;
