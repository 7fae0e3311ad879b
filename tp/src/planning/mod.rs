//! Planning - the conversation state machine
//!
//! ```text
//! utterance → extract → validate/merge → gap analysis ─┬─ missing → input_required
//!                                                      └─ complete → TaskGraphBuilder → completed
//! ```
//!
//! [`machine`] holds the transition table, [`gaps`] the fixed question
//! order, [`validate`] the sanity checks, and [`PlanningEngine`] ties them
//! together.

pub mod gaps;
pub mod machine;
pub mod validate;

mod engine;

pub use engine::{Persistence, PlanningEngine, TurnOutcome};
pub use gaps::{Question, analyze, next_question};
pub use machine::{Event, InvalidTransition, transition};
pub use validate::{Merge, ValidationError, merge};
