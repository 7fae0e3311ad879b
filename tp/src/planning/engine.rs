//! PlanningEngine - one conversational step at a time
//!
//! The engine is pure with respect to storage: it takes a copy of the
//! session state, returns the updated copy and a [`Persistence`] directive,
//! and leaves reading and writing the store to the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sessionstore::Clock;
use tracing::{debug, error, info, warn};

use super::gaps::{self, Question};
use super::machine::{Event, transition};
use super::validate::{self, ValidationError};
use crate::config::ConversationConfig;
use crate::domain::{ConversationState, MachineState, PlanResponse, TaskList, TripInfo, Turn, TurnHistory};
use crate::extract::{ExtractionInput, TripExtractor};
use crate::graph::{GraphError, TaskGraphBuilder};

/// What the caller should do with the session after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Write `TurnOutcome::state`
    Save,
    /// Write `TurnOutcome::state`, which is the unchanged pre-turn snapshot
    Restore,
    /// Remove the session so the next turn starts fresh
    Discard,
}

/// Result of [`PlanningEngine::step`]
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub response: PlanResponse,
    pub state: ConversationState,
    pub persistence: Persistence,
}

/// Where an extraction left the trip
enum Assessment {
    NeedInput { question: String, field: Question },
    Ready(TaskList),
    Fault(GraphError),
}

/// The planning state machine driver
pub struct PlanningEngine {
    extractor: Arc<dyn TripExtractor>,
    builder: TaskGraphBuilder,
    clock: Arc<dyn Clock>,
    config: ConversationConfig,
}

impl PlanningEngine {
    pub fn new(
        extractor: Arc<dyn TripExtractor>,
        builder: TaskGraphBuilder,
        clock: Arc<dyn Clock>,
        config: ConversationConfig,
    ) -> Self {
        Self {
            extractor,
            builder,
            clock,
            config,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn new_history(&self) -> TurnHistory {
        TurnHistory::new(self.config.history_max_turns, self.config.summary_max_chars)
    }

    /// Fresh state for a session seen for the first time
    pub fn new_state(&self, session_id: impl Into<String>) -> ConversationState {
        ConversationState::new(session_id, self.new_history(), self.clock.now())
    }

    /// Process one utterance for a session
    pub async fn step(&self, state: ConversationState, utterance: &str) -> TurnOutcome {
        let now = self.clock.now();
        let previous = state.clone();
        let mut state = state;
        debug!(
            session_id = %state.session_id,
            machine = %state.machine,
            round = state.round,
            turn_count = state.turn_count,
            "step: called"
        );

        if state.machine.is_terminal() {
            match transition(state.machine, Event::NewRound) {
                Ok(next) => {
                    state.begin_new_round(self.new_history(), now);
                    state.machine = next;
                    info!(session_id = %state.session_id, round = state.round, "step: starting new planning round");
                }
                Err(e) => return self.fault(state, e.to_string()),
            }
        }

        state.turn_count += 1;
        state.touch(now);

        let input = ExtractionInput {
            previous: state.trip_info.clone(),
            utterance: utterance.to_string(),
            recent_turns: state.history.recent(),
            summary: state.history.summary().to_string(),
            today: now.date_naive(),
            pending_question: state.pending_question,
        };
        state.history.push(Turn::user(utterance));

        let outcome = match self.extractor.extract(&input).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(session_id = %state.session_id, error = %e, "step: extraction failed, restoring previous state");
                let reask = previous
                    .pending_question
                    .map(|f| format!(" {}", f.question()))
                    .unwrap_or_default();
                let mut restored = previous;
                restored.touch(now);
                let outcome = self.terminate(
                    state,
                    Event::ExtractionFailed,
                    format!("Sorry, I couldn't process that message ({}).{}", e, reask),
                    Persistence::Restore,
                );
                return TurnOutcome {
                    state: restored,
                    ..outcome
                };
            }
        };

        let merged = validate::merge(&state.trip_info, &outcome, now.date_naive());
        for change in &merged.changes {
            debug!(
                field = %change.field,
                confidence = change.confidence,
                valid = change.valid,
                source = %outcome.source,
                "step: field change"
            );
        }
        state.trip_info = merged.trip.clone();

        match self.assess(&state.trip_info, &merged.errors, now) {
            Assessment::NeedInput { .. } if state.turn_count > self.config.max_turns => {
                warn!(
                    session_id = %state.session_id,
                    turn_count = state.turn_count,
                    max_turns = self.config.max_turns,
                    "step: history exhausted without a complete trip"
                );
                self.terminate(
                    state,
                    Event::HistoryExhausted,
                    format!(
                        "We went {} turns without enough detail to plan the trip. Let's start over: where would you like to go?",
                        self.config.max_turns
                    ),
                    Persistence::Discard,
                )
            }
            Assessment::NeedInput { question, field } => {
                state.machine = match transition(state.machine, Event::StillMissing) {
                    Ok(next) => next,
                    Err(e) => return self.fault(state, e.to_string()),
                };
                state.pending_question = Some(field.field);
                state.history.push(Turn::assistant(question.clone()));
                debug!(session_id = %state.session_id, field = %field.field, "step: asking next question");
                TurnOutcome {
                    response: PlanResponse::InputRequired {
                        question,
                        trip_info_so_far: state.trip_info.clone(),
                        context_id: Some(state.session_id.clone()),
                    },
                    state,
                    persistence: Persistence::Save,
                }
            }
            Assessment::Ready(task_list) => {
                state.machine = match transition(state.machine, Event::AllRequiredPresent) {
                    Ok(next) => next,
                    Err(e) => return self.fault(state, e.to_string()),
                };
                state.pending_question = None;
                state.task_list = Some(task_list.clone());
                state
                    .history
                    .push(Turn::assistant(format!("Planned {} booking tasks.", task_list.len())));
                info!(
                    session_id = %state.session_id,
                    round = state.round,
                    task_count = task_list.len(),
                    "step: planning round complete"
                );
                TurnOutcome {
                    response: PlanResponse::Completed {
                        data: task_list,
                        context_id: Some(state.session_id.clone()),
                    },
                    state,
                    persistence: Persistence::Save,
                }
            }
            Assessment::Fault(e) => {
                error!(session_id = %state.session_id, error = %e, "step: task graph builder fault");
                self.terminate(
                    state,
                    Event::InternalFault,
                    format!("Internal planning fault: {}", e),
                    Persistence::Discard,
                )
            }
        }
    }

    /// Stateless single-shot planning
    pub async fn quick_plan(&self, utterance: &str) -> PlanResponse {
        let now = self.clock.now();
        debug!(utterance_len = utterance.len(), "quick_plan: called");
        let input = ExtractionInput::standalone(utterance, now.date_naive());

        let outcome = match self.extractor.extract(&input).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "quick_plan: extraction failed");
                return PlanResponse::Error {
                    message: format!("Sorry, I couldn't process that request ({}).", e),
                    context_id: None,
                };
            }
        };

        let merged = validate::merge(&TripInfo::default(), &outcome, now.date_naive());
        match self.assess(&merged.trip, &merged.errors, now) {
            Assessment::NeedInput { question, .. } => PlanResponse::InputRequired {
                question,
                trip_info_so_far: merged.trip,
                context_id: None,
            },
            Assessment::Ready(task_list) => PlanResponse::Completed {
                data: task_list,
                context_id: None,
            },
            Assessment::Fault(e) => {
                error!(error = %e, "quick_plan: task graph builder fault");
                PlanResponse::Error {
                    message: format!("Internal planning fault: {}", e),
                    context_id: None,
                }
            }
        }
    }

    fn assess(&self, trip: &TripInfo, errors: &[ValidationError], now: DateTime<Utc>) -> Assessment {
        let rejected: Vec<_> = errors.iter().map(ValidationError::field).collect();
        match gaps::next_question(trip, &rejected) {
            Some(field) => {
                let question = if errors.is_empty() {
                    field.text.to_string()
                } else {
                    let reasons: Vec<String> = errors.iter().map(|e| format!("{}.", e)).collect();
                    format!("{} {}", reasons.join(" "), field.text)
                };
                Assessment::NeedInput { question, field }
            }
            None => match self.builder.build(trip, now) {
                Ok(task_list) => Assessment::Ready(task_list),
                Err(e) => Assessment::Fault(e),
            },
        }
    }

    /// Move to `error` and answer with `message`
    fn terminate(
        &self,
        mut state: ConversationState,
        event: Event,
        message: String,
        persistence: Persistence,
    ) -> TurnOutcome {
        state.machine = transition(state.machine, event).unwrap_or(MachineState::Error);
        state.pending_question = None;
        TurnOutcome {
            response: PlanResponse::Error {
                message,
                context_id: Some(state.session_id.clone()),
            },
            state,
            persistence,
        }
    }

    /// An invariant broke inside the engine itself
    fn fault(&self, state: ConversationState, reason: String) -> TurnOutcome {
        error!(session_id = %state.session_id, %reason, "fault: engine invariant violated");
        self.terminate(
            state,
            Event::InternalFault,
            format!("Internal planning fault: {}", reason),
            Persistence::Discard,
        )
    }
}
