//! Planning state machine
//!
//! The full transition table. Anything not listed is an invalid transition.
//!
//! ```text
//! gathering --StillMissing------------------------------> gathering
//! gathering --AllRequiredPresent------------------------> complete
//! gathering --ExtractionFailed|HistoryExhausted|Fault---> error
//! complete  --NewRound----------------------------------> gathering
//! error     --NewRound----------------------------------> gathering
//! ```

use thiserror::Error;

use crate::domain::MachineState;

/// What happened during a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Extraction worked but blocking fields are still missing
    StillMissing,
    /// Extraction worked and nothing blocking is missing
    AllRequiredPresent,
    /// Extraction failed after retries and fallback
    ExtractionFailed,
    /// Too many turns without reaching completeness
    HistoryExhausted,
    /// The task graph builder produced an invalid graph
    InternalFault,
    /// A new turn arrived on a finished round
    NewRound,
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Event::StillMissing => "still_missing",
            Event::AllRequiredPresent => "all_required_present",
            Event::ExtractionFailed => "extraction_failed",
            Event::HistoryExhausted => "history_exhausted",
            Event::InternalFault => "internal_fault",
            Event::NewRound => "new_round",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event} in state {from}")]
pub struct InvalidTransition {
    pub from: MachineState,
    pub event: Event,
}

/// Apply `event` to `from`
pub fn transition(from: MachineState, event: Event) -> Result<MachineState, InvalidTransition> {
    match (from, event) {
        (MachineState::Gathering, Event::StillMissing) => Ok(MachineState::Gathering),
        (MachineState::Gathering, Event::AllRequiredPresent) => Ok(MachineState::Complete),
        (MachineState::Gathering, Event::ExtractionFailed | Event::HistoryExhausted | Event::InternalFault) => {
            Ok(MachineState::Error)
        }
        (MachineState::Complete | MachineState::Error, Event::NewRound) => Ok(MachineState::Gathering),
        (from, event) => Err(InvalidTransition { from, event }),
    }
}
