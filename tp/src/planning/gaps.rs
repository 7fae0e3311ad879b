//! Gap analysis - which fields are still missing, in asking order

use crate::domain::{TripField, TripInfo};

/// A queued clarifying question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub field: TripField,
    pub text: &'static str,
}

impl Question {
    pub fn for_field(field: TripField) -> Self {
        Self {
            field,
            text: field.question(),
        }
    }
}

/// Missing-field questions for `trip`, highest priority first
///
/// Empty when every blocking field is present and nothing was rejected this
/// turn. Otherwise every missing field is listed, so the caller surfaces the
/// first and the rest stay queued. Fields in `rejected` count as missing.
/// A missing return date is only queued when the departure date is known;
/// otherwise the departure question already asks for both.
pub fn analyze(trip: &TripInfo, rejected: &[TripField]) -> Vec<Question> {
    let missing = |field: TripField| -> bool {
        if rejected.contains(&field) {
            return true;
        }
        match field {
            TripField::DepartDate => trip.depart_date.is_none() && trip.return_date.is_none(),
            TripField::ReturnDate => trip.depart_date.is_some() && trip.return_date.is_none(),
            other => !trip.has(other),
        }
    };

    let blocked = !rejected.is_empty() || TripField::ALL.iter().any(|f| f.is_blocking() && missing(*f));
    if !blocked {
        return Vec::new();
    }

    // ALL is declared in priority-group order, so this is already sorted
    TripField::ALL
        .iter()
        .copied()
        .filter(|f| missing(*f))
        .map(Question::for_field)
        .collect()
}

/// The single question to surface this turn
pub fn next_question(trip: &TripInfo, rejected: &[TripField]) -> Option<Question> {
    analyze(trip, rejected).into_iter().next()
}
