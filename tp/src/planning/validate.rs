//! Field validation and merging
//!
//! Extracted values are sanity-checked before they touch the TripInfo. A
//! rejected value leaves the previous value in place and its question is
//! re-queued for this turn.

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{FieldChange, TripField, TripInfo};
use crate::extract::ExtractionOutcome;

/// Largest party the planner books for
pub const MAX_TRAVELERS: u32 = 50;

/// Why an extracted value was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("A trip needs between 1 and {max} travelers, not {got}")]
    Travelers { got: u32, max: u32 },

    #[error("The return date {ret} is before the departure date {depart}")]
    ReturnBeforeDeparture {
        field: TripField,
        depart: NaiveDate,
        ret: NaiveDate,
    },

    #[error("{date} has already passed")]
    DateInPast { field: TripField, date: NaiveDate },

    #[error("The origin and destination are both {place}")]
    SameOriginAndDestination { field: TripField, place: String },

    #[error("A budget has to be more than zero")]
    ZeroBudget,

    #[error("Hotel class has to be between 1 and 5 stars, not {0}")]
    HotelClass(u8),
}

impl ValidationError {
    /// The field whose value was refused
    pub fn field(&self) -> TripField {
        match self {
            ValidationError::Travelers { .. } => TripField::Travelers,
            ValidationError::ReturnBeforeDeparture { field, .. } => *field,
            ValidationError::DateInPast { field, .. } => *field,
            ValidationError::SameOriginAndDestination { field, .. } => *field,
            ValidationError::ZeroBudget => TripField::Budget,
            ValidationError::HotelClass(_) => TripField::HotelClass,
        }
    }
}

/// Result of folding one extraction into the known facts
#[derive(Debug, Clone)]
pub struct Merge {
    pub trip: TripInfo,
    pub changes: Vec<FieldChange>,
    pub errors: Vec<ValidationError>,
}

impl Merge {
    pub fn rejected(&self) -> Vec<TripField> {
        self.errors.iter().map(ValidationError::field).collect()
    }
}

/// Apply every stated field of `outcome` to `previous`, keeping only values that validate
pub fn merge(previous: &TripInfo, outcome: &ExtractionOutcome, today: NaiveDate) -> Merge {
    debug!(stated = ?outcome.update.stated_fields(), %today, "merge: called");
    let update = &outcome.update;
    let stated = update.stated_fields();

    let mut candidate = previous.clone();
    if let Some(v) = &update.origin {
        candidate.origin = Some(v.clone());
    }
    if let Some(v) = &update.destination {
        candidate.destination = Some(v.clone());
    }
    if let Some(v) = update.depart_date {
        candidate.depart_date = Some(v);
    }
    if let Some(v) = update.return_date {
        candidate.return_date = Some(v);
    }
    if let Some(v) = update.travelers {
        candidate.travelers = Some(v);
    }
    if let Some(v) = update.trip_type {
        candidate.trip_type = Some(v);
    }
    if let Some(v) = &update.budget {
        candidate.budget = Some(v.clone());
    }
    if let Some(v) = update.hotel_class {
        candidate.hotel_class = Some(v);
    }
    if let Some(v) = update.car_rental {
        candidate.car_rental = Some(v);
    }

    let mut errors = check(&candidate, &stated, today);

    let mut trip = candidate;
    for error in &errors {
        warn!(field = %error.field(), error = %error, "merge: value rejected");
        revert(&mut trip, previous, error.field());
    }

    // Date order is checked on the dates that survive the per-field reverts
    while let Some(error) = check_order(&trip, &stated, &errors) {
        warn!(field = %error.field(), error = %error, "merge: value rejected");
        revert(&mut trip, previous, error.field());
        errors.push(error);
    }

    let changes = stated
        .iter()
        .map(|field| {
            let error = errors.iter().find(|e| e.field() == *field);
            FieldChange {
                field: *field,
                confidence: outcome.confidence_for(*field),
                valid: error.is_none(),
                reason: error.map(|e| e.to_string()),
            }
        })
        .collect();

    Merge { trip, changes, errors }
}

/// Validate the stated fields of `candidate`
fn check(candidate: &TripInfo, stated: &[TripField], today: NaiveDate) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let is_stated = |f: TripField| stated.contains(&f);

    if is_stated(TripField::Destination) || is_stated(TripField::Origin) {
        if let (Some(origin), Some(destination)) = (&candidate.origin, &candidate.destination)
            && origin.trim().eq_ignore_ascii_case(destination.trim())
        {
            let field = if is_stated(TripField::Destination) {
                TripField::Destination
            } else {
                TripField::Origin
            };
            errors.push(ValidationError::SameOriginAndDestination {
                field,
                place: destination.clone(),
            });
        }
    }

    if is_stated(TripField::DepartDate)
        && let Some(date) = candidate.depart_date
        && date < today
    {
        errors.push(ValidationError::DateInPast {
            field: TripField::DepartDate,
            date,
        });
    }

    if is_stated(TripField::ReturnDate)
        && let Some(date) = candidate.return_date
        && date < today
    {
        errors.push(ValidationError::DateInPast {
            field: TripField::ReturnDate,
            date,
        });
    }

    if is_stated(TripField::Travelers)
        && let Some(got) = candidate.travelers
        && !(1..=MAX_TRAVELERS).contains(&got)
    {
        errors.push(ValidationError::Travelers {
            got,
            max: MAX_TRAVELERS,
        });
    }

    if is_stated(TripField::Budget)
        && let Some(budget) = &candidate.budget
        && budget.amount == 0
    {
        errors.push(ValidationError::ZeroBudget);
    }

    if is_stated(TripField::HotelClass)
        && let Some(class) = candidate.hotel_class
        && !(1..=5).contains(&class)
    {
        errors.push(ValidationError::HotelClass(class));
    }

    errors
}

/// A return before departure in `trip`, blamed on a stated date not yet rejected
///
/// The return date is blamed first. Reverting both dates restores the
/// previous pair, so at most two rounds are needed.
fn check_order(trip: &TripInfo, stated: &[TripField], errors: &[ValidationError]) -> Option<ValidationError> {
    let (Some(depart), Some(ret)) = (trip.depart_date, trip.return_date) else {
        return None;
    };
    if ret >= depart {
        return None;
    }

    let blamable = |f: TripField| stated.contains(&f) && !errors.iter().any(|e| e.field() == f);
    let field = [TripField::ReturnDate, TripField::DepartDate]
        .into_iter()
        .find(|f| blamable(*f))?;
    Some(ValidationError::ReturnBeforeDeparture { field, depart, ret })
}

fn revert(trip: &mut TripInfo, previous: &TripInfo, field: TripField) {
    match field {
        TripField::Origin => trip.origin = previous.origin.clone(),
        TripField::Destination => trip.destination = previous.destination.clone(),
        TripField::DepartDate => trip.depart_date = previous.depart_date,
        TripField::ReturnDate => trip.return_date = previous.return_date,
        TripField::Travelers => trip.travelers = previous.travelers,
        TripField::Budget => trip.budget = previous.budget.clone(),
        TripField::TripType => trip.trip_type = previous.trip_type,
        TripField::HotelClass => trip.hotel_class = previous.hotel_class,
        TripField::CarRental => trip.car_rental = previous.car_rental,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Budget, TripUpdate};
    use crate::extract::ExtractionSource;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn outcome(update: TripUpdate) -> ExtractionOutcome {
        ExtractionOutcome::uniform(update, 0.8, ExtractionSource::Model)
    }

    #[test]
    fn test_valid_values_merge() {
        let previous = TripInfo {
            destination: Some("Paris".to_string()),
            ..Default::default()
        };
        let merged = merge(
            &previous,
            &outcome(TripUpdate {
                origin: Some("New York".to_string()),
                depart_date: Some(date(3, 15)),
                return_date: Some(date(3, 22)),
                ..Default::default()
            }),
            today(),
        );

        assert!(merged.errors.is_empty());
        assert_eq!(merged.trip.destination.as_deref(), Some("Paris"));
        assert_eq!(merged.trip.origin.as_deref(), Some("New York"));
        assert_eq!(merged.changes.len(), 3);
        assert!(merged.changes.iter().all(|c| c.valid && c.confidence == 0.8));
    }

    #[test]
    fn test_unstated_fields_never_cleared() {
        let previous = TripInfo {
            origin: Some("Boston".to_string()),
            travelers: Some(2),
            ..Default::default()
        };
        let merged = merge(&previous, &outcome(TripUpdate::default()), today());
        assert_eq!(merged.trip, previous);
        assert!(merged.changes.is_empty());
    }

    #[test]
    fn test_return_before_departure_rejected() {
        let previous = TripInfo {
            depart_date: Some(date(3, 15)),
            ..Default::default()
        };
        let merged = merge(
            &previous,
            &outcome(TripUpdate {
                return_date: Some(date(3, 10)),
                ..Default::default()
            }),
            today(),
        );

        assert_eq!(merged.rejected(), vec![TripField::ReturnDate]);
        assert_eq!(merged.trip.return_date, None);
        assert_eq!(merged.trip.depart_date, Some(date(3, 15)));
        assert!(!merged.changes[0].valid);
        assert!(merged.changes[0].reason.as_ref().unwrap().contains("before the departure"));
    }

    #[test]
    fn test_return_checked_against_kept_departure() {
        let previous = TripInfo {
            depart_date: Some(date(3, 15)),
            ..Default::default()
        };
        let merged = merge(
            &previous,
            &outcome(TripUpdate {
                depart_date: NaiveDate::from_ymd_opt(2023, 12, 1),
                return_date: Some(date(3, 10)),
                ..Default::default()
            }),
            today(),
        );

        assert_eq!(merged.rejected(), vec![TripField::DepartDate, TripField::ReturnDate]);
        assert_eq!(merged.trip.depart_date, Some(date(3, 15)));
        assert_eq!(merged.trip.return_date, None);
        assert!(matches!(
            merged.errors[1],
            ValidationError::ReturnBeforeDeparture { ret, .. } if ret == date(3, 10)
        ));
    }

    #[test]
    fn test_inverted_pair_falls_back_to_previous_dates() {
        let previous = TripInfo {
            depart_date: Some(date(3, 1)),
            return_date: Some(date(3, 5)),
            ..Default::default()
        };
        let merged = merge(
            &previous,
            &outcome(TripUpdate {
                depart_date: Some(date(3, 20)),
                return_date: Some(date(3, 10)),
                ..Default::default()
            }),
            today(),
        );

        assert_eq!(merged.rejected(), vec![TripField::ReturnDate, TripField::DepartDate]);
        assert_eq!(merged.trip.depart_date, Some(date(3, 1)));
        assert_eq!(merged.trip.return_date, Some(date(3, 5)));
        assert!(merged.changes.iter().all(|c| !c.valid));
    }

    #[test]
    fn test_day_trip_is_valid() {
        let merged = merge(
            &TripInfo::default(),
            &outcome(TripUpdate {
                depart_date: Some(date(3, 15)),
                return_date: Some(date(3, 15)),
                ..Default::default()
            }),
            today(),
        );
        assert!(merged.errors.is_empty());
    }

    #[test]
    fn test_zero_travelers_keeps_previous() {
        let previous = TripInfo {
            travelers: Some(2),
            ..Default::default()
        };
        let merged = merge(
            &previous,
            &outcome(TripUpdate {
                travelers: Some(0),
                ..Default::default()
            }),
            today(),
        );
        assert_eq!(merged.trip.travelers, Some(2));
        assert!(matches!(merged.errors[0], ValidationError::Travelers { got: 0, .. }));
    }

    #[test]
    fn test_past_departure_rejected() {
        let merged = merge(
            &TripInfo::default(),
            &outcome(TripUpdate {
                depart_date: NaiveDate::from_ymd_opt(2023, 12, 1),
                ..Default::default()
            }),
            today(),
        );
        assert_eq!(merged.rejected(), vec![TripField::DepartDate]);
        assert_eq!(merged.trip.depart_date, None);
    }

    #[test]
    fn test_same_origin_and_destination_rejected() {
        let previous = TripInfo {
            origin: Some("Paris".to_string()),
            ..Default::default()
        };
        let merged = merge(
            &previous,
            &outcome(TripUpdate {
                destination: Some("paris".to_string()),
                ..Default::default()
            }),
            today(),
        );
        assert_eq!(merged.rejected(), vec![TripField::Destination]);
        assert_eq!(merged.trip.destination, None);
    }

    #[test]
    fn test_budget_and_hotel_class_bounds() {
        let merged = merge(
            &TripInfo::default(),
            &outcome(TripUpdate {
                budget: Some(Budget::new(0, "USD")),
                hotel_class: Some(7),
                car_rental: Some(true),
                ..Default::default()
            }),
            today(),
        );
        assert_eq!(merged.rejected(), vec![TripField::Budget, TripField::HotelClass]);
        assert_eq!(merged.trip.car_rental, Some(true), "valid siblings still merge");
    }
}
