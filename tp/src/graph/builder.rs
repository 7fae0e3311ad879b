//! TaskGraphBuilder - turns a complete TripInfo into a TaskList
//!
//! The generation rules are fixed:
//! 1. airfare, always, priority 1, no dependencies
//! 2. hotel, only when the trip spans at least one night, priority 2, no dependencies
//! 3. car rental, only when requested, priority 3, no dependencies
//!
//! Each task's query is rendered from a Handlebars template over the trip
//! fields, and the reasoning narrative records which rules fired.

use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde_json::json;
use tracing::{debug, info};

use super::dag::{self, GraphError};
use crate::domain::{PlannerTask, TaskList, TaskMetadata, TaskType, TripField, TripInfo};

const AIRFARE_TEMPLATE: &str = "Find {{#if round_trip}}round-trip{{else}}one-way{{/if}} flights from {{origin}} to \
{{destination}}{{#if depart_date}} departing {{depart_date}}{{/if}}{{#if return_date}} and returning {{return_date}}{{/if}} \
for {{traveler_label}}{{#if trip_type}} on a {{trip_type}} trip{{/if}}{{#if budget}}, total trip budget {{budget}}{{/if}}.";

const HOTEL_TEMPLATE: &str = "Find a hotel in {{destination}} from {{depart_date}} to {{return_date}} ({{nights_label}}) \
for {{traveler_label}}{{#if hotel_class}}, {{hotel_class}}-star or better{{/if}}{{#if budget}}, within a total trip budget \
of {{budget}}{{/if}}.";

const CAR_RENTAL_TEMPLATE: &str = "Find a rental car in {{destination}}{{#if depart_date}} from {{depart_date}}{{/if}}\
{{#if return_date}} to {{return_date}}{{/if}} for {{traveler_label}}.";

/// Builds task lists from complete trips
pub struct TaskGraphBuilder {
    templates: Handlebars<'static>,
}

impl TaskGraphBuilder {
    pub fn new() -> Result<Self, GraphError> {
        let mut templates = Handlebars::new();
        templates.register_escape_fn(handlebars::no_escape);
        for (task_type, template) in [
            (TaskType::Airfare, AIRFARE_TEMPLATE),
            (TaskType::Hotel, HOTEL_TEMPLATE),
            (TaskType::CarRental, CAR_RENTAL_TEMPLATE),
        ] {
            templates
                .register_template_string(task_type.as_str(), template)
                .map_err(|e| GraphError::Template(e.to_string()))?;
        }
        Ok(Self { templates })
    }

    /// Generate the task list for `trip`
    ///
    /// Deterministic apart from `created_at`: the same trip always yields the
    /// same tasks, ids, priorities and dependencies.
    pub fn build(&self, trip: &TripInfo, now: DateTime<Utc>) -> Result<TaskList, GraphError> {
        debug!(?trip, "build: called");
        if !trip.has_required() {
            return Err(GraphError::IncompleteTrip(missing_required(trip)));
        }
        if let (Some(depart), Some(ret)) = (trip.depart_date, trip.return_date)
            && ret < depart
        {
            return Err(GraphError::InvertedDates { depart, ret });
        }

        let context = template_context(trip);
        let destination = trip.destination.as_deref().unwrap_or_default();
        let mut tasks: Vec<PlannerTask> = Vec::new();
        let mut reasoning = Vec::new();

        // Rule 1
        let round_trip = trip.return_date.is_some();
        tasks.push(self.task(
            tasks.len(),
            TaskType::Airfare,
            1,
            15,
            format!(
                "Book {} flights from {} to {}",
                if round_trip { "round-trip" } else { "one-way" },
                trip.origin.as_deref().unwrap_or_default(),
                destination
            ),
            &context,
        )?);
        reasoning.push("Airfare: every trip needs transport to the destination, so flights are always booked first.".to_string());

        // Rule 2
        match trip.nights() {
            Some(nights) if nights >= 1 => {
                tasks.push(self.task(
                    tasks.len(),
                    TaskType::Hotel,
                    2,
                    10,
                    format!("Book {} of accommodation in {}", nights_label(nights), destination),
                    &context,
                )?);
                reasoning.push(format!(
                    "Hotel: the trip spans {}, so accommodation is needed. It does not depend on the flight booking and runs alongside it.",
                    nights_label(nights)
                ));
            }
            Some(_) => reasoning.push("Hotel: skipped, departure and return fall on the same day.".to_string()),
            None => reasoning.push("Hotel: skipped, no return date so the length of stay is unknown.".to_string()),
        }

        // Rule 3
        if trip.car_rental == Some(true) {
            tasks.push(self.task(
                tasks.len(),
                TaskType::CarRental,
                3,
                5,
                format!("Arrange a rental car in {}", destination),
                &context,
            )?);
            reasoning.push("Car rental: requested by the traveler; independent of the other bookings.".to_string());
        } else {
            reasoning.push("Car rental: skipped, not requested.".to_string());
        }

        let layers = dag::waves(&tasks)?;
        let estimated_minutes = dag::critical_path_minutes(&tasks, &layers);

        info!(
            task_count = tasks.len(),
            wave_count = layers.len(),
            estimated_minutes,
            "build: task list generated"
        );

        Ok(TaskList {
            trip_info: trip.clone(),
            tasks,
            reasoning: reasoning.join("\n"),
            estimated_minutes,
            created_at: now,
        })
    }

    fn task(
        &self,
        position: usize,
        task_type: TaskType,
        priority: u8,
        estimated_minutes: u32,
        description: String,
        context: &serde_json::Value,
    ) -> Result<PlannerTask, GraphError> {
        let query = self
            .templates
            .render(task_type.as_str(), context)
            .map_err(|e| GraphError::Template(e.to_string()))?;

        Ok(PlannerTask {
            id: format!("task-{}-{}", position + 1, task_type.as_str()),
            task_type,
            capability: task_type.capability().to_string(),
            description,
            query,
            depends_on: Vec::new(),
            metadata: TaskMetadata {
                priority,
                estimated_minutes,
            },
        })
    }
}

fn missing_required(trip: &TripInfo) -> Vec<TripField> {
    let mut missing: Vec<TripField> = [TripField::Origin, TripField::Destination, TripField::Travelers]
        .into_iter()
        .filter(|f| !trip.has(*f))
        .collect();
    if trip.first_date().is_none() {
        missing.push(TripField::DepartDate);
    }
    missing.sort();
    missing
}

fn nights_label(nights: i64) -> String {
    if nights == 1 {
        "1 night".to_string()
    } else {
        format!("{} nights", nights)
    }
}

fn template_context(trip: &TripInfo) -> serde_json::Value {
    let travelers = trip.travelers.unwrap_or(1);
    json!({
        "origin": trip.origin,
        "destination": trip.destination,
        "depart_date": trip.depart_date.map(|d| d.to_string()),
        "return_date": trip.return_date.map(|d| d.to_string()),
        "round_trip": trip.return_date.is_some(),
        "traveler_label": if travelers == 1 { "1 traveler".to_string() } else { format!("{} travelers", travelers) },
        "nights_label": trip.nights().map(nights_label),
        "trip_type": trip.trip_type.map(|t| t.to_string()),
        "budget": trip.budget.as_ref().map(|b| b.to_string()),
        "hotel_class": trip.hotel_class,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Budget, TripType};
    use chrono::{Duration, NaiveDate, TimeZone};
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap()
    }

    fn paris_trip() -> TripInfo {
        TripInfo {
            origin: Some("New York".to_string()),
            destination: Some("Paris".to_string()),
            depart_date: NaiveDate::from_ymd_opt(2024, 3, 15),
            return_date: NaiveDate::from_ymd_opt(2024, 3, 22),
            travelers: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_round_trip_gets_airfare_and_hotel() {
        let builder = TaskGraphBuilder::new().unwrap();
        let list = builder.build(&paris_trip(), now()).unwrap();

        let ids: Vec<&str> = list.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["task-1-airfare", "task-2-hotel"]);
        assert!(!list.has_task_type(TaskType::CarRental));

        let airfare = &list.tasks[0];
        assert_eq!(airfare.capability, "air_tickets");
        assert_eq!(
            airfare.query,
            "Find round-trip flights from New York to Paris departing 2024-03-15 and returning 2024-03-22 for 1 traveler."
        );

        let hotel = &list.tasks[1];
        assert_eq!(hotel.priority(), 2);
        assert!(hotel.depends_on.is_empty());
        assert_eq!(
            hotel.query,
            "Find a hotel in Paris from 2024-03-15 to 2024-03-22 (7 nights) for 1 traveler."
        );

        // Both run in the first wave
        assert_eq!(list.estimated_minutes, 15);
        assert!(list.reasoning.contains("7 nights"));
    }

    #[test]
    fn test_day_trip_has_no_hotel() {
        let trip = TripInfo {
            return_date: NaiveDate::from_ymd_opt(2024, 3, 15),
            ..paris_trip()
        };
        let list = TaskGraphBuilder::new().unwrap().build(&trip, now()).unwrap();
        assert_eq!(list.len(), 1);
        assert!(list.reasoning.contains("same day"));
    }

    #[test]
    fn test_return_before_departure_is_fault() {
        let trip = TripInfo {
            return_date: NaiveDate::from_ymd_opt(2024, 3, 10),
            ..paris_trip()
        };
        let result = TaskGraphBuilder::new().unwrap().build(&trip, now());
        assert!(matches!(result, Err(GraphError::InvertedDates { .. })));
    }

    #[test]
    fn test_one_way_has_no_hotel() {
        let trip = TripInfo {
            return_date: None,
            ..paris_trip()
        };
        let list = TaskGraphBuilder::new().unwrap().build(&trip, now()).unwrap();
        assert_eq!(list.len(), 1);
        assert!(list.tasks[0].query.starts_with("Find one-way flights"));
    }

    #[test]
    fn test_car_rental_when_requested() {
        let trip = TripInfo {
            car_rental: Some(true),
            travelers: Some(3),
            hotel_class: Some(4),
            trip_type: Some(TripType::Business),
            budget: Some(Budget::new(5000, "USD")),
            ..paris_trip()
        };
        let list = TaskGraphBuilder::new().unwrap().build(&trip, now()).unwrap();

        let car = list.tasks_of_type(TaskType::CarRental).next().unwrap();
        assert_eq!(car.id, "task-3-car_rental");
        assert_eq!(car.priority(), 3);
        assert_eq!(car.capability, "car_rental");
        assert_eq!(car.query, "Find a rental car in Paris from 2024-03-15 to 2024-03-22 for 3 travelers.");

        let hotel = list.tasks_of_type(TaskType::Hotel).next().unwrap();
        assert!(hotel.query.contains("4-star or better"));
        assert!(hotel.query.contains("5000 USD"));
        assert!(list.tasks[0].query.contains("on a business trip"));
    }

    #[test]
    fn test_declined_car_rental() {
        let trip = TripInfo {
            car_rental: Some(false),
            ..paris_trip()
        };
        let list = TaskGraphBuilder::new().unwrap().build(&trip, now()).unwrap();
        assert!(!list.has_task_type(TaskType::CarRental));
    }

    #[test]
    fn test_incomplete_trip_rejected() {
        let trip = TripInfo {
            origin: None,
            travelers: None,
            ..paris_trip()
        };
        let result = TaskGraphBuilder::new().unwrap().build(&trip, now());
        assert_eq!(
            result,
            Err(GraphError::IncompleteTrip(vec![TripField::Origin, TripField::Travelers]))
        );
    }

    fn arb_complete_trip() -> impl Strategy<Value = TripInfo> {
        (0i64..400, proptest::option::of(0i64..30), 1u32..10, proptest::option::of(any::<bool>())).prop_map(
            |(offset, stay, travelers, car)| {
                let depart = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap() + Duration::days(offset);
                TripInfo {
                    origin: Some("Chicago".to_string()),
                    destination: Some("Lisbon".to_string()),
                    depart_date: Some(depart),
                    return_date: stay.map(|s| depart + Duration::days(s)),
                    travelers: Some(travelers),
                    car_rental: car,
                    ..Default::default()
                }
            },
        )
    }

    proptest! {
        #[test]
        fn prop_build_is_deterministic(trip in arb_complete_trip()) {
            let builder = TaskGraphBuilder::new().unwrap();
            let first = builder.build(&trip, now()).unwrap();
            let second = builder.build(&trip, now()).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_airfare_always_first(trip in arb_complete_trip()) {
            let list = TaskGraphBuilder::new().unwrap().build(&trip, now()).unwrap();
            let airfare: Vec<_> = list.tasks_of_type(TaskType::Airfare).collect();
            prop_assert_eq!(airfare.len(), 1);
            prop_assert_eq!(airfare[0].priority(), 1);
            prop_assert!(airfare[0].depends_on.is_empty());
        }

        #[test]
        fn prop_hotel_iff_overnight(trip in arb_complete_trip()) {
            let list = TaskGraphBuilder::new().unwrap().build(&trip, now()).unwrap();
            let overnight = trip.nights().is_some_and(|n| n >= 1);
            prop_assert_eq!(list.has_task_type(TaskType::Hotel), overnight);
            for hotel in list.tasks_of_type(TaskType::Hotel) {
                prop_assert_eq!(hotel.priority(), 2);
            }
        }

        #[test]
        fn prop_generated_graph_validates(trip in arb_complete_trip()) {
            let list = TaskGraphBuilder::new().unwrap().build(&trip, now()).unwrap();
            prop_assert!(dag::validate(&list.tasks).is_ok());
        }
    }
}
