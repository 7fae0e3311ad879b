//! TripInfo - accumulated trip facts
//!
//! Every field is independently optional until the conversation fills it in.
//! Updates only ever set fields: a `None` in a [`TripUpdate`] means "not
//! mentioned", never "clear".

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Purpose of the trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripType {
    Business,
    Leisure,
}

impl std::fmt::Display for TripType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Business => write!(f, "business"),
            Self::Leisure => write!(f, "leisure"),
        }
    }
}

impl std::str::FromStr for TripType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "business" | "work" => Ok(Self::Business),
            "leisure" | "vacation" | "holiday" | "personal" => Ok(Self::Leisure),
            _ => Err(format!("Unknown trip type: {}", s)),
        }
    }
}

/// Spending limit for the whole trip, in whole currency units
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Budget {
    pub amount: u64,
    pub currency: String,
}

impl Budget {
    pub fn new(amount: u64, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }
}

impl std::fmt::Display for Budget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

/// The trip details being assembled across turns
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripInfo {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub depart_date: Option<NaiveDate>,
    pub return_date: Option<NaiveDate>,
    pub travelers: Option<u32>,
    pub trip_type: Option<TripType>,
    pub budget: Option<Budget>,
    /// Preferred hotel star rating (1-5)
    pub hotel_class: Option<u8>,
    /// Whether a rental car is wanted
    pub car_rental: Option<bool>,
}

impl TripInfo {
    /// Whether a field currently holds a value
    pub fn has(&self, field: TripField) -> bool {
        match field {
            TripField::Origin => self.origin.is_some(),
            TripField::Destination => self.destination.is_some(),
            TripField::DepartDate => self.depart_date.is_some(),
            TripField::ReturnDate => self.return_date.is_some(),
            TripField::Travelers => self.travelers.is_some(),
            TripField::Budget => self.budget.is_some(),
            TripField::TripType => self.trip_type.is_some(),
            TripField::HotelClass => self.hotel_class.is_some(),
            TripField::CarRental => self.car_rental.is_some(),
        }
    }

    /// Origin, destination, at least one date and a traveler count
    pub fn has_required(&self) -> bool {
        self.origin.is_some()
            && self.destination.is_some()
            && (self.depart_date.is_some() || self.return_date.is_some())
            && self.travelers.is_some()
    }

    /// Nights between departure and return, when both are known
    pub fn nights(&self) -> Option<i64> {
        match (self.depart_date, self.return_date) {
            (Some(depart), Some(ret)) => Some((ret - depart).num_days()),
            _ => None,
        }
    }

    /// The first date of travel, whichever is known
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.depart_date.or(self.return_date)
    }
}

/// Every field the planner can ask about, in fixed question order
///
/// Declaration order is the tie-break inside a priority group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripField {
    Origin,
    Destination,
    DepartDate,
    ReturnDate,
    Travelers,
    Budget,
    TripType,
    HotelClass,
    CarRental,
}

impl TripField {
    pub const ALL: [TripField; 9] = [
        TripField::Origin,
        TripField::Destination,
        TripField::DepartDate,
        TripField::ReturnDate,
        TripField::Travelers,
        TripField::Budget,
        TripField::TripType,
        TripField::HotelClass,
        TripField::CarRental,
    ];

    /// Priority group: route, dates, travelers, budget/type, preferences
    pub fn group(&self) -> u8 {
        match self {
            Self::Origin | Self::Destination => 0,
            Self::DepartDate | Self::ReturnDate => 1,
            Self::Travelers => 2,
            Self::Budget | Self::TripType => 3,
            Self::HotelClass | Self::CarRental => 4,
        }
    }

    /// Whether a missing value blocks task generation on its own
    ///
    /// Return date is only blocking when departure is also missing; that
    /// case is handled by the gap analyzer.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Origin | Self::Destination | Self::DepartDate | Self::Travelers)
    }

    /// The clarifying question for this field
    pub fn question(&self) -> &'static str {
        match self {
            Self::Origin => "Where will you be departing from?",
            Self::Destination => "Where would you like to go?",
            Self::DepartDate => "What dates are you traveling? Please give a departure date and, if you have one, a return date.",
            Self::ReturnDate => "When will you be returning?",
            Self::Travelers => "How many people will be traveling?",
            Self::Budget => "Do you have a budget in mind for this trip?",
            Self::TripType => "Is this trip for business or leisure?",
            Self::HotelClass => "Do you have a preferred hotel class (1 to 5 stars)?",
            Self::CarRental => "Will you need a rental car at your destination?",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Origin => "origin",
            Self::Destination => "destination",
            Self::DepartDate => "depart_date",
            Self::ReturnDate => "return_date",
            Self::Travelers => "travelers",
            Self::Budget => "budget",
            Self::TripType => "trip_type",
            Self::HotelClass => "hotel_class",
            Self::CarRental => "car_rental",
        }
    }
}

impl std::fmt::Display for TripField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Field values stated in one utterance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripUpdate {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub depart_date: Option<NaiveDate>,
    pub return_date: Option<NaiveDate>,
    pub travelers: Option<u32>,
    pub trip_type: Option<TripType>,
    pub budget: Option<Budget>,
    pub hotel_class: Option<u8>,
    pub car_rental: Option<bool>,
}

impl TripUpdate {
    /// Fields this update states a value for
    pub fn stated_fields(&self) -> Vec<TripField> {
        let mut fields = Vec::new();
        if self.origin.is_some() {
            fields.push(TripField::Origin);
        }
        if self.destination.is_some() {
            fields.push(TripField::Destination);
        }
        if self.depart_date.is_some() {
            fields.push(TripField::DepartDate);
        }
        if self.return_date.is_some() {
            fields.push(TripField::ReturnDate);
        }
        if self.travelers.is_some() {
            fields.push(TripField::Travelers);
        }
        if self.budget.is_some() {
            fields.push(TripField::Budget);
        }
        if self.trip_type.is_some() {
            fields.push(TripField::TripType);
        }
        if self.hotel_class.is_some() {
            fields.push(TripField::HotelClass);
        }
        if self.car_rental.is_some() {
            fields.push(TripField::CarRental);
        }
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.stated_fields().is_empty()
    }
}

/// Per-field verdict on one extracted value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: TripField,
    /// Extractor confidence in [0, 1]
    pub confidence: f32,
    /// Whether the value passed validation and was merged
    pub valid: bool,
    /// Why the value was rejected, if it was
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_has_required() {
        let mut trip = TripInfo::default();
        assert!(!trip.has_required());

        trip.origin = Some("New York".to_string());
        trip.destination = Some("Paris".to_string());
        trip.travelers = Some(1);
        assert!(!trip.has_required());

        trip.return_date = Some(date(2024, 3, 22));
        assert!(trip.has_required(), "any one date satisfies the date requirement");
    }

    #[test]
    fn test_nights() {
        let trip = TripInfo {
            depart_date: Some(date(2024, 3, 15)),
            return_date: Some(date(2024, 3, 22)),
            ..Default::default()
        };
        assert_eq!(trip.nights(), Some(7));

        let one_way = TripInfo {
            depart_date: Some(date(2024, 3, 15)),
            ..Default::default()
        };
        assert_eq!(one_way.nights(), None);
    }

    #[test]
    fn test_field_groups_follow_declaration_order() {
        let groups: Vec<u8> = TripField::ALL.iter().map(|f| f.group()).collect();
        let mut sorted = groups.clone();
        sorted.sort();
        assert_eq!(groups, sorted);
    }

    #[test]
    fn test_trip_type_parse() {
        assert_eq!("Business".parse::<TripType>().unwrap(), TripType::Business);
        assert_eq!("vacation".parse::<TripType>().unwrap(), TripType::Leisure);
        assert!("space".parse::<TripType>().is_err());
    }

    #[test]
    fn test_trip_info_wire_names() {
        let trip = TripInfo {
            depart_date: Some(date(2024, 3, 15)),
            ..Default::default()
        };
        let json = serde_json::to_value(&trip).unwrap();
        assert_eq!(json["departDate"], "2024-03-15");
        assert!(json["returnDate"].is_null());
    }

    #[test]
    fn test_stated_fields() {
        let update = TripUpdate {
            destination: Some("Paris".to_string()),
            car_rental: Some(false),
            ..Default::default()
        };
        assert_eq!(update.stated_fields(), vec![TripField::Destination, TripField::CarRental]);
        assert!(TripUpdate::default().is_empty());
    }
}
