//! KeywordExtractor - deterministic regex extraction
//!
//! Used as the graceful-degradation path when the model is unavailable, and
//! as the only extractor when no model is configured. It never fails: text
//! it cannot read simply yields an empty update.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{Datelike, Months, NaiveDate};
use regex::Regex;
use tracing::debug;

use super::{ExtractionError, ExtractionInput, ExtractionOutcome, ExtractionSource, TripExtractor};
use crate::domain::{Budget, TripField, TripType, TripUpdate};

/// Confidence for a value read directly from the text
const STATED_CONFIDENCE: f32 = 0.6;

/// Confidence for a value inferred rather than stated
const INFERRED_CONFIDENCE: f32 = 0.4;

const PLACE: &str = r"([A-Z][\p{L}'-]*(?:\s+[A-Z][\p{L}'-]*)*)";
const MONTH: &str = r"(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)";
const COUNT: &str = r"(\d{1,3}|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve)";
const AMOUNT: &str = r"(\d{1,3}(?:,\d{3})+|\d+)";
const ORDINAL: &str = r"(?:st|nd|rd|th)?";

const CALENDAR_WORDS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september", "october",
    "november", "december", "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep", "sept", "oct", "nov", "dec",
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday", "today", "tomorrow", "next",
];

/// Regex-based extractor
pub struct KeywordExtractor {
    origin: Regex,
    destination: Regex,
    destination_in: Regex,
    bare_place: Regex,
    iso_date: Regex,
    month_day: Regex,
    day_range: Regex,
    travelers: Regex,
    party_of: Regex,
    solo: Regex,
    companion: Regex,
    singular: Regex,
    plural: Regex,
    bare_count: Regex,
    budget_symbol: Regex,
    budget_suffix: Regex,
    budget_phrase: Regex,
    business: Regex,
    leisure: Regex,
    hotel_class: Regex,
    car_negative: Regex,
    car_positive: Regex,
    return_hint: Regex,
}

#[derive(Debug, Clone, Copy)]
struct FoundDate {
    position: usize,
    date: NaiveDate,
    explicit_year: bool,
}

impl KeywordExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            origin: Regex::new(&format!(r"\b(?i:from|out of|leaving)\s+{}", PLACE))?,
            destination: Regex::new(&format!(r"\b(?i:to|visit|visiting|toward|towards)\s+{}", PLACE))?,
            destination_in: Regex::new(&format!(r"\b(?i:in)\s+{}", PLACE))?,
            bare_place: Regex::new(&format!(r"^\s*{}\s*[.!]?\s*$", PLACE))?,
            iso_date: Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b")?,
            month_day: Regex::new(&format!(r"(?i)\b{}\.?\s+(\d{{1,2}}){}\b(?:,?\s+(\d{{4}})\b)?", MONTH, ORDINAL))?,
            day_range: Regex::new(&format!(
                r"(?i)\b{}\.?\s+(\d{{1,2}}){}\s*(?:-|–|to|through|until|till)\s*(\d{{1,2}}){}\b(?:,?\s+(\d{{4}})\b)?",
                MONTH, ORDINAL, ORDINAL
            ))?,
            travelers: Regex::new(&format!(
                r"(?i)\b{}\s+(?:people|persons|person|travell?ers|adults|passengers|guests|of us)\b",
                COUNT
            ))?,
            party_of: Regex::new(&format!(r"(?i)\b(?:party|family|group) of {}\b", COUNT))?,
            solo: Regex::new(r"(?i)\b(?:solo|alone|just me|by myself|on my own)\b")?,
            companion: Regex::new(
                r"(?i)\bwith (?:my|a) (?:wife|husband|partner|girlfriend|boyfriend|spouse|friend|colleague|fianc[eé]e?|mom|mother|dad|father|sister|brother)\b",
            )?,
            singular: Regex::new(r"\b(?:I|I'm|I'd|I'll|I've|[Mm]e|[Mm]y)\b")?,
            plural: Regex::new(r"(?i)\b(?:we|us|our|we're|we'll|ourselves|family|kids|children)\b")?,
            bare_count: Regex::new(&format!(
                r"(?i)^\W*(?:just|only|about)?\s*{}\s*(?:people|of us|travell?ers|adults|passengers)?\W*$",
                COUNT
            ))?,
            budget_symbol: Regex::new(&format!(r"(?i)([$€£])\s?{}(?:\s?(k)\b)?", AMOUNT))?,
            budget_suffix: Regex::new(&format!(
                r"(?i)\b{}\s?(k)?\s*(usd|dollars|bucks|eur|euros?|gbp|pounds)\b",
                AMOUNT
            ))?,
            budget_phrase: Regex::new(&format!(
                r"(?i)\bbudget\s+(?:of|is|around|about)?\s*{}\s?(k)?\b",
                AMOUNT
            ))?,
            business: Regex::new(r"(?i)\b(?:business|work|conference|meetings?|client|offsite)\b")?,
            leisure: Regex::new(r"(?i)\b(?:vacation|holiday|leisure|honeymoon|getaway|sightseeing|anniversary)\b")?,
            hotel_class: Regex::new(r"(?i)\b(\d|one|two|three|four|five)[- ]?stars?\b")?,
            car_negative: Regex::new(
                r"(?i)\b(?:no|don[’']t need|do not need|won[’']t need|without)\s+(?:a\s+)?(?:rental\s+|rented\s+)?car\b",
            )?,
            car_positive: Regex::new(
                r"(?i)\b(?:rent(?:ing)?\s+a\s+car|car\s+rental|rental\s+car|hire\s+a\s+car|need\s+a\s+car|want\s+a\s+car)\b",
            )?,
            return_hint: Regex::new(r"(?i)\b(?:return|returning|back|until|till)\b")?,
        })
    }

    /// Run every rule over the utterance
    pub fn parse(&self, input: &ExtractionInput) -> ExtractionOutcome {
        debug!(utterance_len = input.utterance.len(), "KeywordExtractor::parse: called");
        let text = input.utterance.as_str();
        let mut update = TripUpdate::default();
        let mut confidence = BTreeMap::new();

        update.origin = self.first_place(&self.origin, text);
        update.destination = self
            .first_place(&self.destination, text)
            .or_else(|| self.first_place(&self.destination_in, text));

        if let Some(field @ (TripField::Origin | TripField::Destination)) = input.pending_question
            && update.origin.is_none()
            && update.destination.is_none()
            && let Some(place) = self.bare_place(text)
        {
            match field {
                TripField::Origin => update.origin = Some(place),
                _ => update.destination = Some(place),
            }
        }

        self.apply_dates(input, &mut update);

        let mut travelers_inferred = false;
        update.travelers = self.explicit_travelers(text);
        if update.travelers.is_none() && input.pending_question == Some(TripField::Travelers) {
            update.travelers = self.bare_count.captures(text).and_then(|c| parse_count(&c[1]));
        }
        if update.travelers.is_none() && input.previous.travelers.is_none() {
            update.travelers = self.inferred_travelers(text);
            travelers_inferred = update.travelers.is_some();
        }

        update.budget = self.budget(text);
        update.trip_type = self.trip_type(text);
        update.hotel_class = self
            .hotel_class
            .captures(text)
            .and_then(|c| parse_count(&c[1]))
            .and_then(|n| u8::try_from(n).ok());
        update.car_rental = if self.car_negative.is_match(text) {
            Some(false)
        } else if self.car_positive.is_match(text) {
            Some(true)
        } else {
            None
        };

        for field in update.stated_fields() {
            let score = if field == TripField::Travelers && travelers_inferred {
                INFERRED_CONFIDENCE
            } else {
                STATED_CONFIDENCE
            };
            confidence.insert(field, score);
        }

        debug!(fields = ?update.stated_fields(), "KeywordExtractor::parse: done");
        ExtractionOutcome {
            update,
            confidence,
            source: ExtractionSource::Keyword,
        }
    }

    /// First capture of `pattern` that still names a place after calendar words are trimmed
    fn first_place(&self, pattern: &Regex, text: &str) -> Option<String> {
        pattern.captures_iter(text).find_map(|c| clean_place(&c[1]))
    }

    fn bare_place(&self, text: &str) -> Option<String> {
        self.bare_place.captures(text).and_then(|c| clean_place(&c[1]))
    }

    fn apply_dates(&self, input: &ExtractionInput, update: &mut TripUpdate) {
        let text = input.utterance.as_str();
        let today = input.today;
        let mut found: Vec<FoundDate> = Vec::new();
        let mut covered: Vec<(usize, usize)> = Vec::new();

        for c in self.day_range.captures_iter(text) {
            let Some(whole) = c.get(0) else { continue };
            let month = month_number(&c[1]);
            let year = c.get(4).and_then(|y| y.as_str().parse::<i32>().ok());
            let (Some(month), Ok(first_day), Ok(second_day)) = (month, c[2].parse::<u32>(), c[3].parse::<u32>()) else {
                continue;
            };
            if let Some(first) = resolve_date(month, first_day, year, today) {
                found.push(FoundDate {
                    position: whole.start(),
                    date: first,
                    explicit_year: year.is_some(),
                });
                if let Some(second) = NaiveDate::from_ymd_opt(first.year(), month, second_day) {
                    found.push(FoundDate {
                        position: whole.start() + 1,
                        date: second,
                        explicit_year: year.is_some(),
                    });
                }
            }
            covered.push((whole.start(), whole.end()));
        }

        for c in self.month_day.captures_iter(text) {
            let Some(whole) = c.get(0) else { continue };
            if covered.iter().any(|(s, e)| whole.start() >= *s && whole.start() < *e) {
                continue;
            }
            let year = c.get(3).and_then(|y| y.as_str().parse::<i32>().ok());
            let (Some(month), Ok(day)) = (month_number(&c[1]), c[2].parse::<u32>()) else {
                continue;
            };
            if let Some(date) = resolve_date(month, day, year, today) {
                found.push(FoundDate {
                    position: whole.start(),
                    date,
                    explicit_year: year.is_some(),
                });
            }
        }

        for c in self.iso_date.captures_iter(text) {
            let Some(whole) = c.get(0) else { continue };
            let (Ok(y), Ok(m), Ok(d)) = (c[1].parse::<i32>(), c[2].parse::<u32>(), c[3].parse::<u32>()) else {
                continue;
            };
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                found.push(FoundDate {
                    position: whole.start(),
                    date,
                    explicit_year: true,
                });
            }
        }

        found.sort_by_key(|f| f.position);

        match found.as_slice() {
            [] => {}
            [only] => {
                // A return hint also corrects an already known return date
                let wants_return = input.previous.depart_date.is_some()
                    && (self.return_hint.is_match(text)
                        || (input.previous.return_date.is_none()
                            && input.pending_question == Some(TripField::ReturnDate)));
                if wants_return {
                    update.return_date = Some(only.date);
                } else {
                    update.depart_date = Some(only.date);
                }
            }
            [depart, ret, ..] => {
                let mut return_date = ret.date;
                if return_date < depart.date
                    && !ret.explicit_year
                    && let Some(next_year) = return_date.checked_add_months(Months::new(12))
                {
                    return_date = next_year;
                }
                update.depart_date = Some(depart.date);
                update.return_date = Some(return_date);
            }
        }
    }

    fn explicit_travelers(&self, text: &str) -> Option<u32> {
        if let Some(c) = self.travelers.captures(text) {
            return parse_count(&c[1]);
        }
        if let Some(c) = self.party_of.captures(text) {
            return parse_count(&c[1]);
        }
        if self.solo.is_match(text) {
            return Some(1);
        }
        if self.companion.is_match(text) {
            return Some(2);
        }
        None
    }

    /// A first-person-singular request with no plural pronoun is one traveler
    fn inferred_travelers(&self, text: &str) -> Option<u32> {
        if self.singular.is_match(text) && !self.plural.is_match(text) && !text.to_lowercase().contains("with ") {
            Some(1)
        } else {
            None
        }
    }

    fn budget(&self, text: &str) -> Option<Budget> {
        if let Some(c) = self.budget_symbol.captures(text) {
            let currency = match &c[1] {
                "€" => "EUR",
                "£" => "GBP",
                _ => "USD",
            };
            return parse_amount(&c[2], c.get(3).is_some()).map(|a| Budget::new(a, currency));
        }
        if let Some(c) = self.budget_suffix.captures(text) {
            let currency = match c[3].to_lowercase().as_str() {
                "eur" | "euro" | "euros" => "EUR",
                "gbp" | "pounds" => "GBP",
                _ => "USD",
            };
            return parse_amount(&c[1], c.get(2).is_some()).map(|a| Budget::new(a, currency));
        }
        if let Some(c) = self.budget_phrase.captures(text) {
            return parse_amount(&c[1], c.get(2).is_some()).map(|a| Budget::new(a, "USD"));
        }
        None
    }

    /// Whichever trip-type keyword appears first wins
    fn trip_type(&self, text: &str) -> Option<TripType> {
        let business = self.business.find(text).map(|m| m.start());
        let leisure = self.leisure.find(text).map(|m| m.start());
        match (business, leisure) {
            (Some(b), Some(l)) if l < b => Some(TripType::Leisure),
            (Some(_), _) => Some(TripType::Business),
            (None, Some(_)) => Some(TripType::Leisure),
            (None, None) => None,
        }
    }
}

#[async_trait]
impl TripExtractor for KeywordExtractor {
    async fn extract(&self, input: &ExtractionInput) -> Result<ExtractionOutcome, ExtractionError> {
        Ok(self.parse(input))
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

/// Drop calendar words from a captured place; `None` when nothing is left
fn clean_place(raw: &str) -> Option<String> {
    let words: Vec<&str> = raw
        .split_whitespace()
        .take_while(|w| !CALENDAR_WORDS.contains(&w.to_lowercase().as_str()))
        .collect();
    if words.is_empty() { None } else { Some(words.join(" ")) }
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.to_lowercase().chars().take(3).collect();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Year-less dates resolve to their next occurrence on or after `today`
fn resolve_date(month: u32, day: u32, year: Option<i32>, today: NaiveDate) -> Option<NaiveDate> {
    if let Some(year) = year {
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if this_year >= today {
        Some(this_year)
    } else {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    }
}

fn parse_count(raw: &str) -> Option<u32> {
    let n = match raw.to_lowercase().as_str() {
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        digits => return digits.parse().ok(),
    };
    Some(n)
}

fn parse_amount(raw: &str, thousands: bool) -> Option<u64> {
    let amount: u64 = raw.replace(',', "").parse().ok()?;
    if thousands { amount.checked_mul(1000) } else { Some(amount) }
}
