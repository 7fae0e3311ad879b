//! ModelExtractor - asks the language model for structured field updates

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ExtractionError, ExtractionInput, ExtractionOutcome, ExtractionSource, TripExtractor};
use crate::domain::{Budget, Role, TripField, TripType, TripUpdate};
use crate::llm::{CompletionRequest, CompletionResponse, LlmClient, Message, ToolDefinition};

/// Name of the tool the model must call
pub const UPDATE_TRIP_INFO_TOOL: &str = "update_trip_info";

const SYSTEM_PROMPT: &str = "You are the intake step of a travel planner. \
Read the traveler's newest message in the context of what is already known and \
call the update_trip_info tool exactly once with ONLY the fields the newest message \
states or changes. Leave every other field out. Dates are YYYY-MM-DD; resolve dates \
without a year relative to today, choosing the next future occurrence. Never invent \
values the traveler did not give.";

/// Confidence assumed for a field the model states without scoring it
const DEFAULT_CONFIDENCE: f32 = 0.9;

/// Wire shape of the tool input, parsed strictly
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolInput {
    origin: Option<String>,
    destination: Option<String>,
    depart_date: Option<String>,
    return_date: Option<String>,
    travelers: Option<u32>,
    trip_type: Option<TripType>,
    budget: Option<BudgetInput>,
    hotel_class: Option<u8>,
    car_rental: Option<bool>,
    #[serde(default)]
    confidence: BTreeMap<TripField, f32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BudgetInput {
    amount: u64,
    #[serde(default = "default_currency")]
    currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Extractor backed by an [`LlmClient`]
pub struct ModelExtractor {
    llm: Arc<dyn LlmClient>,
    max_tokens: u32,
}

impl ModelExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, max_tokens: u32) -> Self {
        Self { llm, max_tokens }
    }

    fn build_tools() -> Vec<ToolDefinition> {
        vec![ToolDefinition::new(
            UPDATE_TRIP_INFO_TOOL,
            "Record the trip details stated in the traveler's newest message.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "origin": { "type": "string", "description": "City the traveler departs from" },
                    "destination": { "type": "string", "description": "City the traveler is going to" },
                    "depart_date": { "type": "string", "description": "Departure date, YYYY-MM-DD" },
                    "return_date": { "type": "string", "description": "Return date, YYYY-MM-DD" },
                    "travelers": { "type": "integer", "minimum": 1 },
                    "trip_type": { "type": "string", "enum": ["business", "leisure"] },
                    "budget": {
                        "type": "object",
                        "properties": {
                            "amount": { "type": "integer", "minimum": 0 },
                            "currency": { "type": "string" }
                        },
                        "required": ["amount"]
                    },
                    "hotel_class": { "type": "integer", "minimum": 1, "maximum": 5 },
                    "car_rental": { "type": "boolean" },
                    "confidence": {
                        "type": "object",
                        "description": "Optional 0-1 confidence per field you set",
                        "additionalProperties": { "type": "number" }
                    }
                }
            }),
        )]
    }

    fn build_user_message(input: &ExtractionInput) -> String {
        let known = serde_json::to_string(&input.previous).unwrap_or_else(|_| "{}".to_string());
        let mut message = format!("Today is {}.\nKnown so far: {}\n", input.today, known);

        if !input.summary.is_empty() {
            message.push_str(&format!("Earlier conversation (summarized): {}\n", input.summary));
        }
        if !input.recent_turns.is_empty() {
            message.push_str("Recent turns:\n");
            for turn in &input.recent_turns {
                let speaker = match turn.role {
                    Role::User => "traveler",
                    Role::Assistant => "planner",
                };
                message.push_str(&format!("{}: {}\n", speaker, turn.text));
            }
        }
        if let Some(field) = input.pending_question {
            message.push_str(&format!("The planner last asked about: {}\n", field));
        }

        message.push_str(&format!("\nNewest message: {}", input.utterance));
        message
    }

    /// Find the tool call (or a bare JSON body) and parse it
    fn parse_response(response: &CompletionResponse) -> Result<ExtractionOutcome, ExtractionError> {
        if let Some(call) = response.tool_call(UPDATE_TRIP_INFO_TOOL) {
            return Self::parse_tool_input(&call.input);
        }

        if let Some(content) = &response.content
            && let Ok(value) = serde_json::from_str::<serde_json::Value>(content.trim())
        {
            return Self::parse_tool_input(&value);
        }

        Err(ExtractionError::Unparsable(format!(
            "model did not call {}",
            UPDATE_TRIP_INFO_TOOL
        )))
    }

    fn parse_tool_input(value: &serde_json::Value) -> Result<ExtractionOutcome, ExtractionError> {
        let input: ToolInput =
            serde_json::from_value(value.clone()).map_err(|e| ExtractionError::Unparsable(e.to_string()))?;

        let update = TripUpdate {
            origin: non_empty(input.origin),
            destination: non_empty(input.destination),
            depart_date: parse_date(input.depart_date, "depart_date")?,
            return_date: parse_date(input.return_date, "return_date")?,
            travelers: input.travelers,
            trip_type: input.trip_type,
            budget: input.budget.map(|b| Budget::new(b.amount, b.currency.to_uppercase())),
            hotel_class: input.hotel_class,
            car_rental: input.car_rental,
        };

        let confidence = update
            .stated_fields()
            .into_iter()
            .map(|field| {
                let score = input
                    .confidence
                    .get(&field)
                    .copied()
                    .unwrap_or(DEFAULT_CONFIDENCE)
                    .clamp(0.0, 1.0);
                (field, score)
            })
            .collect();

        Ok(ExtractionOutcome {
            update,
            confidence,
            source: ExtractionSource::Model,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_date(value: Option<String>, field: &str) -> Result<Option<NaiveDate>, ExtractionError> {
    match non_empty(value) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| ExtractionError::Unparsable(format!("{} is not YYYY-MM-DD: {}", field, raw))),
    }
}

#[async_trait]
impl TripExtractor for ModelExtractor {
    async fn extract(&self, input: &ExtractionInput) -> Result<ExtractionOutcome, ExtractionError> {
        debug!(utterance_len = input.utterance.len(), "ModelExtractor::extract: called");
        let request = CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            messages: vec![Message::user(Self::build_user_message(input))],
            tools: Self::build_tools(),
            max_tokens: self.max_tokens,
        };

        let response = self.llm.complete(request).await?;
        let outcome = Self::parse_response(&response);
        if let Err(e) = &outcome {
            warn!(error = %e, "ModelExtractor::extract: response rejected");
        }
        outcome
    }

    fn name(&self) -> &'static str {
        "model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TripInfo, Turn};
    use crate::llm::client::mock::{MockLlmClient, MockReply};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
    }

    #[tokio::test]
    async fn test_tool_call_is_parsed() {
        let llm = Arc::new(MockLlmClient::new(vec![MockReply::tool(
            UPDATE_TRIP_INFO_TOOL,
            serde_json::json!({
                "destination": "Paris",
                "depart_date": "2024-03-15",
                "travelers": 2,
                "trip_type": "leisure",
                "budget": { "amount": 3000, "currency": "eur" },
                "confidence": { "destination": 0.95 }
            }),
        )]));
        let extractor = ModelExtractor::new(llm.clone(), 512);

        let outcome = extractor
            .extract(&ExtractionInput::standalone("Paris in March for two", today()))
            .await
            .unwrap();

        assert_eq!(outcome.source, ExtractionSource::Model);
        assert_eq!(outcome.update.destination.as_deref(), Some("Paris"));
        assert_eq!(outcome.update.depart_date, NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(outcome.update.travelers, Some(2));
        assert_eq!(outcome.update.budget, Some(Budget::new(3000, "EUR")));
        assert_eq!(outcome.confidence_for(TripField::Destination), 0.95);
        assert_eq!(outcome.confidence_for(TripField::Travelers), DEFAULT_CONFIDENCE);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_request_carries_context() {
        let llm = Arc::new(MockLlmClient::new(vec![MockReply::tool(
            UPDATE_TRIP_INFO_TOOL,
            serde_json::json!({ "origin": "New York" }),
        )]));
        let extractor = ModelExtractor::new(llm.clone(), 512);

        let input = ExtractionInput {
            previous: TripInfo {
                destination: Some("Paris".to_string()),
                ..Default::default()
            },
            utterance: "from New York".to_string(),
            recent_turns: vec![
                Turn::user("I want to visit Paris"),
                Turn::assistant("Where will you be departing from?"),
            ],
            summary: String::new(),
            today: today(),
            pending_question: Some(TripField::Origin),
        };
        extractor.extract(&input).await.unwrap();

        let requests = llm.requests();
        assert_eq!(requests[0].tools[0].name, UPDATE_TRIP_INFO_TOOL);
        let body = &requests[0].messages[0].content;
        assert!(body.contains("\"destination\":\"Paris\""));
        assert!(body.contains("planner: Where will you be departing from?"));
        assert!(body.contains("last asked about: origin"));
        assert!(body.ends_with("Newest message: from New York"));
    }

    #[tokio::test]
    async fn test_json_text_body_is_accepted() {
        let llm = Arc::new(MockLlmClient::new(vec![MockReply::text(r#"{"destination": "Rome"}"#)]));
        let extractor = ModelExtractor::new(llm, 512);

        let outcome = extractor
            .extract(&ExtractionInput::standalone("Rome please", today()))
            .await
            .unwrap();
        assert_eq!(outcome.update.destination.as_deref(), Some("Rome"));
    }

    #[tokio::test]
    async fn test_malformed_values_are_unparsable() {
        let cases = vec![
            serde_json::json!({ "depart_date": "next tuesday" }),
            serde_json::json!({ "travelers": -2 }),
            serde_json::json!({ "trip_type": "space" }),
            serde_json::json!({ "mood": "happy" }),
        ];
        for input in cases {
            let llm = Arc::new(MockLlmClient::new(vec![MockReply::tool(UPDATE_TRIP_INFO_TOOL, input.clone())]));
            let extractor = ModelExtractor::new(llm, 512);
            let result = extractor.extract(&ExtractionInput::standalone("x", today())).await;
            assert!(
                matches!(result, Err(ExtractionError::Unparsable(_))),
                "expected unparsable for {}",
                input
            );
        }
    }

    #[tokio::test]
    async fn test_prose_reply_is_unparsable() {
        let llm = Arc::new(MockLlmClient::new(vec![MockReply::text("Sounds lovely!")]));
        let extractor = ModelExtractor::new(llm, 512);
        let result = extractor.extract(&ExtractionInput::standalone("x", today())).await;
        assert!(matches!(result, Err(ExtractionError::Unparsable(_))));
    }

    #[tokio::test]
    async fn test_api_failure_is_unreachable() {
        let llm = Arc::new(MockLlmClient::new(vec![MockReply::Fail(503)]));
        let extractor = ModelExtractor::new(llm, 512);
        let result = extractor.extract(&ExtractionInput::standalone("x", today())).await;
        assert!(matches!(result, Err(ExtractionError::Unreachable(_))));
    }
}
