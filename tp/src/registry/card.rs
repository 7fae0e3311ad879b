//! AgentCard - the discovery document an agent publishes

use serde::{Deserialize, Serialize};

use crate::config::AgentConfig;

/// Optional protocol features an agent supports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentCapabilities {
    pub streaming: bool,
    pub push_notifications: bool,
    pub state_transition_history: bool,
}

/// One thing an agent can be asked to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

fn default_modes() -> Vec<String> {
    vec!["text".to_string()]
}

/// Agent discovery document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub url: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub capabilities: AgentCapabilities,
    #[serde(default)]
    pub skills: Vec<AgentSkill>,
    #[serde(default = "default_modes")]
    pub default_input_modes: Vec<String>,
    #[serde(default = "default_modes")]
    pub default_output_modes: Vec<String>,
}

impl AgentCard {
    /// The planner's own card
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            name: config.name.clone(),
            description: Some(config.description.clone()),
            url: config.url.clone(),
            version: config.version.clone(),
            capabilities: AgentCapabilities {
                streaming: true,
                push_notifications: false,
                state_transition_history: false,
            },
            skills: vec![
                AgentSkill {
                    id: "plan_trip".to_string(),
                    name: "Plan a trip".to_string(),
                    description: Some(
                        "Gathers trip details over several turns and produces dependency-ordered booking tasks"
                            .to_string(),
                    ),
                    tags: vec!["travel".to_string(), "planning".to_string(), "conversation".to_string()],
                    examples: vec!["I want to visit Paris from New York March 15 to March 22".to_string()],
                },
                AgentSkill {
                    id: "quick_plan".to_string(),
                    name: "Quick plan".to_string(),
                    description: Some("Plans a trip from one self-contained request without keeping a session".to_string()),
                    tags: vec!["travel".to_string(), "planning".to_string()],
                    examples: vec!["Business trip from Boston to Chicago 2024-05-02 to 2024-05-04 for 2 people".to_string()],
                },
            ],
            default_input_modes: default_modes(),
            default_output_modes: vec!["text".to_string(), "data".to_string()],
        }
    }

    pub fn has_skill(&self, id: &str) -> bool {
        self.skills.iter().any(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planner_card_wire_shape() {
        let card = AgentCard::from_config(&AgentConfig::default());
        let json = serde_json::to_value(&card).unwrap();

        assert_eq!(json["name"], "trip-planner");
        assert_eq!(json["url"], "http://localhost:10001");
        assert_eq!(json["capabilities"]["streaming"], true);
        assert_eq!(json["defaultInputModes"][0], "text");
        assert!(card.has_skill("plan_trip"));
        assert!(card.has_skill("quick_plan"));
    }

    #[test]
    fn test_minimal_card_parses_with_defaults() {
        let card: AgentCard =
            serde_json::from_str(r#"{"name":"air-agent","url":"http://air.local"}"#).unwrap();
        assert_eq!(card.default_input_modes, vec!["text"]);
        assert!(card.skills.is_empty());
        assert!(!card.capabilities.streaming);
    }
}
