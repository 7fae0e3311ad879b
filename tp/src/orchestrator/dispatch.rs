//! AgentDispatcher - sends one task to one agent

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{PlannerTask, TaskType};
use crate::registry::AgentEndpoint;

/// Errors from a single dispatch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Agent rejected the task ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Agent did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Invalid agent reply: {0}")]
    InvalidReply(String),
}

/// What an agent said about a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    /// Name of the agent that answered
    pub agent: String,
    /// One-line description of the result
    pub summary: String,
    /// Full reply body
    pub data: serde_json::Value,
}

impl AgentReply {
    /// Build a reply from an agent's JSON body
    ///
    /// The summary is taken from `message` or `summary` when present.
    pub fn from_body(agent: impl Into<String>, data: serde_json::Value) -> Self {
        let summary = ["message", "summary"]
            .iter()
            .find_map(|key| data.get(key).and_then(|v| v.as_str()))
            .unwrap_or("accepted")
            .to_string();
        Self {
            agent: agent.into(),
            summary,
            data,
        }
    }
}

/// Wire body posted to an agent
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DispatchBody<'a> {
    task_id: &'a str,
    task_type: TaskType,
    capability: &'a str,
    query: &'a str,
}

/// Delivers a task to a resolved agent
#[async_trait]
pub trait AgentDispatcher: Send + Sync {
    async fn dispatch(&self, endpoint: &AgentEndpoint, task: &PlannerTask) -> Result<AgentReply, DispatchError>;
}

/// Posts tasks as JSON to the agent's URL
pub struct HttpDispatcher {
    http: Client,
    timeout: Duration,
}

impl HttpDispatcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        debug!(timeout_ms = timeout.as_millis() as u64, "HttpDispatcher::new: called");
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, timeout })
    }

    fn request_error(&self, e: reqwest::Error) -> DispatchError {
        if e.is_timeout() {
            DispatchError::Timeout(self.timeout)
        } else {
            DispatchError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl AgentDispatcher for HttpDispatcher {
    async fn dispatch(&self, endpoint: &AgentEndpoint, task: &PlannerTask) -> Result<AgentReply, DispatchError> {
        debug!(task_id = %task.id, agent = %endpoint.name, url = %endpoint.url, "HttpDispatcher::dispatch: called");
        let body = DispatchBody {
            task_id: &task.id,
            task_type: task.task_type,
            capability: &task.capability,
            query: &task.query,
        };

        let response = self
            .http
            .post(&endpoint.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.request_error(e))?;

        if !status.is_success() {
            warn!(task_id = %task.id, %status, "HttpDispatcher::dispatch: agent rejected task");
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                message: text,
            });
        }

        let data = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| DispatchError::InvalidReply(e.to_string()))?
        };

        Ok(AgentReply::from_body(endpoint.name.clone(), data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_task;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint(url: String) -> AgentEndpoint {
        AgentEndpoint {
            capability: "air_tickets".to_string(),
            name: "air-agent".to_string(),
            url,
        }
    }

    #[tokio::test]
    async fn test_posts_task_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tasks"))
            .and(body_json(serde_json::json!({
                "taskId": "t1",
                "taskType": "airfare",
                "capability": "air_tickets",
                "query": "do t1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "completed",
                "message": "3 flights found"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = HttpDispatcher::new(Duration::from_secs(5)).unwrap();
        let reply = dispatcher
            .dispatch(&endpoint(format!("{}/tasks", server.uri())), &test_task("t1", &[], 1, 15))
            .await
            .unwrap();

        assert_eq!(reply.agent, "air-agent");
        assert_eq!(reply.summary, "3 flights found");
        assert_eq!(reply.data["status"], "completed");
    }

    #[tokio::test]
    async fn test_error_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("no seats"))
            .mount(&server)
            .await;

        let dispatcher = HttpDispatcher::new(Duration::from_secs(5)).unwrap();
        let err = dispatcher
            .dispatch(&endpoint(server.uri()), &test_task("t1", &[], 1, 15))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            DispatchError::Rejected {
                status: 422,
                message: "no seats".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_empty_body_is_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let dispatcher = HttpDispatcher::new(Duration::from_secs(5)).unwrap();
        let reply = dispatcher
            .dispatch(&endpoint(server.uri()), &test_task("t1", &[], 1, 15))
            .await
            .unwrap();
        assert_eq!(reply.summary, "accepted");
        assert!(reply.data.is_null());
    }

    #[tokio::test]
    async fn test_slow_agent_reports_configured_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let dispatcher = HttpDispatcher::new(Duration::from_millis(100)).unwrap();
        let result = dispatcher
            .dispatch(&endpoint(server.uri()), &test_task("a", &[], 1, 5))
            .await;

        let err = result.unwrap_err();
        assert_eq!(err, DispatchError::Timeout(Duration::from_millis(100)));
        assert_eq!(err.to_string(), "Agent did not answer within 100ms");
    }

    #[test]
    fn test_summary_prefers_message() {
        let reply = AgentReply::from_body("a", serde_json::json!({"summary": "s", "message": "m"}));
        assert_eq!(reply.summary, "m");
        let reply = AgentReply::from_body("a", serde_json::json!({"summary": "s"}));
        assert_eq!(reply.summary, "s");
    }
}
