//! Cursor background-agent client over the agent REST API.
//!
//! ```text
//! POST   {base_url}/v0/agents                  launch
//! GET    {base_url}/v0/agents/{id}             status
//! POST   {base_url}/v0/agents/{id}/followup    follow-up prompt
//! GET    {base_url}/v0/agents/{id}/conversation
//! DELETE {base_url}/v0/agents/{id}
//! ```

use async_trait::async_trait;
use serde::Deserialize;

use crate::agent::api::{AgentApi, LaunchRequest, LaunchedAgent};
use crate::error::OrchestratorError;
use crate::models::AgentState;

/// Connection settings for the agent API.
#[derive(Debug, Clone)]
pub struct CursorClientConfig {
    /// API base URL
    pub base_url: String,
    /// Bearer token
    pub api_key: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for CursorClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.cursor.com".to_string(),
            api_key: String::new(),
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AgentBody {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ConversationBody {
    #[serde(default)]
    messages: Vec<ConversationMessage>,
}

#[derive(Debug, Deserialize)]
struct ConversationMessage {
    #[serde(rename = "type", default)]
    message_type: String,
    #[serde(default)]
    text: String,
}

/// `AgentApi` over the Cursor background-agents REST API.
pub struct CursorAgentClient {
    client: reqwest::Client,
    config: CursorClientConfig,
}

impl CursorAgentClient {
    pub fn new(config: CursorClientConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v0/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<String, OrchestratorError> {
        let response = request
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| OrchestratorError::AgentApi(format!("{}: HTTP request failed: {}", what, e)))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            OrchestratorError::AgentApi(format!("{}: failed to read response body: {}", what, e))
        })?;

        if !status.is_success() {
            return Err(OrchestratorError::AgentApi(format!(
                "{}: API returned {}: {}",
                what, status, text
            )));
        }
        Ok(text)
    }

    fn parse_agent(text: &str, what: &str) -> Result<LaunchedAgent, OrchestratorError> {
        let body: AgentBody = serde_json::from_str(text).map_err(|e| {
            OrchestratorError::AgentApi(format!("{}: failed to parse response JSON: {}", what, e))
        })?;
        let status = AgentState::from_str(&body.status).ok_or_else(|| {
            OrchestratorError::AgentApi(format!("{}: unknown agent status '{}'", what, body.status))
        })?;
        Ok(LaunchedAgent {
            id: body.id,
            status,
        })
    }
}

/// Concatenate conversation messages into one transcript, oldest first.
fn render_transcript(body: &ConversationBody) -> String {
    body.messages
        .iter()
        .map(|m| {
            if m.message_type.is_empty() {
                m.text.clone()
            } else {
                format!("[{}]\n{}", m.message_type, m.text)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl AgentApi for CursorAgentClient {
    async fn launch(&self, request: &LaunchRequest) -> Result<LaunchedAgent, OrchestratorError> {
        let mut body = serde_json::json!({
            "prompt": { "text": request.prompt_text },
            "source": { "repository": request.repository },
        });
        if !request.model.is_empty() {
            body["model"] = serde_json::Value::String(request.model.clone());
        }

        tracing::info!(
            "[CursorClient] Launching agent on {} (model: {})",
            request.repository,
            request.model
        );

        let text = self
            .send(self.client.post(self.url("agents")).json(&body), "launch")
            .await?;
        Self::parse_agent(&text, "launch")
    }

    async fn status(&self, agent_id: &str) -> Result<AgentState, OrchestratorError> {
        let text = self
            .send(
                self.client.get(self.url(&format!("agents/{}", agent_id))),
                "status",
            )
            .await
            .map_err(|e| OrchestratorError::Polling(e.to_string()))?;
        Self::parse_agent(&text, "status")
            .map(|agent| agent.status)
            .map_err(|e| OrchestratorError::Polling(e.to_string()))
    }

    async fn follow_up(&self, agent_id: &str, prompt_text: &str) -> Result<(), OrchestratorError> {
        let body = serde_json::json!({ "prompt": { "text": prompt_text } });
        self.send(
            self.client
                .post(self.url(&format!("agents/{}/followup", agent_id)))
                .json(&body),
            "followup",
        )
        .await?;
        Ok(())
    }

    async fn conversation(&self, agent_id: &str) -> Result<String, OrchestratorError> {
        let text = self
            .send(
                self.client
                    .get(self.url(&format!("agents/{}/conversation", agent_id))),
                "conversation",
            )
            .await?;
        let body: ConversationBody = serde_json::from_str(&text).map_err(|e| {
            OrchestratorError::AgentApi(format!("conversation: failed to parse response JSON: {}", e))
        })?;
        Ok(render_transcript(&body))
    }

    async fn delete(&self, agent_id: &str) -> Result<(), OrchestratorError> {
        self.send(
            self.client.delete(self.url(&format!("agents/{}", agent_id))),
            "delete",
        )
        .await?;
        Ok(())
    }
}
