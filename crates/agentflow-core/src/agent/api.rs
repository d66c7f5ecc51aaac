//! The seam between the engine and the external agent service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;
use crate::models::AgentState;

/// What to start a new agent with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LaunchRequest {
    pub prompt_text: String,
    pub model: String,
    pub repository: String,
}

/// Handle returned by a successful launch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LaunchedAgent {
    pub id: String,
    pub status: AgentState,
}

/// Remote operations on long-running coding agents.
///
/// Calls are not retried here; delivery is at-most-once from the engine's
/// point of view.
#[async_trait]
pub trait AgentApi: Send + Sync {
    async fn launch(&self, request: &LaunchRequest) -> Result<LaunchedAgent, OrchestratorError>;

    async fn status(&self, agent_id: &str) -> Result<AgentState, OrchestratorError>;

    async fn follow_up(&self, agent_id: &str, prompt_text: &str) -> Result<(), OrchestratorError>;

    /// Full conversation rendered as one text transcript.
    async fn conversation(&self, agent_id: &str) -> Result<String, OrchestratorError>;

    async fn delete(&self, agent_id: &str) -> Result<(), OrchestratorError>;
}
