//! Agent Execution Service: agent API calls plus the job-row bookkeeping
//! that must accompany them.

use std::sync::Arc;

use crate::agent::api::{AgentApi, LaunchRequest};
use crate::error::OrchestratorError;
use crate::models::{AgentState, Job, PROMPT_STATUS_SENT, PROMPT_STATUS_UNKNOWN};
use crate::store::JobStore;
use crate::workflow::PromptInfo;

#[derive(Clone)]
pub struct AgentExecutionService {
    api: Arc<dyn AgentApi>,
    store: JobStore,
}

impl AgentExecutionService {
    pub fn new(api: Arc<dyn AgentApi>, store: JobStore) -> Self {
        Self { api, store }
    }

    /// Launch the job's first prompt. Persists the agent id and initial
    /// status, and marks the job's first prompt row `SENT`.
    pub async fn launch(&self, job: &Job, prompt: &PromptInfo) -> Result<String, OrchestratorError> {
        let agent_id = self.launch_with_text(job, &prompt.content).await?;

        let prompts = self.store.find_prompts_by_job_id(&job.job_id).await?;
        let first = prompts
            .iter()
            .find(|p| p.pml_file == prompt.src && p.status == PROMPT_STATUS_UNKNOWN)
            .or_else(|| prompts.first().filter(|p| p.status == PROMPT_STATUS_UNKNOWN));
        if let Some(first) = first {
            self.store
                .save_prompt(&first.clone().with_status(PROMPT_STATUS_SENT))
                .await?;
        }

        Ok(agent_id)
    }

    /// Start a new agent for `job` with arbitrary prompt text and record it
    /// as the job's current agent. Prompt rows are left alone.
    pub async fn launch_with_text(&self, job: &Job, text: &str) -> Result<String, OrchestratorError> {
        let request = LaunchRequest {
            prompt_text: text.to_string(),
            model: job.model.clone(),
            repository: job.repository.clone(),
        };
        let launched = self.api.launch(&request).await?;

        let fresh = self.store.get(&job.job_id).await?;
        self.store
            .save(
                &fresh
                    .with_cursor_agent_id(launched.id.clone())
                    .with_status(launched.status),
            )
            .await?;

        tracing::info!(
            "[AgentService] Job {} launched agent {} ({})",
            job.job_id,
            launched.id,
            launched.status
        );
        Ok(launched.id)
    }

    pub async fn get_status(&self, agent_id: &str) -> Result<AgentState, OrchestratorError> {
        self.api.status(agent_id).await.map_err(|e| match e {
            OrchestratorError::Polling(_) => e,
            other => OrchestratorError::Polling(other.to_string()),
        })
    }

    /// Poll the job's agent, persist the status and return the re-fetched row.
    pub async fn poll_and_persist(&self, job: &Job) -> Result<Job, OrchestratorError> {
        let agent_id = job.cursor_agent_id.as_deref().ok_or_else(|| {
            OrchestratorError::Internal(format!("job {} has no agent to poll", job.job_id))
        })?;
        let status = self.get_status(agent_id).await?;
        self.store.update_status(&job.job_id, status).await?;
        self.store.get(&job.job_id).await
    }

    pub async fn follow_up(&self, agent_id: &str, prompt_text: &str) -> Result<(), OrchestratorError> {
        self.api.follow_up(agent_id, prompt_text).await
    }

    pub async fn conversation_transcript(&self, agent_id: &str) -> Result<String, OrchestratorError> {
        self.api.conversation(agent_id).await
    }

    /// Best effort: a failure is logged and swallowed.
    pub async fn delete_agent(&self, agent_id: &str) {
        if let Err(e) = self.api.delete(agent_id).await {
            tracing::warn!("[AgentService] Failed to delete agent {}: {}", agent_id, e);
        }
    }
}
