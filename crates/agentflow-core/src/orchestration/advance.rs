//! Moves a job to its next update prompt once the agent finishes a turn.

use crate::error::OrchestratorError;
use crate::models::{
    AgentState, Job, PROMPT_STATUS_COMPLETED, PROMPT_STATUS_SENT, PROMPT_STATUS_UNKNOWN,
};
use crate::state::AppState;
use crate::workflow::{substitute_input, WorkflowData};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// A follow-up was sent; the job is back in `RUNNING`.
    Sent { src: String },
    /// Every prompt has been sent; the job stays finished.
    Completed,
}

#[derive(Clone)]
pub struct PromptAdvancer {
    state: AppState,
}

impl PromptAdvancer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Close out the prompt the agent just finished and send the next one.
    ///
    /// Prompt rows line up with `workflow.template_prompts()`: row 0 is the
    /// launch prompt, row `i` is `update_prompts[i - 1]`. For fan-out children
    /// `bound_value` is substituted into the follow-up.
    ///
    /// The caller has already persisted `FINISHED`. If advancing fails for a
    /// reason other than agent I/O the job is put back to `RUNNING`, so it
    /// stays unfinished and the advance is retried next cycle.
    pub async fn advance(
        &self,
        job: &Job,
        workflow: &WorkflowData,
        bound_value: Option<&str>,
    ) -> Result<AdvanceOutcome, OrchestratorError> {
        match self.try_advance(job, workflow, bound_value).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_transient_io() => Err(e),
            Err(e) => {
                if let Err(reopen) = self
                    .state
                    .job_store
                    .update_status(&job.job_id, AgentState::Running)
                    .await
                {
                    tracing::error!(
                        "[PromptAdvancer] Could not reopen job {} after failed advance: {}",
                        job.job_id,
                        reopen
                    );
                }
                Err(e)
            }
        }
    }

    async fn try_advance(
        &self,
        job: &Job,
        workflow: &WorkflowData,
        bound_value: Option<&str>,
    ) -> Result<AdvanceOutcome, OrchestratorError> {
        let store = &self.state.job_store;
        let agent_id = job.cursor_agent_id.as_deref().ok_or_else(|| {
            OrchestratorError::Internal(format!("job {} has no agent to follow up", job.job_id))
        })?;

        let mut prompts = store.find_prompts_by_job_id(&job.job_id).await?;
        for (index, prompt) in prompts.iter_mut().enumerate() {
            let launch_never_marked = index == 0 && prompt.status == PROMPT_STATUS_UNKNOWN;
            if prompt.status == PROMPT_STATUS_SENT || launch_never_marked {
                *prompt = prompt.clone().with_status(PROMPT_STATUS_COMPLETED);
                store.save_prompt(prompt).await?;
            }
        }

        let Some(index) = prompts
            .iter()
            .position(|p| p.status == PROMPT_STATUS_UNKNOWN)
        else {
            tracing::info!(
                "[PromptAdvancer] Job {} completed all {} prompts",
                job.job_id,
                prompts.len()
            );
            return Ok(AdvanceOutcome::Completed);
        };

        let update = index
            .checked_sub(1)
            .and_then(|i| workflow.update_prompts.get(i))
            .ok_or_else(|| {
                OrchestratorError::Workflow(format!(
                    "job {} has prompt row {} ('{}') but the workflow has only {} update prompts",
                    job.job_id,
                    index,
                    prompts[index].pml_file,
                    workflow.update_prompts.len()
                ))
            })?;

        let content = match bound_value {
            Some(value) => substitute_input(&update.content, value).0,
            None => update.content.clone(),
        };

        self.state.agents.follow_up(agent_id, &content).await?;

        store
            .save_prompt(&prompts[index].clone().with_status(PROMPT_STATUS_SENT))
            .await?;
        let fresh = store.get(&job.job_id).await?;
        store.save(&fresh.with_status(AgentState::Running)).await?;

        tracing::info!(
            "[PromptAdvancer] Job {} sent update prompt {}/{} ('{}')",
            job.job_id,
            index,
            workflow.update_prompts.len(),
            update.src
        );
        Ok(AdvanceOutcome::Sent {
            src: update.src.clone(),
        })
    }
}
