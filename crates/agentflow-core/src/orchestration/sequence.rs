//! Drives a standalone sequential job, one polling cycle per call.

use crate::error::OrchestratorError;
use crate::models::Job;
use crate::orchestration::advance::PromptAdvancer;
use crate::orchestration::fallback::FallbackExecutor;
use crate::orchestration::timeout::{TimeoutAction, TimeoutManager};
use crate::orchestration::{handle_cycle_error, CycleOutcome};
use crate::state::AppState;
use crate::workflow::WorkflowData;

#[derive(Clone)]
pub struct SequenceWorkflowHandler {
    state: AppState,
    timeouts: TimeoutManager,
    fallback: FallbackExecutor,
    advancer: PromptAdvancer,
}

impl SequenceWorkflowHandler {
    pub fn new(state: AppState) -> Self {
        Self {
            timeouts: TimeoutManager::new(state.job_store.clone()),
            fallback: FallbackExecutor::new(state.clone()),
            advancer: PromptAdvancer::new(state.clone()),
            state,
        }
    }

    /// Run one cycle for `job`. Never fails: errors are logged here, and
    /// agent I/O failures force the job to `ERROR`.
    pub async fn process(&self, job: &Job, workflow: &WorkflowData) -> CycleOutcome {
        match self.run_cycle(job, workflow).await {
            Ok(outcome) => outcome,
            Err(e) => handle_cycle_error(&self.state, "SequenceHandler", job, e).await,
        }
    }

    async fn run_cycle(
        &self,
        job: &Job,
        workflow: &WorkflowData,
    ) -> Result<CycleOutcome, OrchestratorError> {
        if !job.is_launched() && job.status.is_terminal() {
            tracing::debug!(
                "[SequenceHandler] Job {} failed before its first launch, not relaunching",
                job.job_id
            );
            return Ok(CycleOutcome::Idle);
        }

        if !job.is_launched() {
            let prompt = workflow.launch_prompt()?;
            let job = self.timeouts.reset_start_time_for_launch(job).await?;
            self.state.agents.launch(&job, prompt).await?;
            // Not polled until the next cycle.
            return Ok(CycleOutcome::Launched);
        }

        let mut job = self.timeouts.heal_stale_start_time(job).await?;
        let mut outcome = CycleOutcome::Polled;

        let check = TimeoutManager::check_timeout(&job);
        match TimeoutAction::decide(&job, &check) {
            TimeoutAction::Continue => {}
            TimeoutAction::Stop => {
                tracing::debug!(
                    "[SequenceHandler] Job {} timed out with nothing left to do",
                    job.job_id
                );
                return Ok(CycleOutcome::Idle);
            }
            TimeoutAction::Fallback => {
                let timeout = check.timeout_millis.unwrap_or_default();
                if let Some(relaunched) = self
                    .fallback
                    .execute_fallback(&job, workflow, check.elapsed_millis, timeout)
                    .await?
                {
                    job = relaunched;
                    outcome = CycleOutcome::FallbackLaunched;
                }
            }
        }

        let job = self.state.agents.poll_and_persist(&job).await?;
        if job.status.is_successful() {
            let advanced = self.advancer.advance(&job, workflow, None).await?;
            return Ok(CycleOutcome::from(advanced));
        }
        if job.status.is_failed() {
            tracing::info!(
                "[SequenceHandler] Job {} agent ended in {}",
                job.job_id,
                job.status
            );
        }
        Ok(outcome)
    }
}
