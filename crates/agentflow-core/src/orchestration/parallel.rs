//! Drives a fan-out parent: launch, poll, extract the result list and
//! create one child job per element.

use crate::error::OrchestratorError;
use crate::models::{
    AgentState, Job, JobType, Prompt, PROMPT_STATUS_COMPLETED, PROMPT_STATUS_SENT,
};
use crate::orchestration::fallback::FallbackExecutor;
use crate::orchestration::result_extractor::{BoundValue, ResultExtractor};
use crate::orchestration::timeout::{TimeoutAction, TimeoutManager};
use crate::orchestration::{handle_cycle_error, CycleOutcome};
use crate::state::AppState;
use crate::workflow::{ParallelWorkflowData, SequenceInfo, WorkflowData};

#[derive(Clone)]
pub struct ParallelWorkflowHandler {
    state: AppState,
    timeouts: TimeoutManager,
    fallback: FallbackExecutor,
    extractor: ResultExtractor,
}

impl ParallelWorkflowHandler {
    pub fn new(state: AppState) -> Self {
        Self {
            timeouts: TimeoutManager::new(state.job_store.clone()),
            fallback: FallbackExecutor::new(state.clone()),
            extractor: ResultExtractor::new(state.clone()),
            state,
        }
    }

    pub async fn process(&self, job: &Job, workflow: &WorkflowData) -> CycleOutcome {
        match self.run_cycle(job, workflow).await {
            Ok(outcome) => outcome,
            Err(e) => handle_cycle_error(&self.state, "ParallelHandler", job, e).await,
        }
    }

    async fn run_cycle(
        &self,
        job: &Job,
        workflow: &WorkflowData,
    ) -> Result<CycleOutcome, OrchestratorError> {
        let parallel = workflow.parallel()?;
        let sequence = parallel.primary_sequence()?;

        if !job.is_launched() && job.status.is_terminal() {
            tracing::debug!(
                "[ParallelHandler] Job {} failed before its first launch, not relaunching",
                job.job_id
            );
            return Ok(CycleOutcome::Idle);
        }

        if !job.is_launched() {
            let job = self.timeouts.reset_start_time_for_launch(job).await?;
            self.state
                .agents
                .launch(&job, &parallel.parallel_prompt)
                .await?;
            return Ok(CycleOutcome::Launched);
        }

        let job = self.timeouts.heal_stale_start_time(job).await?;

        let check = TimeoutManager::check_timeout(&job);
        match TimeoutAction::decide(&job, &check) {
            TimeoutAction::Continue => {}
            TimeoutAction::Stop => return Ok(CycleOutcome::Idle),
            TimeoutAction::Fallback => {
                tracing::info!(
                    "[ParallelHandler] Parent {} timed out after {}ms, falling back on its children",
                    job.job_id,
                    check.elapsed_millis
                );
                self.fallback
                    .execute_fallback_for_parallel_children(&job, parallel)
                    .await?;
                return Ok(CycleOutcome::FallbackLaunched);
            }
        }

        if job.status.is_terminal() {
            return Ok(CycleOutcome::Idle);
        }

        let job = self.state.agents.poll_and_persist(&job).await?;
        if job.status.is_active() {
            return Ok(CycleOutcome::Polled);
        }
        if job.status.is_failed() {
            tracing::warn!(
                "[ParallelHandler] Parent {} agent ended in {}, no children created",
                job.job_id,
                job.status
            );
            return Ok(CycleOutcome::Polled);
        }

        let Some(values) = self.extractor.extract_results(&job, parallel).await? else {
            self.state
                .job_store
                .update_status(&job.job_id, AgentState::Error)
                .await?;
            return Ok(CycleOutcome::Failed);
        };

        let created = self.create_children(&job, parallel, sequence, &values).await;
        self.complete_parallel_prompt(&job).await?;

        tracing::info!(
            "[ParallelHandler] Parent {} fanned out {}/{} children",
            job.job_id,
            created,
            values.len()
        );
        Ok(CycleOutcome::ChildrenCreated(created))
    }

    /// Create one child per value; returns how many succeeded.
    async fn create_children(
        &self,
        parent: &Job,
        parallel: &ParallelWorkflowData,
        sequence: &SequenceInfo,
        values: &[BoundValue],
    ) -> usize {
        let mut created = 0;
        for (i, value) in values.iter().enumerate() {
            match self.create_child(parent, parallel, sequence, value).await {
                Ok(child) => {
                    tracing::debug!(
                        "[ParallelHandler] Child {} of {} bound to {}",
                        child.job_id,
                        parent.job_id,
                        value
                    );
                    created += 1;
                }
                Err(e) => {
                    tracing::error!(
                        "[ParallelHandler] Failed to create child {} ({}) of {}: {}",
                        i,
                        value,
                        parent.job_id,
                        e
                    );
                }
            }
        }
        created
    }

    async fn create_child(
        &self,
        parent: &Job,
        parallel: &ParallelWorkflowData,
        sequence: &SequenceInfo,
        value: &BoundValue,
    ) -> Result<Job, OrchestratorError> {
        let store = &self.state.job_store;

        let mut child = Job::new(
            parent.path.clone(),
            sequence.model.clone().unwrap_or_else(|| parent.model.clone()),
            sequence
                .repository
                .clone()
                .unwrap_or_else(|| parent.repository.clone()),
            JobType::Sequence,
        );
        child.parent_job_id = Some(parent.job_id.clone());
        child.result = Some(value.to_string());
        child.timeout_millis = parallel.child_timeout_millis();
        child.fallback_src = parallel.child_fallback_src().map(str::to_string);

        store.save(&child).await?;
        for prompt in &sequence.prompts {
            store
                .save_prompt(&Prompt::new(child.job_id.clone(), prompt.src.clone()))
                .await?;
        }
        Ok(child)
    }

    async fn complete_parallel_prompt(&self, parent: &Job) -> Result<(), OrchestratorError> {
        let store = &self.state.job_store;
        for prompt in store.find_prompts_by_job_id(&parent.job_id).await? {
            if prompt.status == PROMPT_STATUS_SENT {
                store
                    .save_prompt(&prompt.with_status(PROMPT_STATUS_COMPLETED))
                    .await?;
            }
        }
        Ok(())
    }
}
