//! Drives one fan-out child.
//!
//! A child stores no copy of its prompt sequence. Every cycle it is rebuilt
//! from the parent's parallel definition, so template edits reach children
//! that have not finished yet. The flip side: a child whose parent row is
//! gone cannot run.

use crate::error::OrchestratorError;
use crate::models::Job;
use crate::orchestration::advance::PromptAdvancer;
use crate::orchestration::fallback::FallbackExecutor;
use crate::orchestration::timeout::{TimeoutAction, TimeoutManager};
use crate::orchestration::{handle_cycle_error, CycleOutcome};
use crate::state::AppState;
use crate::workflow::{substitute_input, PromptInfo, WorkflowData};

#[derive(Clone)]
pub struct ChildWorkflowHandler {
    state: AppState,
    timeouts: TimeoutManager,
    fallback: FallbackExecutor,
    advancer: PromptAdvancer,
}

impl ChildWorkflowHandler {
    pub fn new(state: AppState) -> Self {
        Self {
            timeouts: TimeoutManager::new(state.job_store.clone()),
            fallback: FallbackExecutor::new(state.clone()),
            advancer: PromptAdvancer::new(state.clone()),
            state,
        }
    }

    pub async fn process(&self, job: &Job) -> CycleOutcome {
        match self.run_cycle(job).await {
            Ok(outcome) => outcome,
            Err(e) => handle_cycle_error(&self.state, "ChildHandler", job, e).await,
        }
    }

    /// The child's effective sequential workflow, derived from its parent.
    pub async fn effective_workflow(&self, job: &Job) -> Result<WorkflowData, OrchestratorError> {
        let parent_id = job.parent_job_id.as_deref().ok_or_else(|| {
            OrchestratorError::Workflow(format!("job {} is not a child job", job.job_id))
        })?;
        let parent = self
            .state
            .job_store
            .find_by_id(parent_id)
            .await?
            .ok_or_else(|| {
                OrchestratorError::Workflow(format!(
                    "parent {} of child {} no longer exists",
                    parent_id, job.job_id
                ))
            })?;
        self.state.workflows.load(&parent.path)?.child_workflow()
    }

    async fn run_cycle(&self, job: &Job) -> Result<CycleOutcome, OrchestratorError> {
        let workflow = self.effective_workflow(job).await?;
        let bound_value = job.result.clone().unwrap_or_default();

        if !job.is_launched() && job.status.is_terminal() {
            tracing::debug!(
                "[ChildHandler] Job {} failed before its first launch, not relaunching",
                job.job_id
            );
            return Ok(CycleOutcome::Idle);
        }

        if !job.is_launched() {
            let launch = workflow.launch_prompt()?;
            let (content, found) = substitute_input(&launch.content, &bound_value);
            if !found {
                tracing::warn!(
                    "[ChildHandler] Launch prompt '{}' of child {} has no input marker; sending it unchanged",
                    launch.src,
                    job.job_id
                );
            }
            let job = self.timeouts.reset_start_time_for_launch(job).await?;
            self.state
                .agents
                .launch(&job, &PromptInfo::new(launch.src.clone(), content))
                .await?;
            return Ok(CycleOutcome::Launched);
        }

        let inherited_timeout = job.timeout_millis.or(workflow.timeout_millis);
        let with_timeout = |j: Job| Job {
            timeout_millis: inherited_timeout,
            ..j
        };

        let mut job = with_timeout(
            self.timeouts
                .heal_stale_start_time(&with_timeout(job.clone()))
                .await?,
        );
        let mut outcome = CycleOutcome::Polled;

        let check = TimeoutManager::check_timeout(&job);
        match TimeoutAction::decide(&job, &check) {
            TimeoutAction::Continue => {}
            TimeoutAction::Stop => return Ok(CycleOutcome::Idle),
            TimeoutAction::Fallback => {
                let timeout = check.timeout_millis.unwrap_or_default();
                if let Some(relaunched) = self
                    .fallback
                    .execute_fallback(&job, &workflow, check.elapsed_millis, timeout)
                    .await?
                {
                    job = relaunched;
                    outcome = CycleOutcome::FallbackLaunched;
                }
            }
        }

        let job = self.state.agents.poll_and_persist(&job).await?;
        if job.status.is_successful() {
            let advanced = self
                .advancer
                .advance(&job, &workflow, Some(&bound_value))
                .await?;
            return Ok(CycleOutcome::from(advanced));
        }
        if job.status.is_failed() {
            tracing::info!(
                "[ChildHandler] Child {} (value {}) agent ended in {}",
                job.job_id,
                bound_value,
                job.status
            );
        }
        Ok(outcome)
    }
}
