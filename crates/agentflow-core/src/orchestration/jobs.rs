//! Creating and deleting top-level jobs.

use crate::error::OrchestratorError;
use crate::models::{Job, JobType, Prompt};
use crate::state::AppState;

#[derive(Clone)]
pub struct JobService {
    state: AppState,
}

impl JobService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Register a job for the workflow at `path`. The job starts in
    /// `CREATING` with no agent; the scheduler launches it on its next cycle.
    pub async fn create_job(&self, path: &str) -> Result<Job, OrchestratorError> {
        let workflow = self.state.workflows.load(path)?;
        let job_type = if workflow.is_parallel() {
            JobType::Parallel
        } else {
            JobType::Sequence
        };

        let mut job = Job::new(
            path.to_string(),
            workflow.model.clone(),
            workflow.repository.clone(),
            job_type,
        );
        job.timeout_millis = workflow
            .timeout_millis
            .or_else(|| workflow.parallel.as_ref().and_then(|p| p.timeout_millis));
        job.fallback_src = workflow.fallback_src.clone();

        let store = &self.state.job_store;
        store.save(&job).await?;
        for prompt in workflow.template_prompts() {
            store
                .save_prompt(&Prompt::new(job.job_id.clone(), prompt.src.clone()))
                .await?;
        }

        tracing::info!(
            "[JobService] Created {} job {} for {}",
            job_type.as_str(),
            job.job_id,
            path
        );
        Ok(job)
    }

    /// Delete a job, its children and their prompt rows. Agents are deleted
    /// best effort and never block row deletion.
    pub async fn delete_job(&self, job_id: &str) -> Result<usize, OrchestratorError> {
        let store = &self.state.job_store;
        let job = store.get(job_id).await?;

        let mut doomed = store.find_jobs_by_parent_id(job_id).await?;
        doomed.push(job);

        for job in &doomed {
            if let Some(agent_id) = job.cursor_agent_id.as_deref() {
                self.state.agents.delete_agent(agent_id).await;
            }
            store.delete_prompts_by_job_id(&job.job_id).await?;
            store.delete_by_id(&job.job_id).await?;
        }

        tracing::info!(
            "[JobService] Deleted job {} ({} rows including children)",
            job_id,
            doomed.len()
        );
        Ok(doomed.len())
    }
}
