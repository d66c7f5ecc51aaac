//! Fallback relaunch for timed-out jobs.
//!
//! A timeout never cancels the running agent. Instead a second agent is
//! started with the fallback prompt and becomes the job's current agent.
//! `fallback_executed` guards against doing this more than once per episode.

use chrono::Utc;

use crate::error::OrchestratorError;
use crate::models::Job;
use crate::state::AppState;
use crate::workflow::{substitute_input, ParallelWorkflowData, WorkflowData};

/// Outcome of a fan-out fallback over a parallel parent's children.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChildFallbackSummary {
    pub relaunched: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Clone)]
pub struct FallbackExecutor {
    state: AppState,
}

impl FallbackExecutor {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Relaunch `job` with its fallback prompt.
    ///
    /// The source is `job.fallback_src`, else the workflow's. Returns `None`
    /// without side effects when neither is set; otherwise the re-fetched job
    /// with a new agent, a fresh start time and `fallback_executed = true`.
    pub async fn execute_fallback(
        &self,
        job: &Job,
        workflow: &WorkflowData,
        elapsed_millis: u64,
        timeout_millis: u64,
    ) -> Result<Option<Job>, OrchestratorError> {
        let src = match job
            .fallback_src
            .as_deref()
            .or(workflow.fallback_src.as_deref())
        {
            Some(src) => src.to_string(),
            None => {
                tracing::warn!(
                    "[Fallback] Job {} timed out after {}ms (limit {}ms) but has no fallback prompt",
                    job.job_id,
                    elapsed_millis,
                    timeout_millis
                );
                return Ok(None);
            }
        };

        tracing::info!(
            "[Fallback] Job {} timed out after {}ms (limit {}ms), relaunching with '{}'",
            job.job_id,
            elapsed_millis,
            timeout_millis,
            src
        );
        self.relaunch(job, &src).await.map(Some)
    }

    /// Relaunch every unfinished child of `parent` with its fallback prompt,
    /// then mark the parent's `fallback_executed`.
    ///
    /// Each child resolves its own source: child, then sequence, then the
    /// parallel block. One child's failure does not stop the rest.
    pub async fn execute_fallback_for_parallel_children(
        &self,
        parent: &Job,
        parallel: &ParallelWorkflowData,
    ) -> Result<ChildFallbackSummary, OrchestratorError> {
        let store = &self.state.job_store;
        let children = store.find_jobs_by_parent_id(&parent.job_id).await?;
        let mut summary = ChildFallbackSummary::default();

        for child in children.iter().filter(|c| !c.status.is_terminal()) {
            let src = child
                .fallback_src
                .as_deref()
                .or_else(|| parallel.child_fallback_src());
            let Some(src) = src else {
                tracing::warn!(
                    "[Fallback] Child {} of {} has no fallback prompt, leaving it running",
                    child.job_id,
                    parent.job_id
                );
                summary.skipped.push(child.job_id.clone());
                continue;
            };

            match self.relaunch(child, src).await {
                Ok(_) => summary.relaunched.push(child.job_id.clone()),
                Err(e) => {
                    tracing::error!(
                        "[Fallback] Failed to relaunch child {} of {}: {}",
                        child.job_id,
                        parent.job_id,
                        e
                    );
                    summary.failed.push(child.job_id.clone());
                }
            }
        }

        let fresh_parent = store.get(&parent.job_id).await?;
        store.save(&fresh_parent.with_fallback_executed(true)).await?;

        tracing::info!(
            "[Fallback] Parent {}: {} children relaunched, {} skipped, {} failed",
            parent.job_id,
            summary.relaunched.len(),
            summary.skipped.len(),
            summary.failed.len()
        );
        Ok(summary)
    }

    async fn relaunch(&self, job: &Job, src: &str) -> Result<Job, OrchestratorError> {
        let store = &self.state.job_store;
        let mut content = self.state.workflows.load_prompt(&job.path, src)?;
        if let (true, Some(value)) = (job.is_child(), job.result.as_deref()) {
            content = substitute_input(&content, value).0;
        }

        let fresh = store.get(&job.job_id).await?;
        store
            .save(&fresh.with_workflow_start_time(Utc::now()))
            .await?;

        let agent_id = self.state.agents.launch_with_text(job, &content).await?;

        let relaunched = store.get(&job.job_id).await?;
        store.save(&relaunched.with_fallback_executed(true)).await?;

        tracing::info!(
            "[Fallback] Job {} now runs fallback agent {}",
            job.job_id,
            agent_id
        );
        store.get(&job.job_id).await
    }
}
