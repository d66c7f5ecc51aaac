//! Elapsed-time bookkeeping for timeouts.
//!
//! The clock starts at `workflow_start_time`, stamped right before every
//! launch or fallback relaunch, so a job's age in the store does not count
//! against its timeout.

use chrono::{DateTime, Utc};

use crate::error::OrchestratorError;
use crate::models::Job;
use crate::store::JobStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutCheck {
    pub reached: bool,
    pub elapsed_millis: u64,
    pub timeout_millis: Option<u64>,
}

/// What a handler does about a timeout this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutAction {
    /// Not timed out (or no timeout configured): carry on polling.
    Continue,
    /// Timed out but the job is terminal or already fell back: do nothing.
    Stop,
    /// Timed out for the first time this episode: run the fallback.
    Fallback,
}

impl TimeoutAction {
    pub fn decide(job: &Job, check: &TimeoutCheck) -> Self {
        if !job.is_launched() || !check.reached {
            Self::Continue
        } else if job.status.is_terminal() || job.fallback_already_executed() {
            Self::Stop
        } else {
            Self::Fallback
        }
    }
}

#[derive(Clone)]
pub struct TimeoutManager {
    store: JobStore,
}

impl TimeoutManager {
    pub fn new(store: JobStore) -> Self {
        Self { store }
    }

    /// Milliseconds since `workflow_start_time`, or `None` when it is unset.
    pub fn elapsed(job: &Job) -> Option<u64> {
        Self::elapsed_at(job, Utc::now())
    }

    pub fn elapsed_at(job: &Job, now: DateTime<Utc>) -> Option<u64> {
        job.workflow_start_time
            .map(|start| (now - start).num_milliseconds().max(0) as u64)
    }

    pub fn check_timeout(job: &Job) -> TimeoutCheck {
        Self::check_timeout_at(job, Utc::now())
    }

    pub fn check_timeout_at(job: &Job, now: DateTime<Utc>) -> TimeoutCheck {
        let elapsed_millis = Self::elapsed_at(job, now).unwrap_or(0);
        let reached = match (job.timeout_millis, job.workflow_start_time) {
            (Some(timeout), Some(_)) => elapsed_millis >= timeout,
            _ => false,
        };
        TimeoutCheck {
            reached,
            elapsed_millis,
            timeout_millis: job.timeout_millis,
        }
    }

    /// Stamp `workflow_start_time = now` ahead of a (re)launch and return the
    /// re-fetched job.
    pub async fn reset_start_time_for_launch(&self, job: &Job) -> Result<Job, OrchestratorError> {
        let fresh = self.store.get(&job.job_id).await?;
        self.store
            .save(&fresh.with_workflow_start_time(Utc::now()))
            .await?;
        self.store.get(&job.job_id).await
    }

    /// A launched job with a timeout but no start time (rows written before
    /// start times were tracked) gets its clock started now instead of being
    /// exempt from timeout forever. `job.timeout_millis` is taken as given,
    /// so callers may pass an inherited timeout.
    pub async fn heal_stale_start_time(&self, job: &Job) -> Result<Job, OrchestratorError> {
        if !job.is_launched() || job.timeout_millis.is_none() || job.workflow_start_time.is_some() {
            return Ok(job.clone());
        }
        tracing::info!(
            "[Timeout] Job {} has a timeout but no start time; starting the clock now",
            job.job_id
        );
        let fresh = self.store.get(&job.job_id).await?;
        self.store
            .save(&fresh.with_workflow_start_time(Utc::now()))
            .await?;
        self.store.get(&job.job_id).await
    }
}
