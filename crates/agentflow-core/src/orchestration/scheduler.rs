//! Polling driver: runs one cycle per unfinished job on every tick.
//!
//! Cycles for the same job never overlap: each job is processed under its
//! entry in `JobLocks`, and a job whose previous cycle still holds the lock
//! is skipped. Different jobs run concurrently up to `max_concurrent_jobs`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedMutexGuard, Semaphore};
use tokio::task::JoinSet;

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::models::{Job, JobType};
use crate::orchestration::child::ChildWorkflowHandler;
use crate::orchestration::parallel::ParallelWorkflowHandler;
use crate::orchestration::sequence::SequenceWorkflowHandler;
use crate::orchestration::CycleOutcome;
use crate::state::AppState;

/// Registry of per-job async mutexes.
#[derive(Clone, Default)]
pub struct JobLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the job's lock if nobody holds it.
    pub fn try_acquire(&self, job_id: &str) -> Option<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.inner.lock().ok()?;
            locks
                .entry(job_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.try_lock_owned().ok()
    }

    /// Drop entries nobody is holding or waiting on.
    pub fn prune(&self) {
        if let Ok(mut locks) = self.inner.lock() {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Counts for one polling cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub dispatched: usize,
    pub skipped_busy: usize,
    pub launched: usize,
    pub failed: usize,
    pub aborted: usize,
}

impl CycleSummary {
    fn record(&mut self, outcome: CycleOutcome) {
        match outcome {
            CycleOutcome::Launched => self.launched += 1,
            CycleOutcome::Failed => self.failed += 1,
            CycleOutcome::Aborted => self.aborted += 1,
            _ => {}
        }
    }
}

#[derive(Clone)]
struct Handlers {
    state: AppState,
    sequence: SequenceWorkflowHandler,
    parallel: ParallelWorkflowHandler,
    child: ChildWorkflowHandler,
}

impl Handlers {
    async fn dispatch(&self, job: Job) -> CycleOutcome {
        if job.is_child() {
            return self.child.process(&job).await;
        }

        let workflow = match self.state.workflows.load(&job.path) {
            Ok(workflow) => workflow,
            Err(e) => {
                tracing::error!(
                    "[Scheduler] Cannot load workflow '{}' for job {}: {}",
                    job.path,
                    job.job_id,
                    e
                );
                return CycleOutcome::Aborted;
            }
        };

        let parallel = match job.job_type {
            Some(JobType::Parallel) => true,
            Some(JobType::Sequence) => false,
            // Legacy rows carry no type; the definition decides.
            None => workflow.is_parallel(),
        };
        if parallel {
            self.parallel.process(&job, &workflow).await
        } else {
            self.sequence.process(&job, &workflow).await
        }
    }
}

pub struct Scheduler {
    handlers: Handlers,
    locks: JobLocks,
    permits: Arc<Semaphore>,
    config: OrchestratorConfig,
}

impl Scheduler {
    pub fn new(state: AppState, config: OrchestratorConfig) -> Self {
        Self {
            handlers: Handlers {
                sequence: SequenceWorkflowHandler::new(state.clone()),
                parallel: ParallelWorkflowHandler::new(state.clone()),
                child: ChildWorkflowHandler::new(state.clone()),
                state,
            },
            locks: JobLocks::new(),
            permits: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
            config,
        }
    }

    pub fn locks(&self) -> &JobLocks {
        &self.locks
    }

    /// One pass over every unfinished job. Returns once all dispatched
    /// cycles have finished.
    pub async fn run_cycle(&self) -> Result<CycleSummary, OrchestratorError> {
        let jobs = self.handlers.state.job_store.find_unfinished_jobs().await?;
        let mut summary = CycleSummary::default();
        let mut tasks = JoinSet::new();

        for job in jobs {
            let Some(guard) = self.locks.try_acquire(&job.job_id) else {
                tracing::debug!(
                    "[Scheduler] Job {} is still busy from an earlier cycle, skipping",
                    job.job_id
                );
                summary.skipped_busy += 1;
                continue;
            };
            let permit = self
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| OrchestratorError::Internal(format!("Semaphore closed: {}", e)))?;

            let handlers = self.handlers.clone();
            summary.dispatched += 1;
            tasks.spawn(async move {
                let _guard = guard;
                let _permit = permit;
                handlers.dispatch(job).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    tracing::error!("[Scheduler] Job task panicked: {}", e);
                    summary.failed += 1;
                }
            }
        }

        self.locks.prune();
        Ok(summary)
    }

    /// Tick every `poll_interval` until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(
            "[Scheduler] Polling every {}s (max {} concurrent jobs)",
            self.config.poll_interval().as_secs(),
            self.config.max_concurrent_jobs
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("[Scheduler] Shutdown requested, stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(summary) => tracing::info!(
                            "[Scheduler] Cycle done: {} dispatched, {} busy, {} launched, {} failed, {} aborted",
                            summary.dispatched,
                            summary.skipped_busy,
                            summary.launched,
                            summary.failed,
                            summary.aborted
                        ),
                        Err(e) => tracing::error!("[Scheduler] Cycle failed: {}", e),
                    }
                }
            }
        }
    }
}
