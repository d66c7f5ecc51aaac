//! The orchestration engine: per-job handlers driven by the polling scheduler.
//!
//! ```text
//! Scheduler (tick) ──► find_unfinished_jobs ──► JobLocks ──► dispatch
//!                                                            │
//!        ┌───────────────────────┬───────────────────────────┤
//!  SequenceWorkflowHandler  ParallelWorkflowHandler   ChildWorkflowHandler
//!        │                       │  │                        │
//!        │                       │  └─ ResultExtractor ──► child jobs
//!        └── TimeoutManager ─ FallbackExecutor ─ PromptAdvancer ──┘
//! ```
//!
//! Each handler call is one polling cycle for one job. Handlers treat their
//! `Job` as a possibly-stale snapshot and re-fetch after every write.

pub mod advance;
pub mod child;
pub mod fallback;
pub mod jobs;
pub mod parallel;
pub mod result_extractor;
pub mod scheduler;
pub mod sequence;
pub mod timeout;

pub use advance::{AdvanceOutcome, PromptAdvancer};
pub use child::ChildWorkflowHandler;
pub use fallback::{ChildFallbackSummary, FallbackExecutor};
pub use jobs::JobService;
pub use parallel::ParallelWorkflowHandler;
pub use result_extractor::{BoundValue, ResultExtractor, ResultType};
pub use scheduler::{CycleSummary, JobLocks, Scheduler};
pub use sequence::SequenceWorkflowHandler;
pub use timeout::{TimeoutAction, TimeoutCheck, TimeoutManager};

use crate::error::OrchestratorError;
use crate::models::{AgentState, Job};
use crate::state::AppState;

/// What one polling cycle did for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// First launch; status is not polled until the next cycle.
    Launched,
    /// Status polled, nothing else to do yet.
    Polled,
    /// Timeout fired and a fallback agent was started.
    FallbackLaunched,
    /// Agent finished a turn and the next update prompt was sent.
    Advanced,
    /// Agent finished the last prompt.
    Completed,
    /// Parallel parent fanned out this many children.
    ChildrenCreated(usize),
    /// Nothing to do this cycle.
    Idle,
    /// Cycle aborted; the job was left unchanged.
    Aborted,
    /// The job was forced to `ERROR`.
    Failed,
}

impl From<AdvanceOutcome> for CycleOutcome {
    fn from(outcome: AdvanceOutcome) -> Self {
        match outcome {
            AdvanceOutcome::Sent { .. } => Self::Advanced,
            AdvanceOutcome::Completed => Self::Completed,
        }
    }
}

/// The per-job error boundary shared by all handlers.
///
/// Agent I/O failures force the job to `ERROR`; anything else (bad workflow,
/// missing parent, store hiccup) aborts the cycle and leaves the job as is.
pub(crate) async fn handle_cycle_error(
    state: &AppState,
    handler: &str,
    job: &Job,
    error: OrchestratorError,
) -> CycleOutcome {
    if !error.is_transient_io() {
        tracing::error!("[{}] Cycle aborted for job {}: {}", handler, job.job_id, error);
        return CycleOutcome::Aborted;
    }

    tracing::error!(
        "[{}] Agent call failed for job {}, marking it {}: {}",
        handler,
        job.job_id,
        AgentState::Error,
        error
    );
    if let Err(e) = state
        .job_store
        .update_status(&job.job_id, AgentState::Error)
        .await
    {
        tracing::error!(
            "[{}] Failed to mark job {} as {}: {}",
            handler,
            job.job_id,
            AgentState::Error,
            e
        );
    }
    CycleOutcome::Failed
}
