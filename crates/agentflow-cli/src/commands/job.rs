//! `agentflow add | list | delete`: job bookkeeping.

use std::path::Path;

use agentflow_core::models::{AgentState, Job};
use agentflow_core::orchestration::JobService;
use agentflow_core::AppState;

use super::print_json;

/// Register a job for the workflow file at `workflow_file`.
///
/// The path is stored absolute so `agentflow run` can resolve it from any
/// working directory.
pub async fn add(state: &AppState, workflow_file: &str) -> Result<Job, String> {
    let path = std::fs::canonicalize(Path::new(workflow_file))
        .map_err(|e| format!("Cannot resolve workflow '{}': {}", workflow_file, e))?;
    let path = path.to_string_lossy().to_string();

    let job = JobService::new(state.clone())
        .create_job(&path)
        .await
        .map_err(|e| e.to_string())?;

    println!("Created job {} ({})", job.job_id, path);
    Ok(job)
}

/// Jobs filtered by status name (case-insensitive), or all of them.
pub async fn list(state: &AppState, status: Option<&str>) -> Result<Vec<Job>, String> {
    let filter = match status {
        Some(s) => Some(AgentState::from_str(s).ok_or_else(|| {
            format!(
                "Unknown status '{}', expected one of: {}",
                s,
                AgentState::ALL
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })?),
        None => None,
    };

    let jobs: Vec<Job> = state
        .job_store
        .list_all()
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .filter(|job| filter.map_or(true, |s| job.status == s))
        .collect();

    print_json(&serde_json::json!({ "jobs": jobs }));
    Ok(jobs)
}

/// Delete a job together with its children and prompt rows.
pub async fn delete(state: &AppState, job_id: &str) -> Result<usize, String> {
    let removed = JobService::new(state.clone())
        .delete_job(job_id)
        .await
        .map_err(|e| e.to_string())?;
    println!("Deleted {} job(s)", removed);
    Ok(removed)
}
