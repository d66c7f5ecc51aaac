//! `agentflow poll | run`: drive the scheduler.

use agentflow_core::orchestration::{CycleSummary, Scheduler};
use agentflow_core::{AppState, OrchestratorConfig};

/// Run exactly one polling cycle.
pub async fn once(state: &AppState, config: &OrchestratorConfig) -> Result<CycleSummary, String> {
    let summary = Scheduler::new(state.clone(), config.clone())
        .run_cycle()
        .await
        .map_err(|e| e.to_string())?;
    println!(
        "Cycle: {} dispatched, {} busy, {} launched, {} failed, {} aborted",
        summary.dispatched,
        summary.skipped_busy,
        summary.launched,
        summary.failed,
        summary.aborted
    );
    Ok(summary)
}

/// Poll until Ctrl-C.
pub async fn run(state: &AppState, config: &OrchestratorConfig) -> Result<(), String> {
    let scheduler = Scheduler::new(state.clone(), config.clone());
    scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("[agentflow] Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(())
}
