//! CLI command implementations.
//!
//! Each submodule backs one top-level command and works on a shared
//! `AppState` built by [`init_state`].

pub mod job;
pub mod poll;

use std::sync::Arc;

use agentflow_core::agent::CursorAgentClient;
use agentflow_core::workflow::YamlWorkflowSource;
use agentflow_core::{AppState, AppStateInner, Database, OrchestratorConfig};

/// Open the SQLite database at `db_path` and wire the engine to the agent
/// REST API and on-disk YAML workflows.
pub fn init_state(db_path: &str, config: &OrchestratorConfig) -> Result<AppState, String> {
    let db = Database::open(db_path)
        .map_err(|e| format!("Failed to open database '{}': {}", db_path, e))?;
    let api = Arc::new(CursorAgentClient::new(config.client_config()));
    Ok(Arc::new(AppStateInner::new(
        db,
        api,
        Arc::new(YamlWorkflowSource::new()),
    )))
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}
