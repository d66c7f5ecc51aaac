//! agentflow core: orchestration of long-running external coding agents.
//!
//! A job runs a workflow: either a sequential chain of prompts sent to one
//! agent, or a parallel workflow whose single run returns a list that fans
//! out into child jobs sharing one prompt template. The engine is a set of
//! per-job handlers called once per polling cycle; it launches agents, polls
//! their status, relaunches timed-out jobs with a fallback prompt and creates
//! child jobs from extracted results.
//!
//! This crate has no CLI dependency, so it can be embedded in other hosts.

pub mod agent;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod orchestration;
pub mod state;
pub mod store;
pub mod workflow;

// Convenience re-exports
pub use config::OrchestratorConfig;
pub use db::Database;
pub use error::OrchestratorError;
pub use state::{AppState, AppStateInner};
