//! Core error type for the orchestration engine.
//!
//! `OrchestratorError` is returned by the store, the agent API adapter, the
//! workflow source and the handler internals. Handlers never let it escape
//! their `process` entry point: it is logged there and, for I/O failures on
//! launch or poll, the job is forced to `ERROR`.

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Structural or configuration problem in a workflow definition.
    #[error("Workflow error: {0}")]
    Workflow(String),

    /// Launch, follow-up, transcript or delete call to the agent API failed.
    #[error("Agent API error: {0}")]
    AgentApi(String),

    /// Status poll against the agent API failed.
    #[error("Polling error: {0}")]
    Polling(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Whether this failure should force the job into `ERROR`.
    pub fn is_transient_io(&self) -> bool {
        matches!(self, Self::AgentApi(_) | Self::Polling(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_io_classification() {
        assert!(OrchestratorError::Polling("timeout".into()).is_transient_io());
        assert!(OrchestratorError::AgentApi("502".into()).is_transient_io());
        assert!(!OrchestratorError::Workflow("no sequence".into()).is_transient_io());
        assert!(!OrchestratorError::Database("locked".into()).is_transient_io());
    }
}
