//! Where workflow definitions and fallback prompt content come from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::OrchestratorError;
use crate::workflow::schema::WorkflowData;

/// Resolves a job's `path` into its workflow definition.
///
/// Handlers call this every cycle, so edits to a workflow file take effect
/// on running jobs at their next poll.
pub trait WorkflowSource: Send + Sync {
    fn load(&self, path: &str) -> Result<WorkflowData, OrchestratorError>;

    /// Content of a prompt referenced by `src` from the workflow at `path`.
    fn load_prompt(&self, path: &str, src: &str) -> Result<String, OrchestratorError>;
}

/// Reads YAML workflow files from disk. Prompt `src` values are relative to
/// the workflow file's directory.
#[derive(Debug, Clone, Default)]
pub struct YamlWorkflowSource;

impl YamlWorkflowSource {
    pub fn new() -> Self {
        Self
    }

    fn resolve(path: &str, src: &str) -> PathBuf {
        let src_path = Path::new(src);
        if src_path.is_absolute() {
            return src_path.to_path_buf();
        }
        Path::new(path)
            .parent()
            .map(|dir| dir.join(src_path))
            .unwrap_or_else(|| src_path.to_path_buf())
    }
}

impl WorkflowSource for YamlWorkflowSource {
    fn load(&self, path: &str) -> Result<WorkflowData, OrchestratorError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Workflow(format!("Failed to read workflow file '{}': {}", path, e))
        })?;
        let mut data = WorkflowData::from_yaml(&content)?;
        for prompt in data.prompts_mut() {
            if prompt.content.is_empty() {
                prompt.content = self.load_prompt(path, &prompt.src)?;
            }
        }
        Ok(data)
    }

    fn load_prompt(&self, path: &str, src: &str) -> Result<String, OrchestratorError> {
        let resolved = Self::resolve(path, src);
        std::fs::read_to_string(&resolved).map_err(|e| {
            OrchestratorError::Workflow(format!(
                "Failed to read prompt '{}': {}",
                resolved.display(),
                e
            ))
        })
    }
}

/// Workflows registered in memory, keyed by path. Useful for embedding the
/// engine where definitions are produced programmatically.
#[derive(Default)]
pub struct InMemoryWorkflowSource {
    workflows: RwLock<HashMap<String, WorkflowData>>,
    prompts: RwLock<HashMap<String, String>>,
}

impl InMemoryWorkflowSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, workflow: WorkflowData) {
        if let Ok(mut workflows) = self.workflows.write() {
            workflows.insert(path.to_string(), workflow);
        }
    }

    pub fn remove(&self, path: &str) {
        if let Ok(mut workflows) = self.workflows.write() {
            workflows.remove(path);
        }
    }

    /// Register prompt content by `src`, shared across all workflows.
    pub fn insert_prompt(&self, src: &str, content: &str) {
        if let Ok(mut prompts) = self.prompts.write() {
            prompts.insert(src.to_string(), content.to_string());
        }
    }
}

impl WorkflowSource for InMemoryWorkflowSource {
    fn load(&self, path: &str) -> Result<WorkflowData, OrchestratorError> {
        self.workflows
            .read()
            .map_err(|e| OrchestratorError::Internal(format!("Lock poisoned: {}", e)))?
            .get(path)
            .cloned()
            .ok_or_else(|| OrchestratorError::Workflow(format!("Unknown workflow '{}'", path)))
    }

    fn load_prompt(&self, _path: &str, src: &str) -> Result<String, OrchestratorError> {
        self.prompts
            .read()
            .map_err(|e| OrchestratorError::Internal(format!("Lock poisoned: {}", e)))?
            .get(src)
            .cloned()
            .ok_or_else(|| OrchestratorError::Workflow(format!("Unknown prompt '{}'", src)))
    }
}
