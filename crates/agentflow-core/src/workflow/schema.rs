//! Workflow definition types.
//!
//! A workflow file is YAML. A sequential workflow names a launch prompt and
//! ordered update prompts; a parallel workflow adds a `parallel` block whose
//! single run yields a list that fans out into child jobs:
//!
//! ```yaml
//! model: "claude-4-sonnet"
//! repository: "https://github.com/acme/app"
//! timeout_millis: 1800000
//! fallback: "prompts/fallback.md"
//!
//! launch:
//!   src: "prompts/plan.md"
//! updates:
//!   - src: "prompts/implement.md"
//!   - src: "prompts/review.md"
//!     content: "Review your own diff and fix what you find."
//!
//! parallel:
//!   prompt:
//!     src: "prompts/split.md"
//!   bind_result_type: "List_Integer"
//!   sequences:
//!     - model: "claude-4-sonnet"
//!       prompts:
//!         - src: "prompts/fix_issue.md"
//!         - src: "prompts/open_pr.md"
//! ```
//!
//! Prompts without inline `content` are read from `src`, relative to the
//! workflow file (see `YamlWorkflowSource`).

use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;

/// One template prompt: its source name and the text sent to the agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptInfo {
    pub src: String,
    #[serde(default)]
    pub content: String,
}

impl PromptInfo {
    pub fn new(src: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            content: content.into(),
        }
    }
}

/// A prompt-sequence template shared by every child of a parallel run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SequenceInfo {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub prompts: Vec<PromptInfo>,
    #[serde(default)]
    pub timeout_millis: Option<u64>,
    #[serde(default, rename = "fallback")]
    pub fallback_src: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelWorkflowData {
    #[serde(rename = "prompt")]
    pub parallel_prompt: PromptInfo,
    pub bind_result_type: String,
    #[serde(default)]
    pub sequences: Vec<SequenceInfo>,
    #[serde(default)]
    pub timeout_millis: Option<u64>,
    #[serde(default, rename = "fallback")]
    pub fallback_src: Option<String>,
}

impl ParallelWorkflowData {
    /// The template honored for fan-out. Only the first sequence is used.
    pub fn primary_sequence(&self) -> Result<&SequenceInfo, OrchestratorError> {
        let sequence = self.sequences.first().ok_or_else(|| {
            OrchestratorError::Workflow("parallel workflow defines no sequence".to_string())
        })?;
        if sequence.prompts.is_empty() {
            return Err(OrchestratorError::Workflow(
                "parallel workflow sequence has no prompts".to_string(),
            ));
        }
        Ok(sequence)
    }

    /// Timeout a child runs under: the sequence's, else the parallel block's.
    pub fn child_timeout_millis(&self) -> Option<u64> {
        self.sequences
            .first()
            .and_then(|s| s.timeout_millis)
            .or(self.timeout_millis)
    }

    /// Fallback a child relaunches with: the sequence's, else the parallel block's.
    pub fn child_fallback_src(&self) -> Option<&str> {
        self.sequences
            .first()
            .and_then(|s| s.fallback_src.as_deref())
            .or(self.fallback_src.as_deref())
    }
}

/// Parsed workflow definition, consumed read-only by the handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowData {
    #[serde(default, rename = "launch")]
    pub launch_prompt: Option<PromptInfo>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub repository: String,
    #[serde(default, rename = "updates")]
    pub update_prompts: Vec<PromptInfo>,
    #[serde(default)]
    pub timeout_millis: Option<u64>,
    #[serde(default, rename = "fallback")]
    pub fallback_src: Option<String>,
    #[serde(default, rename = "parallel")]
    pub parallel: Option<ParallelWorkflowData>,
}

impl WorkflowData {
    /// Parse a workflow definition from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, OrchestratorError> {
        let data: Self = serde_yaml::from_str(yaml)
            .map_err(|e| OrchestratorError::Workflow(format!("Failed to parse workflow YAML: {}", e)))?;
        data.validate()?;
        Ok(data)
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel.is_some()
    }

    pub fn validate(&self) -> Result<(), OrchestratorError> {
        match (&self.launch_prompt, &self.parallel) {
            (None, None) => Err(OrchestratorError::Workflow(
                "workflow needs a launch prompt or a parallel block".to_string(),
            )),
            (_, Some(parallel)) if parallel.bind_result_type.trim().is_empty() => Err(
                OrchestratorError::Workflow("parallel block needs bind_result_type".to_string()),
            ),
            _ => Ok(()),
        }
    }

    pub fn launch_prompt(&self) -> Result<&PromptInfo, OrchestratorError> {
        self.launch_prompt
            .as_ref()
            .ok_or_else(|| OrchestratorError::Workflow("workflow has no launch prompt".to_string()))
    }

    pub fn parallel(&self) -> Result<&ParallelWorkflowData, OrchestratorError> {
        self.parallel.as_ref().ok_or_else(|| {
            OrchestratorError::Workflow("workflow is not a parallel workflow".to_string())
        })
    }

    /// The effective sequential workflow of one fan-out child: the first
    /// template prompt launches, the rest are update prompts.
    pub fn child_workflow(&self) -> Result<WorkflowData, OrchestratorError> {
        let parallel = self.parallel()?;
        let sequence = parallel.primary_sequence()?;
        let (launch, updates) = sequence
            .prompts
            .split_first()
            .ok_or_else(|| OrchestratorError::Workflow("sequence has no prompts".to_string()))?;

        Ok(WorkflowData {
            launch_prompt: Some(launch.clone()),
            model: sequence.model.clone().unwrap_or_else(|| self.model.clone()),
            repository: sequence
                .repository
                .clone()
                .unwrap_or_else(|| self.repository.clone()),
            update_prompts: updates.to_vec(),
            timeout_millis: parallel.child_timeout_millis(),
            fallback_src: parallel.child_fallback_src().map(str::to_string),
            parallel: None,
        })
    }

    /// Every prompt a job built from this workflow gets a row for, in order.
    pub fn template_prompts(&self) -> Vec<&PromptInfo> {
        match &self.parallel {
            Some(parallel) => vec![&parallel.parallel_prompt],
            None => self
                .launch_prompt
                .iter()
                .chain(self.update_prompts.iter())
                .collect(),
        }
    }

    /// Mutable access to every prompt, used to fill in file content.
    pub(crate) fn prompts_mut(&mut self) -> Vec<&mut PromptInfo> {
        let mut prompts: Vec<&mut PromptInfo> = Vec::new();
        if let Some(launch) = self.launch_prompt.as_mut() {
            prompts.push(launch);
        }
        prompts.extend(self.update_prompts.iter_mut());
        if let Some(parallel) = self.parallel.as_mut() {
            prompts.push(&mut parallel.parallel_prompt);
            for sequence in parallel.sequences.iter_mut() {
                prompts.extend(sequence.prompts.iter_mut());
            }
        }
        prompts
    }
}
