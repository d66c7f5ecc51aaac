//! Workflow definitions: what a job runs.
//!
//! ```text
//! flow.yaml ──► YamlWorkflowSource ──► WorkflowData ──► handlers
//!                                          │
//!                              parallel.sequences[0] ──► child jobs
//! ```

pub mod placeholder;
pub mod schema;
pub mod source;

pub use placeholder::{substitute_input, INPUT_MARKER};
pub use schema::{ParallelWorkflowData, PromptInfo, SequenceInfo, WorkflowData};
pub use source::{InMemoryWorkflowSource, WorkflowSource, YamlWorkflowSource};
