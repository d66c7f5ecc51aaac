use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PROMPT_STATUS_UNKNOWN: &str = "UNKNOWN";
pub const PROMPT_STATUS_SENT: &str = "SENT";
pub const PROMPT_STATUS_COMPLETED: &str = "COMPLETED";

/// One row per template prompt in a job's effective sequence.
///
/// `status` stays a free-form string so rows written by older tooling load
/// unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub prompt_id: String,
    pub job_id: String,
    pub pml_file: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prompt {
    pub fn new(job_id: String, pml_file: String) -> Self {
        let now = Utc::now();
        Self {
            prompt_id: uuid::Uuid::new_v4().to_string(),
            job_id,
            pml_file,
            status: PROMPT_STATUS_UNKNOWN.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(self, status: &str) -> Self {
        Self {
            status: status.to_string(),
            updated_at: Utc::now(),
            ..self
        }
    }
}
