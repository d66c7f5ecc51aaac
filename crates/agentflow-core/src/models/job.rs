use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an external agent, mirrored onto the job row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    Creating,
    Running,
    Finished,
    Error,
    Expired,
}

impl AgentState {
    pub const ALL: [AgentState; 5] = [
        Self::Creating,
        Self::Running,
        Self::Finished,
        Self::Error,
        Self::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "CREATING",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Error => "ERROR",
            Self::Expired => "EXPIRED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CREATING" => Some(Self::Creating),
            "RUNNING" => Some(Self::Running),
            "FINISHED" => Some(Self::Finished),
            "ERROR" => Some(Self::Error),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Error | Self::Expired)
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Finished)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Error | Self::Expired)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    Sequence,
    Parallel,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequence => "SEQUENCE",
            Self::Parallel => "PARALLEL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "SEQUENCE" => Some(Self::Sequence),
            "PARALLEL" => Some(Self::Parallel),
            _ => None,
        }
    }
}

/// A tracked unit of orchestration work.
///
/// Values are snapshots of the store row. Mutation goes through the `with_*`
/// builders, which return a new value with `last_update` refreshed; callers
/// persist the result and re-fetch rather than trusting the local copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor_agent_id: Option<String>,
    pub model: String,
    pub repository: String,
    pub status: AgentState,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub job_type: Option<JobType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_millis: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_executed: Option<bool>,
}

impl Job {
    /// A fresh top-level job in `CREATING` with a new id.
    pub fn new(path: String, model: String, repository: String, job_type: JobType) -> Self {
        let now = Utc::now();
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            path,
            cursor_agent_id: None,
            model,
            repository,
            status: AgentState::Creating,
            created_at: now,
            last_update: now,
            parent_job_id: None,
            result: None,
            job_type: Some(job_type),
            timeout_millis: None,
            workflow_start_time: None,
            fallback_src: None,
            fallback_executed: None,
        }
    }

    pub fn is_child(&self) -> bool {
        self.parent_job_id.is_some()
    }

    pub fn is_launched(&self) -> bool {
        self.cursor_agent_id.is_some()
    }

    pub fn fallback_already_executed(&self) -> bool {
        self.fallback_executed == Some(true)
    }

    /// Matches the store's unfinished-job predicate.
    pub fn is_unfinished(&self) -> bool {
        self.cursor_agent_id.is_none() || !self.status.is_terminal()
    }

    pub fn with_status(self, status: AgentState) -> Self {
        Self {
            status,
            ..self.touched()
        }
    }

    pub fn with_cursor_agent_id(self, agent_id: String) -> Self {
        Self {
            cursor_agent_id: Some(agent_id),
            ..self.touched()
        }
    }

    pub fn with_workflow_start_time(self, start: DateTime<Utc>) -> Self {
        Self {
            workflow_start_time: Some(start),
            ..self.touched()
        }
    }

    pub fn with_fallback_executed(self, executed: bool) -> Self {
        Self {
            fallback_executed: Some(executed),
            ..self.touched()
        }
    }

    fn touched(self) -> Self {
        Self {
            last_update: Utc::now(),
            ..self
        }
    }
}
