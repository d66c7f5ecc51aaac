//! Pulls a parallel parent's result list out of its agent transcript.
//!
//! The agent is asked to answer with `<result>JSON</result>`. Prompts often
//! show the format inline, so only the last marker in the transcript counts.

use serde_json::Value;

use crate::error::OrchestratorError;
use crate::models::Job;
use crate::state::AppState;
use crate::workflow::ParallelWorkflowData;

/// Element type a parallel workflow binds each result to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultType {
    Integer,
}

impl ResultType {
    /// Map a `bind_result_type` name; `None` for unsupported types.
    pub fn from_bind_type(name: &str) -> Option<Self> {
        match name {
            "List_Integer" => Some(Self::Integer),
            _ => None,
        }
    }
}

/// One fan-out input value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundValue {
    Integer(i64),
}

impl std::fmt::Display for BoundValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundValue::Integer(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Clone)]
pub struct ResultExtractor {
    state: AppState,
}

impl ResultExtractor {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Fetch the transcript of `job`'s agent and parse its result list.
    ///
    /// `Ok(None)` means "no result" and the caller fails the parent. Only the
    /// transcript fetch itself produces an `Err`.
    pub async fn extract_results(
        &self,
        job: &Job,
        parallel: &ParallelWorkflowData,
    ) -> Result<Option<Vec<BoundValue>>, OrchestratorError> {
        let agent_id = job.cursor_agent_id.as_deref().ok_or_else(|| {
            OrchestratorError::Internal(format!("job {} has no agent transcript", job.job_id))
        })?;
        let transcript = self.state.agents.conversation_transcript(agent_id).await?;
        let values = extract_from_transcript(&transcript, &parallel.bind_result_type);
        if values.is_none() {
            tracing::warn!(
                "[ResultExtractor] No usable <result> in transcript of job {} (agent {})",
                job.job_id,
                agent_id
            );
        }
        Ok(values)
    }
}

/// Text inside the last `<result>…</result>` marker.
pub fn last_result_block(transcript: &str) -> Option<&str> {
    let re = regex::Regex::new(r"(?s)<result>(.*?)</result>").ok()?;
    re.captures_iter(transcript)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Parse the last result block of `transcript` as a list of `bind_type`.
pub fn extract_from_transcript(transcript: &str, bind_type: &str) -> Option<Vec<BoundValue>> {
    let block = last_result_block(transcript)?;
    let json: Value = match serde_json::from_str(block) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("[ResultExtractor] Result block is not valid JSON: {}", e);
            return None;
        }
    };

    let items = match &json {
        Value::Array(items) => items,
        Value::Object(map) => match map.get(bind_type) {
            Some(Value::Array(items)) => items,
            _ => find_first_array(&json)?,
        },
        _ => return None,
    };

    let Some(result_type) = ResultType::from_bind_type(bind_type) else {
        tracing::error!("[ResultExtractor] Unsupported bind_result_type '{}'", bind_type);
        return None;
    };

    items
        .iter()
        .map(|item| deserialize_element(item, result_type))
        .collect()
}

fn deserialize_element(item: &Value, result_type: ResultType) -> Option<BoundValue> {
    match result_type {
        ResultType::Integer => match serde_json::from_value::<i64>(item.clone()) {
            Ok(v) => Some(BoundValue::Integer(v)),
            Err(e) => {
                tracing::warn!("[ResultExtractor] Element {} is not an integer: {}", item, e);
                None
            }
        },
    }
}

/// Depth-first search for the first array anywhere in `value`, in document
/// key order.
fn find_first_array(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => map.values().find_map(find_first_array),
        _ => None,
    }
}
