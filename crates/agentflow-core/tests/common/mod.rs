//! Shared fixtures: a scripted agent API and an in-memory engine.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use agentflow_core::agent::{AgentApi, LaunchRequest, LaunchedAgent};
use agentflow_core::models::AgentState;
use agentflow_core::workflow::{
    InMemoryWorkflowSource, ParallelWorkflowData, PromptInfo, SequenceInfo, WorkflowData,
};
use agentflow_core::{AppState, AppStateInner, Database, OrchestratorError};
use async_trait::async_trait;

#[derive(Default)]
struct FakeState {
    next_id: usize,
    statuses: HashMap<String, AgentState>,
    transcripts: HashMap<String, String>,
    launches: Vec<(String, LaunchRequest)>,
    follow_ups: Vec<(String, String)>,
    deleted: Vec<String>,
    status_calls: usize,
    fail_launch: bool,
    fail_status: bool,
}

/// Agent API double. Launched agents start in `CREATING` and then report
/// whatever status the test scripts with `set_status`.
#[derive(Default)]
pub struct FakeAgentApi {
    inner: Mutex<FakeState>,
}

impl FakeAgentApi {
    pub fn set_status(&self, agent_id: &str, status: AgentState) {
        self.inner
            .lock()
            .unwrap()
            .statuses
            .insert(agent_id.to_string(), status);
    }

    pub fn set_transcript(&self, agent_id: &str, transcript: &str) {
        self.inner
            .lock()
            .unwrap()
            .transcripts
            .insert(agent_id.to_string(), transcript.to_string());
    }

    pub fn fail_launch(&self, fail: bool) {
        self.inner.lock().unwrap().fail_launch = fail;
    }

    pub fn fail_status(&self, fail: bool) {
        self.inner.lock().unwrap().fail_status = fail;
    }

    pub fn launches(&self) -> Vec<(String, LaunchRequest)> {
        self.inner.lock().unwrap().launches.clone()
    }

    pub fn follow_ups(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().follow_ups.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.inner.lock().unwrap().deleted.clone()
    }

    pub fn status_calls(&self) -> usize {
        self.inner.lock().unwrap().status_calls
    }
}

#[async_trait]
impl AgentApi for FakeAgentApi {
    async fn launch(&self, request: &LaunchRequest) -> Result<LaunchedAgent, OrchestratorError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_launch {
            return Err(OrchestratorError::AgentApi("launch refused".into()));
        }
        inner.next_id += 1;
        let id = format!("bc-{}", inner.next_id);
        inner.statuses.insert(id.clone(), AgentState::Creating);
        inner.launches.push((id.clone(), request.clone()));
        Ok(LaunchedAgent {
            id,
            status: AgentState::Creating,
        })
    }

    async fn status(&self, agent_id: &str) -> Result<AgentState, OrchestratorError> {
        let mut inner = self.inner.lock().unwrap();
        inner.status_calls += 1;
        if inner.fail_status {
            return Err(OrchestratorError::Polling("status endpoint down".into()));
        }
        inner
            .statuses
            .get(agent_id)
            .copied()
            .ok_or_else(|| OrchestratorError::Polling(format!("unknown agent {}", agent_id)))
    }

    async fn follow_up(&self, agent_id: &str, prompt_text: &str) -> Result<(), OrchestratorError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .follow_ups
            .push((agent_id.to_string(), prompt_text.to_string()));
        inner
            .statuses
            .insert(agent_id.to_string(), AgentState::Running);
        Ok(())
    }

    async fn conversation(&self, agent_id: &str) -> Result<String, OrchestratorError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .transcripts
            .get(agent_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete(&self, agent_id: &str) -> Result<(), OrchestratorError> {
        let mut inner = self.inner.lock().unwrap();
        inner.deleted.push(agent_id.to_string());
        if agent_id == "bc-undeletable" {
            return Err(OrchestratorError::AgentApi("409 conflict".into()));
        }
        Ok(())
    }
}

pub struct Harness {
    pub state: AppState,
    pub api: Arc<FakeAgentApi>,
    pub workflows: Arc<InMemoryWorkflowSource>,
}

impl Harness {
    pub fn new() -> Self {
        let api = Arc::new(FakeAgentApi::default());
        let workflows = Arc::new(InMemoryWorkflowSource::new());
        workflows.insert_prompt("fallback.md", "Stop exploring and commit what you have.");
        workflows.insert_prompt(
            "child_fallback.md",
            "Finish issue <input>INPUT</input> quickly.",
        );
        let db = Database::open_in_memory().expect("in-memory database");
        let state: AppState = Arc::new(AppStateInner::new(db, api.clone(), workflows.clone()));
        Self {
            state,
            api,
            workflows,
        }
    }
}

pub fn sequential_workflow() -> WorkflowData {
    WorkflowData {
        launch_prompt: Some(PromptInfo::new("plan.md", "Plan the refactor")),
        model: "claude-4-sonnet".into(),
        repository: "https://github.com/acme/app".into(),
        update_prompts: vec![
            PromptInfo::new("implement.md", "Implement the plan"),
            PromptInfo::new("review.md", "Review your diff"),
        ],
        timeout_millis: None,
        fallback_src: Some("fallback.md".into()),
        parallel: None,
    }
}

pub fn parallel_workflow() -> WorkflowData {
    WorkflowData {
        launch_prompt: None,
        model: "claude-4-sonnet".into(),
        repository: "https://github.com/acme/app".into(),
        update_prompts: vec![],
        timeout_millis: None,
        fallback_src: None,
        parallel: Some(ParallelWorkflowData {
            parallel_prompt: PromptInfo::new(
                "split.md",
                "List open bug numbers as <result>[1,2]</result>",
            ),
            bind_result_type: "List_Integer".into(),
            sequences: vec![SequenceInfo {
                model: Some("gpt-5".into()),
                repository: None,
                prompts: vec![
                    PromptInfo::new("a.xml", "Fix issue #<input>INPUT</input>"),
                    PromptInfo::new("b.xml", "Open a PR for #<input>INPUT</input>"),
                ],
                timeout_millis: Some(600_000),
                fallback_src: None,
            }],
            timeout_millis: None,
            fallback_src: Some("child_fallback.md".into()),
        }),
    }
}
