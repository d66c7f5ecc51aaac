mod common;

use agentflow_core::models::{
    AgentState, Job, JobType, Prompt, PROMPT_STATUS_COMPLETED, PROMPT_STATUS_SENT,
    PROMPT_STATUS_UNKNOWN,
};
use agentflow_core::orchestration::{
    ChildWorkflowHandler, CycleOutcome, FallbackExecutor, JobService, ParallelWorkflowHandler,
};
use chrono::{Duration, Utc};

use common::{parallel_workflow, Harness};

const PATH: &str = "flows/bugs.yaml";

/// Create the parent and run its launch cycle; the agent is `bc-1`.
async fn launched_parent(h: &Harness) -> Job {
    h.workflows.insert(PATH, parallel_workflow());
    let job = JobService::new(h.state.clone()).create_job(PATH).await.unwrap();
    let outcome = ParallelWorkflowHandler::new(h.state.clone())
        .process(&job, &parallel_workflow())
        .await;
    assert_eq!(outcome, CycleOutcome::Launched);
    h.state.job_store.get(&job.job_id).await.unwrap()
}

async fn finish_parent(h: &Harness, parent: &Job, transcript: &str) -> CycleOutcome {
    h.api.set_status("bc-1", AgentState::Finished);
    h.api.set_transcript("bc-1", transcript);
    ParallelWorkflowHandler::new(h.state.clone())
        .process(parent, &parallel_workflow())
        .await
}

fn child_of(parent: &Job, value: &str, status: AgentState, agent: Option<&str>) -> Job {
    let mut child = Job::new(
        parent.path.clone(),
        "gpt-5".to_string(),
        parent.repository.clone(),
        JobType::Sequence,
    )
    .with_status(status);
    if let Some(agent) = agent {
        child = child.with_cursor_agent_id(agent.to_string());
    }
    child.parent_job_id = Some(parent.job_id.clone());
    child.result = Some(value.to_string());
    child
}

#[tokio::test]
async fn test_parent_launches_with_parallel_prompt() {
    let h = Harness::new();
    let parent = launched_parent(&h).await;

    assert_eq!(parent.job_type, Some(JobType::Parallel));
    assert_eq!(parent.cursor_agent_id.as_deref(), Some("bc-1"));
    assert_eq!(
        h.api.launches()[0].1.prompt_text,
        "List open bug numbers as <result>[1,2]</result>"
    );
    assert_eq!(h.api.status_calls(), 0);
}

#[tokio::test]
async fn test_fan_out_creates_one_child_per_value() {
    let h = Harness::new();
    let parent = launched_parent(&h).await;
    let store = &h.state.job_store;

    let outcome = finish_parent(
        &h,
        &parent,
        "[assistant_message]\nFound three.\n<result>[10, 20, 30]</result>",
    )
    .await;
    assert_eq!(outcome, CycleOutcome::ChildrenCreated(3));

    let children = store.find_jobs_by_parent_id(&parent.job_id).await.unwrap();
    assert_eq!(children.len(), 3);
    let mut values: Vec<String> = children
        .iter()
        .map(|c| c.result.clone().unwrap_or_default())
        .collect();
    values.sort();
    assert_eq!(values, vec!["10", "20", "30"]);

    for child in &children {
        assert_eq!(child.status, AgentState::Creating);
        assert!(child.cursor_agent_id.is_none());
        assert_eq!(child.job_type, Some(JobType::Sequence));
        assert_eq!(child.model, "gpt-5");
        assert_eq!(child.repository, "https://github.com/acme/app");
        assert_eq!(child.timeout_millis, Some(600_000));
        assert_eq!(child.fallback_src.as_deref(), Some("child_fallback.md"));

        let prompts = store.find_prompts_by_job_id(&child.job_id).await.unwrap();
        let files: Vec<&str> = prompts.iter().map(|p| p.pml_file.as_str()).collect();
        assert_eq!(files, vec!["a.xml", "b.xml"]);
        assert!(prompts.iter().all(|p| p.status == PROMPT_STATUS_UNKNOWN));
    }

    let parent = store.get(&parent.job_id).await.unwrap();
    assert_eq!(parent.status, AgentState::Finished);
    let parent_prompts = store.find_prompts_by_job_id(&parent.job_id).await.unwrap();
    assert_eq!(parent_prompts.len(), 1);
    assert_eq!(parent_prompts[0].status, PROMPT_STATUS_COMPLETED);

    // Children are now the only unfinished work.
    assert_eq!(store.find_unfinished_jobs().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_last_result_block_wins() {
    let h = Harness::new();
    let parent = launched_parent(&h).await;

    let transcript = "[user_message]\nList open bug numbers as <result>[1,2]</result>\n\n\
                      [assistant_message]\n<result>[7]</result>";
    assert_eq!(
        finish_parent(&h, &parent, transcript).await,
        CycleOutcome::ChildrenCreated(1)
    );

    let children = h
        .state
        .job_store
        .find_jobs_by_parent_id(&parent.job_id)
        .await
        .unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].result.as_deref(), Some("7"));
}

#[tokio::test]
async fn test_missing_result_fails_parent_without_children() {
    let h = Harness::new();
    let parent = launched_parent(&h).await;

    assert_eq!(
        finish_parent(&h, &parent, "I could not find any open bugs.").await,
        CycleOutcome::Failed
    );
    let store = &h.state.job_store;
    assert_eq!(store.get(&parent.job_id).await.unwrap().status, AgentState::Error);
    assert!(store.find_jobs_by_parent_id(&parent.job_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_non_integer_element_fails_parent() {
    let h = Harness::new();
    let parent = launched_parent(&h).await;

    assert_eq!(
        finish_parent(&h, &parent, r#"<result>[1, "two", 3]</result>"#).await,
        CycleOutcome::Failed
    );
    assert!(h
        .state
        .job_store
        .find_jobs_by_parent_id(&parent.job_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_failed_parent_agent_creates_no_children() {
    let h = Harness::new();
    let parent = launched_parent(&h).await;
    h.api.set_status("bc-1", AgentState::Expired);

    let outcome = ParallelWorkflowHandler::new(h.state.clone())
        .process(&parent, &parallel_workflow())
        .await;
    assert_eq!(outcome, CycleOutcome::Polled);

    let store = &h.state.job_store;
    assert_eq!(store.get(&parent.job_id).await.unwrap().status, AgentState::Expired);
    assert!(store.find_jobs_by_parent_id(&parent.job_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_parallel_without_sequences_aborts_before_launch() {
    let h = Harness::new();
    h.workflows.insert(PATH, parallel_workflow());
    let job = JobService::new(h.state.clone()).create_job(PATH).await.unwrap();

    let mut broken = parallel_workflow();
    if let Some(parallel) = broken.parallel.as_mut() {
        parallel.sequences.clear();
    }
    let outcome = ParallelWorkflowHandler::new(h.state.clone())
        .process(&job, &broken)
        .await;

    assert_eq!(outcome, CycleOutcome::Aborted);
    assert!(h.api.launches().is_empty());
    let stored = h.state.job_store.get(&job.job_id).await.unwrap();
    assert!(stored.cursor_agent_id.is_none());
    assert_eq!(stored.status, AgentState::Creating);
}

#[tokio::test]
async fn test_parent_timeout_relaunches_unfinished_children_once() {
    let h = Harness::new();
    h.workflows.insert(PATH, parallel_workflow());
    let store = &h.state.job_store;

    let mut parent = Job::new(
        PATH.to_string(),
        "claude-4-sonnet".to_string(),
        "https://github.com/acme/app".to_string(),
        JobType::Parallel,
    )
    .with_status(AgentState::Running)
    .with_cursor_agent_id("bc-parent".to_string())
    .with_workflow_start_time(Utc::now() - Duration::milliseconds(2000));
    parent.timeout_millis = Some(1000);
    parent.fallback_executed = Some(false);
    store.save(&parent).await.unwrap();

    let running = child_of(&parent, "10", AgentState::Running, Some("bc-a"));
    let done = child_of(&parent, "20", AgentState::Finished, Some("bc-b"));
    let waiting = child_of(&parent, "30", AgentState::Creating, None);
    for child in [&running, &done, &waiting] {
        store.save(child).await.unwrap();
    }

    let handler = ParallelWorkflowHandler::new(h.state.clone());
    assert_eq!(
        handler.process(&parent, &parallel_workflow()).await,
        CycleOutcome::FallbackLaunched
    );

    let mut texts: Vec<String> = h
        .api
        .launches()
        .into_iter()
        .map(|(_, r)| r.prompt_text)
        .collect();
    texts.sort();
    assert_eq!(
        texts,
        vec!["Finish issue 10 quickly.", "Finish issue 30 quickly."]
    );

    for child in [&running, &waiting] {
        let stored = store.get(&child.job_id).await.unwrap();
        assert_eq!(stored.fallback_executed, Some(true));
        assert!(stored.cursor_agent_id.as_deref().unwrap().starts_with("bc-"));
        assert_ne!(stored.cursor_agent_id.as_deref(), Some("bc-a"));
    }
    let untouched = store.get(&done.job_id).await.unwrap();
    assert_eq!(untouched.cursor_agent_id.as_deref(), Some("bc-b"));
    assert_eq!(untouched.fallback_executed, None);

    let parent = store.get(&parent.job_id).await.unwrap();
    assert_eq!(parent.fallback_executed, Some(true));
    assert_eq!(
        handler.process(&parent, &parallel_workflow()).await,
        CycleOutcome::Idle
    );
    assert_eq!(h.api.launches().len(), 2);
}

#[tokio::test]
async fn test_child_substitutes_its_value_into_every_prompt() {
    let h = Harness::new();
    let parent = launched_parent(&h).await;
    finish_parent(&h, &parent, "<result>[42]</result>").await;

    let store = &h.state.job_store;
    let child = store
        .find_jobs_by_parent_id(&parent.job_id)
        .await
        .unwrap()
        .remove(0);
    let handler = ChildWorkflowHandler::new(h.state.clone());

    assert_eq!(handler.process(&child).await, CycleOutcome::Launched);
    let (agent_id, request) = h.api.launches().pop().unwrap();
    assert_eq!(request.prompt_text, "Fix issue #42");
    assert_eq!(request.model, "gpt-5");
    let statuses: Vec<String> = store
        .find_prompts_by_job_id(&child.job_id)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.status)
        .collect();
    assert_eq!(statuses, vec![PROMPT_STATUS_SENT, PROMPT_STATUS_UNKNOWN]);

    h.api.set_status(&agent_id, AgentState::Finished);
    let child = store.get(&child.job_id).await.unwrap();
    assert_eq!(handler.process(&child).await, CycleOutcome::Advanced);
    assert_eq!(
        h.api.follow_ups(),
        vec![(agent_id.clone(), "Open a PR for #42".to_string())]
    );

    h.api.set_status(&agent_id, AgentState::Finished);
    let child = store.get(&child.job_id).await.unwrap();
    assert_eq!(handler.process(&child).await, CycleOutcome::Completed);
    assert_eq!(store.get(&child.job_id).await.unwrap().status, AgentState::Finished);
}

#[tokio::test]
async fn test_orphaned_child_aborts() {
    let h = Harness::new();
    let parent = launched_parent(&h).await;
    let orphan = child_of(&parent, "5", AgentState::Creating, None);
    let store = &h.state.job_store;
    store.save(&orphan).await.unwrap();
    store.delete_by_id(&parent.job_id).await.unwrap();

    let handler = ChildWorkflowHandler::new(h.state.clone());
    assert_eq!(handler.process(&orphan).await, CycleOutcome::Aborted);
    assert_eq!(h.api.launches().len(), 1);
    assert!(store.get(&orphan.job_id).await.unwrap().cursor_agent_id.is_none());
}

/// A finished parent whose sequence template carries a one second timeout,
/// plus one unlaunched child bound to `value` with no timeout of its own.
async fn child_with_inherited_timeout(h: &Harness, value: &str) -> Job {
    let mut workflow = parallel_workflow();
    if let Some(parallel) = workflow.parallel.as_mut() {
        parallel.sequences[0].timeout_millis = Some(1000);
    }
    h.workflows.insert(PATH, workflow);

    let parent = Job::new(
        PATH.to_string(),
        "claude-4-sonnet".to_string(),
        "https://github.com/acme/app".to_string(),
        JobType::Parallel,
    )
    .with_status(AgentState::Finished)
    .with_cursor_agent_id("bc-parent".to_string());
    let child = child_of(&parent, value, AgentState::Creating, None);

    let store = &h.state.job_store;
    store.save(&parent).await.unwrap();
    store.save(&child).await.unwrap();
    for src in ["a.xml", "b.xml"] {
        store
            .save_prompt(&Prompt::new(child.job_id.clone(), src.to_string()))
            .await
            .unwrap();
    }
    child
}

#[tokio::test]
async fn test_child_falls_back_once_on_inherited_timeout() {
    let h = Harness::new();
    let child = child_with_inherited_timeout(&h, "77").await;
    assert!(child.timeout_millis.is_none());
    let handler = ChildWorkflowHandler::new(h.state.clone());
    let store = &h.state.job_store;

    assert_eq!(handler.process(&child).await, CycleOutcome::Launched);
    let first_agent = store.get(&child.job_id).await.unwrap().cursor_agent_id;

    let overdue = store
        .get(&child.job_id)
        .await
        .unwrap()
        .with_workflow_start_time(Utc::now() - Duration::milliseconds(2000));
    store.save(&overdue).await.unwrap();

    assert_eq!(handler.process(&overdue).await, CycleOutcome::FallbackLaunched);
    let launches = h.api.launches();
    assert_eq!(launches.len(), 2);
    assert_eq!(launches[1].1.prompt_text, "Finish issue 77 quickly.");

    let stored = store.get(&child.job_id).await.unwrap();
    assert_eq!(stored.fallback_executed, Some(true));
    assert_ne!(stored.cursor_agent_id, first_agent);

    // Next cycle polls the fallback agent and starts nothing new.
    assert_eq!(handler.process(&stored).await, CycleOutcome::Polled);
    assert_eq!(h.api.launches().len(), 2);

    // Overrunning again is not a second fallback.
    let overrun = store
        .get(&child.job_id)
        .await
        .unwrap()
        .with_workflow_start_time(Utc::now() - Duration::milliseconds(5000));
    store.save(&overrun).await.unwrap();
    assert_eq!(handler.process(&overrun).await, CycleOutcome::Idle);
    assert_eq!(h.api.launches().len(), 2);
}

#[tokio::test]
async fn test_child_poll_failure_forces_error() {
    let h = Harness::new();
    let child = child_with_inherited_timeout(&h, "8").await;
    let handler = ChildWorkflowHandler::new(h.state.clone());
    assert_eq!(handler.process(&child).await, CycleOutcome::Launched);

    h.api.fail_status(true);
    let launched = h.state.job_store.get(&child.job_id).await.unwrap();
    assert_eq!(handler.process(&launched).await, CycleOutcome::Failed);

    let stored = h.state.job_store.get(&child.job_id).await.unwrap();
    assert_eq!(stored.status, AgentState::Error);
    assert!(h.api.follow_ups().is_empty());
}

#[tokio::test]
async fn test_children_fallback_isolates_a_failing_child() {
    let h = Harness::new();
    h.workflows.insert(PATH, parallel_workflow());
    let store = &h.state.job_store;

    let mut parent = Job::new(
        PATH.to_string(),
        "claude-4-sonnet".to_string(),
        "https://github.com/acme/app".to_string(),
        JobType::Parallel,
    )
    .with_status(AgentState::Running)
    .with_cursor_agent_id("bc-parent".to_string())
    .with_workflow_start_time(Utc::now() - Duration::milliseconds(2000));
    parent.timeout_millis = Some(1000);
    store.save(&parent).await.unwrap();

    let mut broken = child_of(&parent, "1", AgentState::Running, Some("bc-x"));
    broken.fallback_src = Some("missing.md".to_string());
    let first = child_of(&parent, "2", AgentState::Running, Some("bc-y"));
    let second = child_of(&parent, "3", AgentState::Creating, None);
    for child in [&broken, &first, &second] {
        store.save(child).await.unwrap();
    }

    let workflow = parallel_workflow();
    let parallel = workflow.parallel.as_ref().unwrap();
    let summary = FallbackExecutor::new(h.state.clone())
        .execute_fallback_for_parallel_children(&parent, parallel)
        .await
        .unwrap();

    assert_eq!(summary.failed, vec![broken.job_id.clone()]);
    let mut relaunched = summary.relaunched.clone();
    relaunched.sort();
    let mut expected = vec![first.job_id.clone(), second.job_id.clone()];
    expected.sort();
    assert_eq!(relaunched, expected);
    assert!(summary.skipped.is_empty());

    let mut texts: Vec<String> = h
        .api
        .launches()
        .into_iter()
        .map(|(_, r)| r.prompt_text)
        .collect();
    texts.sort();
    assert_eq!(texts, vec!["Finish issue 2 quickly.", "Finish issue 3 quickly."]);

    let untouched = store.get(&broken.job_id).await.unwrap();
    assert_eq!(untouched.cursor_agent_id.as_deref(), Some("bc-x"));
    assert_ne!(untouched.fallback_executed, Some(true));

    let parent = store.get(&parent.job_id).await.unwrap();
    assert_eq!(parent.fallback_executed, Some(true));
}
