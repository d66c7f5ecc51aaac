//! Shared engine state handed to every handler.

use std::sync::Arc;

use crate::agent::{AgentApi, AgentExecutionService};
use crate::db::Database;
use crate::store::JobStore;
use crate::workflow::WorkflowSource;

pub struct AppStateInner {
    pub job_store: JobStore,
    pub agents: AgentExecutionService,
    pub workflows: Arc<dyn WorkflowSource>,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    pub fn new(db: Database, api: Arc<dyn AgentApi>, workflows: Arc<dyn WorkflowSource>) -> Self {
        let job_store = JobStore::new(db);
        Self {
            agents: AgentExecutionService::new(api, job_store.clone()),
            job_store,
            workflows,
        }
    }
}
