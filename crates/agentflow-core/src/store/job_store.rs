use chrono::Utc;
use rusqlite::{OptionalExtension, Row};

use crate::db::Database;
use crate::error::OrchestratorError;
use crate::models::{AgentState, Job, JobType, Prompt};

const JOB_COLUMNS: &str = "job_id, path, cursor_agent_id, model, repository, status, created_at, \
     last_update, parent_job_id, result, type, timeout_millis, workflow_start_time, fallback_src, \
     fallback_executed";

const PROMPT_COLUMNS: &str = "prompt_id, job_id, pml_file, status, created_at, updated_at";

/// Persistence for jobs and their prompt rows.
///
/// `save` is an upsert keyed by `job_id`; there is no version check, so the
/// last writer wins.
#[derive(Clone)]
pub struct JobStore {
    db: Database,
}

impl JobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn save(&self, job: &Job) -> Result<(), OrchestratorError> {
        let j = job.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO jobs (job_id, path, cursor_agent_id, model, repository, status, created_at,
                                       last_update, parent_job_id, result, type, timeout_millis,
                                       workflow_start_time, fallback_src, fallback_executed)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                     ON CONFLICT(job_id) DO UPDATE SET
                       path = excluded.path,
                       cursor_agent_id = excluded.cursor_agent_id,
                       model = excluded.model,
                       repository = excluded.repository,
                       status = excluded.status,
                       last_update = excluded.last_update,
                       result = excluded.result,
                       type = excluded.type,
                       timeout_millis = excluded.timeout_millis,
                       workflow_start_time = excluded.workflow_start_time,
                       fallback_src = excluded.fallback_src,
                       fallback_executed = excluded.fallback_executed",
                    rusqlite::params![
                        j.job_id,
                        j.path,
                        j.cursor_agent_id,
                        j.model,
                        j.repository,
                        j.status.as_str(),
                        j.created_at.timestamp_millis(),
                        j.last_update.timestamp_millis(),
                        j.parent_job_id,
                        j.result,
                        j.job_type.map(|t| t.as_str()),
                        j.timeout_millis.map(|t| t as i64),
                        j.workflow_start_time.map(|t| t.timestamp_millis()),
                        j.fallback_src,
                        j.fallback_executed.map(|b| b as i64),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn find_by_id(&self, job_id: &str) -> Result<Option<Job>, OrchestratorError> {
        let id = job_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM jobs WHERE job_id = ?1", JOB_COLUMNS),
                    rusqlite::params![id],
                    |row| Ok(row_to_job(row)),
                )
                .optional()
            })
            .await
    }

    /// Like `find_by_id`, but a missing row is an error.
    pub async fn get(&self, job_id: &str) -> Result<Job, OrchestratorError> {
        self.find_by_id(job_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("job {}", job_id)))
    }

    pub async fn delete_by_id(&self, job_id: &str) -> Result<(), OrchestratorError> {
        let id = job_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.execute("DELETE FROM jobs WHERE job_id = ?1", rusqlite::params![id])?;
                Ok(())
            })
            .await
    }

    pub async fn find_jobs_by_parent_id(
        &self,
        parent_job_id: &str,
    ) -> Result<Vec<Job>, OrchestratorError> {
        let pid = parent_job_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM jobs WHERE parent_job_id = ?1 ORDER BY created_at, rowid",
                    JOB_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![pid], |row| Ok(row_to_job(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Every job that was never launched or whose agent is not terminal yet.
    pub async fn find_unfinished_jobs(&self) -> Result<Vec<Job>, OrchestratorError> {
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM jobs
                     WHERE cursor_agent_id IS NULL
                        OR status NOT IN ('FINISHED', 'ERROR', 'EXPIRED')
                     ORDER BY created_at, rowid",
                    JOB_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([], |row| Ok(row_to_job(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn list_all(&self) -> Result<Vec<Job>, OrchestratorError> {
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM jobs ORDER BY created_at DESC, rowid DESC",
                    JOB_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([], |row| Ok(row_to_job(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Overwrite only the status column.
    pub async fn update_status(
        &self,
        job_id: &str,
        status: AgentState,
    ) -> Result<(), OrchestratorError> {
        let id = job_id.to_string();
        let now = Utc::now().timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE jobs SET status = ?1, last_update = ?2 WHERE job_id = ?3",
                    rusqlite::params![status.as_str(), now, id],
                )?;
                Ok(())
            })
            .await
    }

    // ── Prompts ───────────────────────────────────────────────────────────

    /// Prompt rows in insertion order, which is template order.
    pub async fn find_prompts_by_job_id(
        &self,
        job_id: &str,
    ) -> Result<Vec<Prompt>, OrchestratorError> {
        let id = job_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM prompts WHERE job_id = ?1 ORDER BY rowid",
                    PROMPT_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![id], |row| Ok(row_to_prompt(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn save_prompt(&self, prompt: &Prompt) -> Result<(), OrchestratorError> {
        let p = prompt.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO prompts (prompt_id, job_id, pml_file, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(prompt_id) DO UPDATE SET
                       pml_file = excluded.pml_file,
                       status = excluded.status,
                       updated_at = excluded.updated_at",
                    rusqlite::params![
                        p.prompt_id,
                        p.job_id,
                        p.pml_file,
                        p.status,
                        p.created_at.timestamp_millis(),
                        p.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn delete_prompts_by_job_id(&self, job_id: &str) -> Result<(), OrchestratorError> {
        let id = job_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.execute("DELETE FROM prompts WHERE job_id = ?1", rusqlite::params![id])?;
                Ok(())
            })
            .await
    }
}

fn millis_to_datetime(ms: i64) -> chrono::DateTime<Utc> {
    chrono::DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

fn row_to_job(row: &Row<'_>) -> Job {
    let created_ms: i64 = row.get(6).unwrap_or(0);
    let updated_ms: i64 = row.get(7).unwrap_or(0);
    let type_str: Option<String> = row.get(10).unwrap_or(None);
    let timeout: Option<i64> = row.get(11).unwrap_or(None);
    let start_ms: Option<i64> = row.get(12).unwrap_or(None);
    let fallback_executed: Option<i64> = row.get(14).unwrap_or(None);

    Job {
        job_id: row.get(0).unwrap_or_default(),
        path: row.get(1).unwrap_or_default(),
        cursor_agent_id: row.get(2).unwrap_or(None),
        model: row.get(3).unwrap_or_default(),
        repository: row.get(4).unwrap_or_default(),
        status: AgentState::from_str(&row.get::<_, String>(5).unwrap_or_default())
            .unwrap_or(AgentState::Creating),
        created_at: millis_to_datetime(created_ms),
        last_update: millis_to_datetime(updated_ms),
        parent_job_id: row.get(8).unwrap_or(None),
        result: row.get(9).unwrap_or(None),
        job_type: type_str.as_deref().and_then(JobType::from_str),
        timeout_millis: timeout.and_then(|t| u64::try_from(t).ok()),
        workflow_start_time: start_ms.map(millis_to_datetime),
        fallback_src: row.get(13).unwrap_or(None),
        fallback_executed: fallback_executed.map(|v| v != 0),
    }
}

fn row_to_prompt(row: &Row<'_>) -> Prompt {
    let created_ms: i64 = row.get(4).unwrap_or(0);
    let updated_ms: i64 = row.get(5).unwrap_or(0);
    Prompt {
        prompt_id: row.get(0).unwrap_or_default(),
        job_id: row.get(1).unwrap_or_default(),
        pml_file: row.get(2).unwrap_or_default(),
        status: row.get(3).unwrap_or_default(),
        created_at: millis_to_datetime(created_ms),
        updated_at: millis_to_datetime(updated_ms),
    }
}
