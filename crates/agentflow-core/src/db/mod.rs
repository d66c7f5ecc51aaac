//! SQLite persistence for jobs and their prompt rows.
//!
//! One connection behind a mutex; the async store methods hop onto the
//! blocking pool for every query. File databases run in WAL mode.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::OrchestratorError;

/// Thread-safe handle to the SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(db_path: &str) -> Result<Self, OrchestratorError> {
        let path = Path::new(db_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path).map_err(|e| {
            OrchestratorError::Database(format!("Failed to open database: {}", e))
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| OrchestratorError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;

        tracing::info!("SQLite database opened at: {}", db_path);
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, OrchestratorError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            OrchestratorError::Database(format!("Failed to open in-memory db: {}", e))
        })?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;
        Ok(db)
    }

    /// Run `f` against the locked connection, mapping SQLite errors into
    /// `OrchestratorError::Database`.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, OrchestratorError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| OrchestratorError::Database(format!("Lock poisoned: {}", e)))?;
        f(&conn).map_err(|e| OrchestratorError::Database(e.to_string()))
    }

    /// `with_conn` on `spawn_blocking`, for use from handlers.
    pub async fn with_conn_async<F, T>(&self, f: F) -> Result<T, OrchestratorError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(|e| OrchestratorError::Database(format!("Task join error: {}", e)))?
    }

    /// `jobs` and `prompts`, plus the indexes the scheduler and fan-out
    /// lookups need.
    fn initialize_tables(&self) -> Result<(), OrchestratorError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS jobs (
                    job_id              TEXT PRIMARY KEY,
                    path                TEXT NOT NULL,
                    cursor_agent_id     TEXT,
                    model               TEXT NOT NULL DEFAULT '',
                    repository          TEXT NOT NULL DEFAULT '',
                    status              TEXT NOT NULL DEFAULT 'CREATING',
                    created_at          INTEGER NOT NULL,
                    last_update         INTEGER NOT NULL,
                    parent_job_id       TEXT,
                    result              TEXT,
                    type                TEXT,
                    timeout_millis      INTEGER,
                    workflow_start_time INTEGER,
                    fallback_src        TEXT,
                    fallback_executed   INTEGER
                );
                CREATE INDEX IF NOT EXISTS idx_jobs_parent ON jobs(parent_job_id);
                CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);

                CREATE TABLE IF NOT EXISTS prompts (
                    prompt_id       TEXT PRIMARY KEY,
                    job_id          TEXT NOT NULL,
                    pml_file        TEXT NOT NULL,
                    status          TEXT NOT NULL DEFAULT 'UNKNOWN',
                    created_at      INTEGER NOT NULL,
                    updated_at      INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_prompts_job ON prompts(job_id);
                ",
            )
        })?;
        self.run_migrations()
    }

    /// Timeout and fallback columns for databases created before they existed.
    fn run_migrations(&self) -> Result<(), OrchestratorError> {
        self.with_conn(|conn| {
            // "duplicate column" on up-to-date databases is expected
            let _ = conn.execute("ALTER TABLE jobs ADD COLUMN timeout_millis INTEGER", []);
            let _ = conn.execute("ALTER TABLE jobs ADD COLUMN workflow_start_time INTEGER", []);
            let _ = conn.execute("ALTER TABLE jobs ADD COLUMN fallback_src TEXT", []);
            let _ = conn.execute("ALTER TABLE jobs ADD COLUMN fallback_executed INTEGER", []);
            Ok(())
        })
    }
}
