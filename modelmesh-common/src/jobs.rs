//! Durable record of batch jobs.
//!
//! The store is the system of record for the job lifecycle. The consumer owns
//! status transitions (pending -> processing -> completed | failed); the
//! executor is the sole writer of the completed counter while a job is
//! processing. A reader never observes a terminal state without a completion
//! timestamp, and a completed job always carries a result URL while a failed
//! job carries an error summary instead.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::protocol::JobStatus;

/// A stored batch job.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub model: String,
    pub version: String,
    pub inputs: Vec<Value>,
    pub status: JobStatus,
    pub progress: f64,
    pub total_items: usize,
    pub completed: usize,
    pub result_url: Option<String>,
    pub error_msg: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Build a fresh pending record for a newly received job descriptor.
    pub fn pending(
        job_id: impl Into<String>,
        model: impl Into<String>,
        version: impl Into<String>,
        inputs: Vec<Value>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let total_items = inputs.len();
        Self {
            id: job_id.into(),
            model: model.into(),
            version: version.into(),
            inputs,
            status: JobStatus::Pending,
            progress: 0.0,
            total_items,
            completed: 0,
            result_url: None,
            error_msg: None,
            created_at,
            updated_at: Utc::now(),
            completed_at: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("corrupt job record: {0}")]
    Corrupt(String),
}

/// Persistence operations for batch jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a job record.
    ///
    /// Re-delivery of a job descriptor is expected (the log is at-least-once),
    /// so inserting an id that already exists refreshes `updated_at` and
    /// leaves the existing lifecycle fields untouched.
    async fn create(&self, job: &JobRecord) -> Result<(), JobStoreError>;

    async fn get(&self, job_id: &str) -> Result<JobRecord, JobStoreError>;

    /// Update the completed counter and the derived progress fraction.
    async fn update_progress(
        &self,
        job_id: &str,
        completed: usize,
        progress: f64,
    ) -> Result<(), JobStoreError>;

    /// Move a job to a new status. Terminal states stamp `completed_at`.
    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        result_url: Option<&str>,
        error_msg: Option<&str>,
    ) -> Result<(), JobStoreError>;
}

/// SQLite-backed job store.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Open (or create) the store at the given URL. Accepts a bare path or a
    /// `sqlite:` prefixed URL.
    pub fn open(database_url: &str) -> Result<Self, JobStoreError> {
        let path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);

        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| JobStoreError::Database(e.to_string()))?;
        }

        let conn =
            Connection::open(path).map_err(|e| JobStoreError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// In-memory store, used by tests.
    pub fn in_memory() -> Result<Self, JobStoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| JobStoreError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, JobStoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS batch_jobs (
                id TEXT PRIMARY KEY,
                model TEXT NOT NULL,
                version TEXT NOT NULL,
                inputs TEXT NOT NULL,
                status TEXT NOT NULL,
                progress REAL NOT NULL DEFAULT 0,
                total_items INTEGER NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0,
                result_url TEXT,
                error_msg TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_batch_jobs_status ON batch_jobs(status);
            CREATE INDEX IF NOT EXISTS idx_batch_jobs_created_at ON batch_jobs(created_at);",
        )
        .map_err(|e| JobStoreError::Database(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, JobStoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| JobStoreError::Corrupt(format!("bad timestamp {:?}: {}", raw, e)))
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create(&self, job: &JobRecord) -> Result<(), JobStoreError> {
        let inputs = serde_json::to_string(&job.inputs)
            .map_err(|e| JobStoreError::Corrupt(e.to_string()))?;

        let conn = self.lock();
        conn.execute(
            "INSERT INTO batch_jobs
                (id, model, version, inputs, status, progress, total_items, completed,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
            params![
                job.id,
                job.model,
                job.version,
                inputs,
                job.status.as_str(),
                job.progress,
                job.total_items as i64,
                job.completed as i64,
                job.created_at.to_rfc3339(),
                job.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| JobStoreError::Database(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<JobRecord, JobStoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, model, version, inputs, status, progress, total_items, completed,
                        result_url, error_msg, created_at, updated_at, completed_at
                 FROM batch_jobs WHERE id = ?1",
                params![job_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, f64>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, i64>(7)?,
                        row.get::<_, Option<String>>(8)?,
                        row.get::<_, Option<String>>(9)?,
                        row.get::<_, String>(10)?,
                        row.get::<_, String>(11)?,
                        row.get::<_, Option<String>>(12)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        let Some((
            id,
            model,
            version,
            inputs,
            status,
            progress,
            total_items,
            completed,
            result_url,
            error_msg,
            created_at,
            updated_at,
            completed_at,
        )) = row
        else {
            return Err(JobStoreError::NotFound(job_id.to_string()));
        };

        let inputs: Vec<Value> = serde_json::from_str(&inputs)
            .map_err(|e| JobStoreError::Corrupt(format!("bad inputs column: {}", e)))?;
        let status: JobStatus = status.parse().map_err(JobStoreError::Corrupt)?;

        Ok(JobRecord {
            id,
            model,
            version,
            inputs,
            status,
            progress,
            total_items: total_items as usize,
            completed: completed as usize,
            result_url,
            error_msg,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
            completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }

    async fn update_progress(
        &self,
        job_id: &str,
        completed: usize,
        progress: f64,
    ) -> Result<(), JobStoreError> {
        let conn = self.lock();
        let changed = conn
            .execute(
                "UPDATE batch_jobs SET completed = ?1, progress = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![
                    completed as i64,
                    progress,
                    Utc::now().to_rfc3339(),
                    job_id
                ],
            )
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(JobStoreError::NotFound(job_id.to_string()));
        }
        Ok(())
    }

    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        result_url: Option<&str>,
        error_msg: Option<&str>,
    ) -> Result<(), JobStoreError> {
        let now = Utc::now().to_rfc3339();
        let completed_at = status.is_terminal().then(|| now.clone());

        let conn = self.lock();
        let changed = conn
            .execute(
                "UPDATE batch_jobs
                 SET status = ?1, result_url = ?2, error_msg = ?3, updated_at = ?4,
                     completed_at = ?5
                 WHERE id = ?6",
                params![status.as_str(), result_url, error_msg, now, completed_at, job_id],
            )
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(JobStoreError::NotFound(job_id.to_string()));
        }
        Ok(())
    }
}

/// In-memory job store for tests that do not want SQLite at all.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &JobRecord) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.entry(job.id.clone())
            .and_modify(|existing| existing.updated_at = job.updated_at)
            .or_insert_with(|| job.clone());
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<JobRecord, JobStoreError> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.get(job_id)
            .cloned()
            .ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))
    }

    async fn update_progress(
        &self,
        job_id: &str,
        completed: usize,
        progress: f64,
    ) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))?;
        job.completed = completed;
        job.progress = progress;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        result_url: Option<&str>,
        error_msg: Option<&str>,
    ) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))?;
        job.status = status;
        job.result_url = result_url.map(str::to_string);
        job.error_msg = error_msg.map(str::to_string);
        job.updated_at = Utc::now();
        job.completed_at = status.is_terminal().then(Utc::now);
        Ok(())
    }
}
