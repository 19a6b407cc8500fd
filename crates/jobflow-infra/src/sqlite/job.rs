//! SQLite job repository implementation.
//!
//! Implements `JobRepository` from `jobflow-core` using sqlx with split
//! read/write pools. Workflow definitions and outputs are stored as JSON
//! text. Every guarded transition is a single conditional `UPDATE` whose
//! `rows_affected` says whether it applied.

use chrono::Utc;
use jobflow_core::repository::job::JobRepository;
use jobflow_types::error::RepositoryError;
use jobflow_types::job::{Job, JobId, JobStatus};
use jobflow_types::workflow::StepOutputs;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error};

const JOB_COLUMNS: &str = "job_id, user_id, workflow_definition, status, start_time, end_time, \
                           final_output, error_message, retry_count, created_at, updated_at";

/// SQLite-backed implementation of `JobRepository`.
#[derive(Clone)]
pub struct SqliteJobRepository {
    pool: DatabasePool,
}

impl SqliteJobRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct JobRow {
    job_id: String,
    user_id: String,
    workflow_definition: String,
    status: String,
    start_time: Option<String>,
    end_time: Option<String>,
    final_output: Option<String>,
    error_message: Option<String>,
    retry_count: i64,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            job_id: row.try_get("job_id")?,
            user_id: row.try_get("user_id")?,
            workflow_definition: row.try_get("workflow_definition")?,
            status: row.try_get("status")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            final_output: row.try_get("final_output")?,
            error_message: row.try_get("error_message")?,
            retry_count: row.try_get("retry_count")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_job(self) -> Result<Job, RepositoryError> {
        let job_id: JobId = self
            .job_id
            .parse()
            .map_err(|e| RepositoryError::Query(format!("invalid job id: {e}")))?;
        let status: JobStatus = self.status.parse().map_err(RepositoryError::Query)?;
        let workflow_definition = serde_json::from_str(&self.workflow_definition)
            .map_err(|e| RepositoryError::Query(format!("invalid workflow_definition JSON: {e}")))?;
        let final_output = self
            .final_output
            .as_deref()
            .map(|s| {
                serde_json::from_str::<StepOutputs>(s)
                    .map_err(|e| RepositoryError::Query(format!("invalid final_output JSON: {e}")))
            })
            .transpose()?;

        Ok(Job {
            job_id,
            user_id: self.user_id,
            workflow_definition,
            status,
            start_time: self.start_time.as_deref().map(parse_datetime).transpose()?,
            end_time: self.end_time.as_deref().map(parse_datetime).transpose()?,
            final_output,
            error_message: self.error_message,
            retry_count: self.retry_count.max(0) as u32,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn rows_to_jobs(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<Job>, RepositoryError> {
    let mut jobs = Vec::with_capacity(rows.len());
    for row in rows {
        jobs.push(JobRow::from_row(row).map_err(query_error)?.into_job()?);
    }
    Ok(jobs)
}

// ---------------------------------------------------------------------------
// JobRepository impl
// ---------------------------------------------------------------------------

impl JobRepository for SqliteJobRepository {
    async fn insert(&self, job: &Job) -> Result<(), RepositoryError> {
        let definition_json = serde_json::to_string(&job.workflow_definition)
            .map_err(|e| RepositoryError::Query(format!("serialize definition: {e}")))?;
        let output_json = job
            .final_output
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("serialize output: {e}")))?;

        sqlx::query(
            r#"INSERT INTO jobs
               (job_id, user_id, workflow_definition, status, start_time, end_time,
                final_output, error_message, retry_count, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(job.job_id.to_string())
        .bind(&job.user_id)
        .bind(&definition_json)
        .bind(job.status.as_str())
        .bind(job.start_time.as_ref().map(format_datetime))
        .bind(job.end_time.as_ref().map(format_datetime))
        .bind(&output_json)
        .bind(&job.error_message)
        .bind(job.retry_count as i64)
        .bind(format_datetime(&job.created_at))
        .bind(format_datetime(&job.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(format!("job {} already exists", job.job_id))
            }
            _ => query_error(e),
        })?;

        Ok(())
    }

    async fn find_by_id(&self, job_id: &JobId) -> Result<Option<Job>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = ?"))
            .bind(job_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => Ok(Some(JobRow::from_row(&row).map_err(query_error)?.into_job()?)),
            None => Ok(None),
        }
    }

    async fn find_by_user(&self, user_id: &str, limit: u32) -> Result<Vec<Job>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE user_id = ? ORDER BY created_at DESC, job_id DESC LIMIT ?"
        ))
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows_to_jobs(&rows)
    }

    async fn find_claimable(&self, limit: u32) -> Result<Vec<Job>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status IN ('queued', 'retrying') \
             ORDER BY created_at ASC, job_id ASC LIMIT ?"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows_to_jobs(&rows)
    }

    async fn update_status(&self, job_id: &JobId, status: JobStatus) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE jobs SET status = ?, updated_at = ? WHERE job_id = ?")
            .bind(status.as_str())
            .bind(format_datetime(&Utc::now()))
            .bind(job_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn claim(&self, job_id: &JobId) -> Result<bool, RepositoryError> {
        let now = format_datetime(&Utc::now());
        let result = sqlx::query(
            r#"UPDATE jobs SET status = 'running', start_time = ?, updated_at = ?
               WHERE job_id = ? AND status IN ('queued', 'retrying')"#,
        )
        .bind(&now)
        .bind(&now)
        .bind(job_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_success(
        &self,
        job_id: &JobId,
        output: &StepOutputs,
    ) -> Result<bool, RepositoryError> {
        let output_json = serde_json::to_string(output)
            .map_err(|e| RepositoryError::Query(format!("serialize output: {e}")))?;
        let now = format_datetime(&Utc::now());

        let result = sqlx::query(
            r#"UPDATE jobs SET status = 'success', final_output = ?, error_message = NULL,
                   end_time = ?, updated_at = ?
               WHERE job_id = ? AND status = 'running'"#,
        )
        .bind(&output_json)
        .bind(&now)
        .bind(&now)
        .bind(job_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_failure(&self, job_id: &JobId, error: &str) -> Result<bool, RepositoryError> {
        let now = format_datetime(&Utc::now());
        let result = sqlx::query(
            r#"UPDATE jobs SET status = 'failed', error_message = ?, end_time = ?, updated_at = ?
               WHERE job_id = ? AND status = 'running'"#,
        )
        .bind(error)
        .bind(&now)
        .bind(&now)
        .bind(job_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_retry(
        &self,
        job_id: &JobId,
        error: &str,
        max_retries: u32,
    ) -> Result<Option<u32>, RepositoryError> {
        let row = sqlx::query(
            r#"UPDATE jobs
               SET status = 'retrying', retry_count = retry_count + 1, error_message = ?, updated_at = ?
               WHERE job_id = ? AND status = 'running' AND retry_count < ?
               RETURNING retry_count"#,
        )
        .bind(error)
        .bind(format_datetime(&Utc::now()))
        .bind(job_id.to_string())
        .bind(max_retries as i64)
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(query_error)?;

        row.map(|r| r.try_get::<i64, _>("retry_count").map(|n| n as u32))
            .transpose()
            .map_err(query_error)
    }
}
