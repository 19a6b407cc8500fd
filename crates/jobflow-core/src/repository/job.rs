//! Job repository trait definition.
//!
//! Defines the storage interface for job records. The infrastructure layer
//! (jobflow-infra) implements this trait with SQLite persistence; an
//! in-memory implementation lives in `repository::memory`.

use jobflow_types::error::RepositoryError;
use jobflow_types::job::{Job, JobId, JobStatus};
use jobflow_types::workflow::StepOutputs;

/// Repository trait for job persistence.
///
/// Every state change that can race between orchestrator instances is a
/// compare-and-set: the write only applies when the stored row is still in
/// the expected state, and the method reports whether it applied.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait JobRepository: Send + Sync {
    /// Insert a freshly created job.
    fn insert(
        &self,
        job: &Job,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a job by its ID.
    fn find_by_id(
        &self,
        job_id: &JobId,
    ) -> impl std::future::Future<Output = Result<Option<Job>, RepositoryError>> + Send;

    /// List a user's jobs, newest first.
    fn find_by_user(
        &self,
        user_id: &str,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Job>, RepositoryError>> + Send;

    /// List jobs in `Queued` or `Retrying` state, oldest first.
    fn find_claimable(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Job>, RepositoryError>> + Send;

    /// Unconditionally overwrite a job's status.
    ///
    /// Returns `RepositoryError::NotFound` if the job does not exist.
    fn update_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Move a claimable job to `Running` and stamp `start_time`.
    ///
    /// Returns `false` when the job is missing or no longer claimable.
    fn claim(
        &self,
        job_id: &JobId,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Record a successful run: `Success`, final output, and `end_time`.
    /// Clears any error left by an earlier attempt.
    ///
    /// Only applies to a `Running` job. Returns whether it applied.
    fn record_success(
        &self,
        job_id: &JobId,
        output: &StepOutputs,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Record a permanent failure: `Failed`, error message, and `end_time`.
    ///
    /// Only applies to a `Running` job. Returns whether it applied.
    fn record_failure(
        &self,
        job_id: &JobId,
        error: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Put a `Running` job back for another attempt: bump `retry_count`,
    /// set `Retrying`, and record the error.
    ///
    /// Only applies while `retry_count < max_retries`. Returns the new retry
    /// count, or `None` if the write did not apply.
    fn record_retry(
        &self,
        job_id: &JobId,
        error: &str,
        max_retries: u32,
    ) -> impl std::future::Future<Output = Result<Option<u32>, RepositoryError>> + Send;
}
