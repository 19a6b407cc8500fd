//! Job store service.
//!
//! Wraps a `JobRepository` with creation-time validation and turns the
//! repository's applied/not-applied answers into descriptive errors.

use jobflow_types::error::{JobStoreError, RepositoryError};
use jobflow_types::job::{Job, JobId, JobStatus};
use jobflow_types::workflow::{StepOutputs, WorkflowDefinition};

use crate::repository::job::JobRepository;
use crate::workflow::definition::validate_definition;

/// Service owning every read and write of job records.
///
/// Generic over the repository so the same rules apply to SQLite and
/// in-memory storage.
#[derive(Debug, Clone)]
pub struct JobStore<R: JobRepository> {
    repo: R,
}

impl<R: JobRepository> JobStore<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Access the underlying repository.
    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Validate `definition` and persist a new `Queued` job.
    ///
    /// Nothing is written when validation fails.
    pub async fn create(
        &self,
        user_id: &str,
        definition: WorkflowDefinition,
    ) -> Result<Job, JobStoreError> {
        validate_definition(&definition)?;

        let job = Job::queued(user_id, definition);
        self.repo.insert(&job).await?;
        tracing::info!(
            job_id = %job.job_id,
            user_id,
            steps = job.workflow_definition.steps.len(),
            "job created"
        );
        Ok(job)
    }

    pub async fn find_by_id(&self, job_id: &JobId) -> Result<Option<Job>, JobStoreError> {
        Ok(self.repo.find_by_id(job_id).await?)
    }

    /// Like `find_by_id`, but a missing job is an error.
    pub async fn get(&self, job_id: &JobId) -> Result<Job, JobStoreError> {
        self.find_by_id(job_id)
            .await?
            .ok_or(JobStoreError::NotFound(*job_id))
    }

    /// A user's jobs, newest first.
    pub async fn find_by_user(&self, user_id: &str, limit: u32) -> Result<Vec<Job>, JobStoreError> {
        Ok(self.repo.find_by_user(user_id, limit).await?)
    }

    /// Jobs waiting to be claimed (`Queued` or `Retrying`), oldest first.
    pub async fn find_queued_jobs(&self, limit: u32) -> Result<Vec<Job>, JobStoreError> {
        Ok(self.repo.find_claimable(limit).await?)
    }

    /// Overwrite a job's status without any precondition.
    pub async fn update_status(&self, job_id: &JobId, status: JobStatus) -> Result<(), JobStoreError> {
        self.repo
            .update_status(job_id, status)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => JobStoreError::NotFound(*job_id),
                other => other.into(),
            })
    }

    /// Atomically move a `Queued`/`Retrying` job to `Running`.
    ///
    /// Returns `false` if another caller already claimed it or it is gone.
    pub async fn try_claim(&self, job_id: &JobId) -> Result<bool, JobStoreError> {
        Ok(self.repo.claim(job_id).await?)
    }

    /// Persist the final output and mark the job `Success`.
    pub async fn update_output(&self, job_id: &JobId, output: &StepOutputs) -> Result<(), JobStoreError> {
        if self.repo.record_success(job_id, output).await? {
            return Ok(());
        }
        Err(self.rejection(job_id, concurrent_write(job_id)).await)
    }

    /// Persist the error and mark the job `Failed`.
    pub async fn update_error(&self, job_id: &JobId, error: &str) -> Result<(), JobStoreError> {
        if self.repo.record_failure(job_id, error).await? {
            return Ok(());
        }
        Err(self.rejection(job_id, concurrent_write(job_id)).await)
    }

    /// Record a failed attempt and mark the job `Retrying`.
    ///
    /// Returns the new retry count. Fails with `RetriesExhausted` once the
    /// job has used `max_retries` retries.
    pub async fn increment_retry_count(
        &self,
        job_id: &JobId,
        error: &str,
        max_retries: u32,
    ) -> Result<u32, JobStoreError> {
        if let Some(count) = self.repo.record_retry(job_id, error, max_retries).await? {
            return Ok(count);
        }
        Err(self
            .rejection(job_id, JobStoreError::RetriesExhausted(*job_id))
            .await)
    }

    /// Explain why a write guarded on `Running` did not apply.
    ///
    /// `when_running` is returned if the job turns out to still be running.
    async fn rejection(&self, job_id: &JobId, when_running: JobStoreError) -> JobStoreError {
        match self.repo.find_by_id(job_id).await {
            Ok(None) => JobStoreError::NotFound(*job_id),
            Ok(Some(job)) if job.status != JobStatus::Running => JobStoreError::InvalidTransition {
                job_id: *job_id,
                expected: JobStatus::Running,
                actual: job.status,
            },
            Ok(Some(_)) => when_running,
            Err(e) => e.into(),
        }
    }
}

fn concurrent_write(job_id: &JobId) -> JobStoreError {
    RepositoryError::Conflict(format!("job {job_id} changed during write")).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::InMemoryJobRepository;
    use jobflow_types::error::ValidationError;
    use jobflow_types::workflow::StepDefinition;
    use serde_json::json;

    fn store() -> JobStore<InMemoryJobRepository> {
        JobStore::new(InMemoryJobRepository::new())
    }

    fn two_step() -> WorkflowDefinition {
        WorkflowDefinition::new(vec![
            StepDefinition::new("a", "t1", "foo"),
            StepDefinition::new("b", "t2", "bar").depends_on("a"),
        ])
    }

    #[tokio::test]
    async fn test_create_persists_queued_job() {
        let store = store();
        let job = store.create("user-1", two_step()).await.unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.retry_count, 0);
        assert!(job.final_output.is_none());

        let found = store.get(&job.job_id).await.unwrap();
        assert_eq!(found.workflow_definition, two_step());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_and_persists_nothing() {
        let store = store();
        let bad = WorkflowDefinition::new(vec![
            StepDefinition::new("a", "t1", "foo").depends_on("b"),
            StepDefinition::new("b", "t1", "bar"),
        ]);

        let err = store.create("user-1", bad).await.unwrap_err();
        assert!(matches!(
            err,
            JobStoreError::Validation(ValidationError::ForwardDependency { .. })
        ));
        assert!(store.repository().is_empty());
    }

    #[tokio::test]
    async fn test_success_path() {
        let store = store();
        let job = store.create("u", two_step()).await.unwrap();
        assert!(store.try_claim(&job.job_id).await.unwrap());

        let mut output = StepOutputs::new();
        output.insert("a".to_string(), json!({"x": 1}));
        store.update_output(&job.job_id, &output).await.unwrap();

        let done = store.get(&job.job_id).await.unwrap();
        assert_eq!(done.status, JobStatus::Success);
        assert_eq!(done.final_output, Some(output));
        assert!(done.end_time.is_some());
        assert!(done.updated_at >= job.updated_at);
    }

    #[tokio::test]
    async fn test_terminal_write_on_unclaimed_job_is_invalid() {
        let store = store();
        let job = store.create("u", two_step()).await.unwrap();

        let err = store.update_error(&job.job_id, "boom").await.unwrap_err();
        assert!(matches!(
            err,
            JobStoreError::InvalidTransition {
                actual: JobStatus::Queued,
                ..
            }
        ));

        let err = store
            .update_output(&JobId::new(), &StepOutputs::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JobStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_increment_retry_count_until_exhausted() {
        let store = store();
        let job = store.create("u", two_step()).await.unwrap();

        for expected in 1..=3 {
            assert!(store.try_claim(&job.job_id).await.unwrap());
            let count = store
                .increment_retry_count(&job.job_id, "flaky", 3)
                .await
                .unwrap();
            assert_eq!(count, expected);
            let retrying = store.get(&job.job_id).await.unwrap();
            assert_eq!(retrying.status, JobStatus::Retrying);
            assert_eq!(retrying.error_message.as_deref(), Some("flaky"));
        }

        assert!(store.try_claim(&job.job_id).await.unwrap());
        let err = store
            .increment_retry_count(&job.job_id, "flaky", 3)
            .await
            .unwrap_err();
        assert!(matches!(err, JobStoreError::RetriesExhausted(_)));
    }

    #[tokio::test]
    async fn test_find_queued_includes_retrying() {
        let store = store();
        let first = store.create("u", two_step()).await.unwrap();
        let second = store.create("u", two_step()).await.unwrap();

        store.try_claim(&first.job_id).await.unwrap();
        store
            .increment_retry_count(&first.job_id, "x", 3)
            .await
            .unwrap();

        let queued = store.find_queued_jobs(10).await.unwrap();
        assert_eq!(queued.len(), 2);
        assert!(queued.iter().any(|j| j.job_id == second.job_id));
        assert!(queued.iter().any(|j| j.status == JobStatus::Retrying));
    }

    #[tokio::test]
    async fn test_update_status_unknown_job() {
        let store = store();
        let id = JobId::new();
        assert!(matches!(
            store.update_status(&id, JobStatus::Failed).await,
            Err(JobStoreError::NotFound(missing)) if missing == id
        ));
    }
}
