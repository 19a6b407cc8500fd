//! In-memory repository implementations.
//!
//! Backed by `DashMap`, whose per-entry locking makes each compare-and-set a
//! single atomic step. Used by tests and by single-process deployments that
//! do not need durable job state.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use jobflow_types::error::RepositoryError;
use jobflow_types::job::{Job, JobId, JobStatus};
use jobflow_types::tool::{Tool, ToolStatus};
use jobflow_types::workflow::StepOutputs;

use super::job::JobRepository;
use super::tool::ToolRegistry;

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// In-memory `JobRepository`. Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobRepository {
    jobs: Arc<DashMap<JobId, Job>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Apply `f` to a job only if its status is in `expected`.
    fn transition<T>(
        &self,
        job_id: &JobId,
        expected: &[JobStatus],
        f: impl FnOnce(&mut Job) -> Option<T>,
    ) -> Option<T> {
        let mut entry = self.jobs.get_mut(job_id)?;
        if !expected.contains(&entry.status) {
            return None;
        }
        let out = f(&mut entry)?;
        entry.updated_at = Utc::now();
        Some(out)
    }
}

impl JobRepository for InMemoryJobRepository {
    async fn insert(&self, job: &Job) -> Result<(), RepositoryError> {
        if self.jobs.contains_key(&job.job_id) {
            return Err(RepositoryError::Conflict(format!(
                "job {} already exists",
                job.job_id
            )));
        }
        self.jobs.insert(job.job_id, job.clone());
        Ok(())
    }

    async fn find_by_id(&self, job_id: &JobId) -> Result<Option<Job>, RepositoryError> {
        Ok(self.jobs.get(job_id).map(|j| j.clone()))
    }

    async fn find_by_user(&self, user_id: &str, limit: u32) -> Result<Vec<Job>, RepositoryError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|j| j.user_id == user_id)
            .map(|j| j.clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.job_id.cmp(&a.job_id)));
        jobs.truncate(limit as usize);
        Ok(jobs)
    }

    async fn find_claimable(&self, limit: u32) -> Result<Vec<Job>, RepositoryError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|j| j.status.is_claimable())
            .map(|j| j.clone())
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.job_id.cmp(&b.job_id)));
        jobs.truncate(limit as usize);
        Ok(jobs)
    }

    async fn update_status(&self, job_id: &JobId, status: JobStatus) -> Result<(), RepositoryError> {
        let mut entry = self.jobs.get_mut(job_id).ok_or(RepositoryError::NotFound)?;
        entry.status = status;
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn claim(&self, job_id: &JobId) -> Result<bool, RepositoryError> {
        Ok(self
            .transition(job_id, &JobStatus::CLAIMABLE, |job| {
                job.status = JobStatus::Running;
                job.start_time = Some(Utc::now());
                Some(())
            })
            .is_some())
    }

    async fn record_success(
        &self,
        job_id: &JobId,
        output: &StepOutputs,
    ) -> Result<bool, RepositoryError> {
        Ok(self
            .transition(job_id, &[JobStatus::Running], |job| {
                job.status = JobStatus::Success;
                job.final_output = Some(output.clone());
                job.error_message = None;
                job.end_time = Some(Utc::now());
                Some(())
            })
            .is_some())
    }

    async fn record_failure(&self, job_id: &JobId, error: &str) -> Result<bool, RepositoryError> {
        Ok(self
            .transition(job_id, &[JobStatus::Running], |job| {
                job.status = JobStatus::Failed;
                job.error_message = Some(error.to_string());
                job.end_time = Some(Utc::now());
                Some(())
            })
            .is_some())
    }

    async fn record_retry(
        &self,
        job_id: &JobId,
        error: &str,
        max_retries: u32,
    ) -> Result<Option<u32>, RepositoryError> {
        Ok(self.transition(job_id, &[JobStatus::Running], |job| {
            if job.retry_count >= max_retries {
                return None;
            }
            job.retry_count += 1;
            job.status = JobStatus::Retrying;
            job.error_message = Some(error.to_string());
            Some(job.retry_count)
        }))
    }
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// In-memory `ToolRegistry`. Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryToolRegistry {
    tools: Arc<DashMap<String, Tool>>,
}

impl InMemoryToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry pre-populated with `tools`.
    pub fn with_tools(tools: impl IntoIterator<Item = Tool>) -> Self {
        let registry = Self::new();
        for tool in tools {
            registry.tools.insert(tool.id.clone(), tool);
        }
        registry
    }
}

impl ToolRegistry for InMemoryToolRegistry {
    async fn register(&self, tool: &Tool) -> Result<(), RepositoryError> {
        self.tools.insert(tool.id.clone(), tool.clone());
        Ok(())
    }

    async fn find_by_id(&self, tool_id: &str) -> Result<Option<Tool>, RepositoryError> {
        Ok(self.tools.get(tool_id).map(|t| t.clone()))
    }

    async fn list(&self) -> Result<Vec<Tool>, RepositoryError> {
        let mut tools: Vec<Tool> = self.tools.iter().map(|t| t.clone()).collect();
        tools.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tools)
    }

    async fn set_status(&self, tool_id: &str, status: ToolStatus) -> Result<(), RepositoryError> {
        let mut entry = self.tools.get_mut(tool_id).ok_or(RepositoryError::NotFound)?;
        entry.status = status;
        entry.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobflow_types::workflow::{StepDefinition, WorkflowDefinition};

    fn sample_job(user: &str) -> Job {
        Job::queued(
            user,
            WorkflowDefinition::new(vec![StepDefinition::new("a", "t1", "foo")]),
        )
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = InMemoryJobRepository::new();
        let job = sample_job("u1");
        repo.insert(&job).await.unwrap();

        let found = repo.find_by_id(&job.job_id).await.unwrap().unwrap();
        assert_eq!(found.user_id, "u1");
        assert_eq!(found.status, JobStatus::Queued);
        assert!(repo.find_by_id(&JobId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_duplicate_conflicts() {
        let repo = InMemoryJobRepository::new();
        let job = sample_job("u1");
        repo.insert(&job).await.unwrap();
        assert!(matches!(
            repo.insert(&job).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_claim_is_compare_and_set() {
        let repo = InMemoryJobRepository::new();
        let job = sample_job("u1");
        repo.insert(&job).await.unwrap();

        assert!(repo.claim(&job.job_id).await.unwrap());
        assert!(!repo.claim(&job.job_id).await.unwrap());

        let running = repo.find_by_id(&job.job_id).await.unwrap().unwrap();
        assert_eq!(running.status, JobStatus::Running);
        assert!(running.start_time.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let repo = InMemoryJobRepository::new();
        let job = sample_job("u1");
        repo.insert(&job).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let repo = repo.clone();
            let id = job.job_id;
            handles.push(tokio::spawn(async move { repo.claim(&id).await.unwrap() }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_terminal_writes_require_running() {
        let repo = InMemoryJobRepository::new();
        let job = sample_job("u1");
        repo.insert(&job).await.unwrap();

        assert!(!repo.record_success(&job.job_id, &StepOutputs::new()).await.unwrap());
        assert!(!repo.record_failure(&job.job_id, "x").await.unwrap());

        repo.claim(&job.job_id).await.unwrap();
        assert!(repo.record_failure(&job.job_id, "boom").await.unwrap());
        assert!(!repo.record_success(&job.job_id, &StepOutputs::new()).await.unwrap());

        let failed = repo.find_by_id(&job.job_id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
        assert!(failed.end_time.is_some());
    }

    #[tokio::test]
    async fn test_record_retry_respects_bound() {
        let repo = InMemoryJobRepository::new();
        let job = sample_job("u1");
        repo.insert(&job).await.unwrap();

        for expected in 1..=2 {
            repo.claim(&job.job_id).await.unwrap();
            let count = repo.record_retry(&job.job_id, "flaky", 2).await.unwrap();
            assert_eq!(count, Some(expected));
        }

        repo.claim(&job.job_id).await.unwrap();
        assert_eq!(repo.record_retry(&job.job_id, "flaky", 2).await.unwrap(), None);
        let job = repo.find_by_id(&job.job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.retry_count, 2);
    }

    #[tokio::test]
    async fn test_success_after_retry_clears_error() {
        let repo = InMemoryJobRepository::new();
        let job = sample_job("u1");
        repo.insert(&job).await.unwrap();

        repo.claim(&job.job_id).await.unwrap();
        repo.record_retry(&job.job_id, "flaky", 3).await.unwrap();
        repo.claim(&job.job_id).await.unwrap();
        assert!(repo.record_success(&job.job_id, &StepOutputs::new()).await.unwrap());

        let done = repo.find_by_id(&job.job_id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Success);
        assert_eq!(done.retry_count, 1);
        assert!(done.final_output.is_some());
        assert!(done.error_message.is_none());
    }

    #[tokio::test]
    async fn test_find_claimable_is_fifo_and_filtered() {
        let repo = InMemoryJobRepository::new();
        let first = sample_job("u1");
        let mut second = sample_job("u1");
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        let mut done = sample_job("u1");
        done.status = JobStatus::Success;

        repo.insert(&second).await.unwrap();
        repo.insert(&done).await.unwrap();
        repo.insert(&first).await.unwrap();

        let claimable = repo.find_claimable(10).await.unwrap();
        let ids: Vec<JobId> = claimable.iter().map(|j| j.job_id).collect();
        assert_eq!(ids, vec![first.job_id, second.job_id]);

        assert_eq!(repo.find_claimable(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_find_by_user() {
        let repo = InMemoryJobRepository::new();
        repo.insert(&sample_job("u1")).await.unwrap();
        repo.insert(&sample_job("u1")).await.unwrap();
        repo.insert(&sample_job("u2")).await.unwrap();

        assert_eq!(repo.find_by_user("u1", 10).await.unwrap().len(), 2);
        assert_eq!(repo.find_by_user("u3", 10).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_update_status_missing_job() {
        let repo = InMemoryJobRepository::new();
        assert!(matches!(
            repo.update_status(&JobId::new(), JobStatus::Failed).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_tool_registry_roundtrip() {
        let registry = InMemoryToolRegistry::new();
        registry
            .register(&Tool::new("t2", "Two", "http://b"))
            .await
            .unwrap();
        registry
            .register(&Tool::new("t1", "One", "http://a"))
            .await
            .unwrap();

        let ids: Vec<String> = registry.list().await.unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["t1", "t2"]);

        registry.set_status("t1", ToolStatus::Approved).await.unwrap();
        assert!(registry.find_by_id("t1").await.unwrap().unwrap().is_callable());
        assert!(matches!(
            registry.set_status("missing", ToolStatus::Approved).await,
            Err(RepositoryError::NotFound)
        ));
    }
}
