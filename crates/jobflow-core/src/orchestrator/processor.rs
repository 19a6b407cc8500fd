//! Per-job handling path shared by every intake.
//!
//! Both the `job.created` subscription and the polling backstop funnel into
//! `JobProcessor::handle_job`, which claims the job, runs its workflow, and
//! records the outcome. The claim is a compare-and-set in the store, so
//! duplicate deliveries and racing intakes are harmless no-ops.

use std::time::Instant;

use jobflow_types::error::JobStoreError;
use jobflow_types::event::JobEvent;
use jobflow_types::job::{Job, JobId, JobStatus};
use jobflow_types::queue::{JobCreatedPayload, QueueMessage};
use tracing::{debug, error, info, warn};

use crate::event::EventBus;
use crate::queue::HandlerError;
use crate::repository::job::JobRepository;
use crate::repository::tool::ToolRegistry;
use crate::service::job::JobStore;
use crate::tool::ToolClient;
use crate::workflow::executor::WorkflowExecutor;

use super::OrchestratorError;
use super::retry::{RetryDecision, RetryPolicy};

/// What one pass through `handle_job` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job was not claimable (already running or finished).
    Skipped(JobStatus),
    /// Another intake claimed the job first.
    ClaimLost,
    /// All steps ran and the output was stored.
    Succeeded { steps: usize },
    /// The attempt failed and the job was put back as `Retrying`.
    Retrying { retry_count: u32 },
    /// The attempt failed and the job is permanently `Failed`.
    Failed,
}

/// Claims and runs individual jobs.
pub struct JobProcessor<R: JobRepository, G: ToolRegistry, T: ToolClient> {
    store: JobStore<R>,
    executor: WorkflowExecutor<G, T>,
    retry: RetryPolicy,
    event_bus: EventBus,
}

impl<R: JobRepository, G: ToolRegistry, T: ToolClient> JobProcessor<R, G, T> {
    pub fn new(
        store: JobStore<R>,
        executor: WorkflowExecutor<G, T>,
        retry: RetryPolicy,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            executor,
            retry,
            event_bus,
        }
    }

    pub fn store(&self) -> &JobStore<R> {
        &self.store
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Claim `job_id` and drive one attempt to its outcome.
    ///
    /// A missing job yields `OrchestratorError::StaleMessage`. Workflow
    /// failures are recorded on the job and reported as an outcome, never
    /// as an error; only store failures surface as `Err`.
    pub async fn handle_job(&self, job_id: JobId) -> Result<JobOutcome, OrchestratorError> {
        let Some(job) = self.store.find_by_id(&job_id).await? else {
            return Err(OrchestratorError::StaleMessage(job_id));
        };

        if !job.status.is_claimable() {
            debug!(%job_id, status = %job.status, "job not claimable, skipping");
            return Ok(JobOutcome::Skipped(job.status));
        }

        if !self.store.try_claim(&job_id).await? {
            debug!(%job_id, "job claimed by another intake");
            return Ok(JobOutcome::ClaimLost);
        }

        match self.run_claimed(&job).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.release_after_store_error(&job, &e).await;
                Err(e)
            }
        }
    }

    /// One attempt of a job this processor has just claimed.
    async fn run_claimed(&self, job: &Job) -> Result<JobOutcome, OrchestratorError> {
        let job_id = job.job_id;
        let attempt = job.retry_count + 1;
        info!(%job_id, user_id = %job.user_id, attempt, "job claimed");
        self.event_bus
            .publish(JobEvent::JobClaimed { job_id, attempt });

        let started = Instant::now();
        match self
            .executor
            .execute(job_id, &job.workflow_definition)
            .await
        {
            Ok(outputs) => {
                self.store.update_output(&job_id, &outputs).await?;
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(%job_id, steps = outputs.len(), duration_ms, "job succeeded");
                self.event_bus.publish(JobEvent::JobSucceeded {
                    job_id,
                    steps_completed: outputs.len() as u32,
                    duration_ms,
                });
                Ok(JobOutcome::Succeeded {
                    steps: outputs.len(),
                })
            }
            Err(e) => self.record_failure(job, &e.to_string()).await,
        }
    }

    /// Move a claimed job out of `Running` after its outcome could not be
    /// stored. Neither intake reclaims a `Running` job, so without this the
    /// job would never be retried.
    async fn release_after_store_error(&self, job: &Job, cause: &OrchestratorError) {
        let job_id = job.job_id;
        let error = format!("failed to record job outcome: {cause}");

        match self
            .store
            .increment_retry_count(&job_id, &error, self.retry.max_retries())
            .await
        {
            Ok(retry_count) => {
                warn!(%job_id, retry_count, error = %cause, "outcome not stored, job released for retry");
                self.event_bus.publish(JobEvent::JobRetrying {
                    job_id,
                    retry_count,
                    error,
                });
                return;
            }
            Err(JobStoreError::RetriesExhausted(_)) => {}
            Err(e) => {
                error!(%job_id, error = %e, "could not release job after store error, job left running");
                return;
            }
        }

        match self.store.update_error(&job_id, &error).await {
            Ok(()) => {
                error!(%job_id, error = %cause, "outcome not stored and retries exhausted, job failed");
                self.event_bus.publish(JobEvent::JobFailed { job_id, error });
            }
            Err(e) => {
                error!(%job_id, error = %e, "could not fail job after store error, job left running");
            }
        }
    }

    /// Retry or fail a job whose attempt just failed.
    async fn record_failure(&self, job: &Job, error: &str) -> Result<JobOutcome, OrchestratorError> {
        let job_id = job.job_id;

        if self.retry.decide(job.retry_count) == RetryDecision::Retry {
            match self
                .store
                .increment_retry_count(&job_id, error, self.retry.max_retries())
                .await
            {
                Ok(retry_count) => {
                    warn!(%job_id, retry_count, error, "job attempt failed, will retry");
                    self.event_bus.publish(JobEvent::JobRetrying {
                        job_id,
                        retry_count,
                        error: error.to_string(),
                    });
                    return Ok(JobOutcome::Retrying { retry_count });
                }
                Err(JobStoreError::RetriesExhausted(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.store.update_error(&job_id, error).await?;
        error!(%job_id, retry_count = job.retry_count, error, "job failed");
        self.event_bus.publish(JobEvent::JobFailed {
            job_id,
            error: error.to_string(),
        });
        Ok(JobOutcome::Failed)
    }

    /// Queue handler for `job.created`.
    ///
    /// Malformed payloads and stale references are acknowledged; store
    /// failures ask the transport to redeliver.
    pub async fn handle_message(&self, message: QueueMessage) -> Result<(), HandlerError> {
        let payload: JobCreatedPayload = match message.decode() {
            Ok(p) => p,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "malformed job.created payload, dropping");
                return Ok(());
            }
        };

        match self.handle_job(payload.job_id).await {
            Ok(outcome) => {
                debug!(job_id = %payload.job_id, ?outcome, "job.created handled");
                Ok(())
            }
            Err(OrchestratorError::StaleMessage(job_id)) => {
                info!(%job_id, "stale job reference, dropping message");
                Ok(())
            }
            Err(e) => {
                error!(job_id = %payload.job_id, error = %e, "job.created handling failed");
                Err(HandlerError::new(e.to_string()))
            }
        }
    }
}
