//! Job admission: credit check, persistence, and announcement.
//!
//! Admission is the only way a job enters the system. The definition is
//! validated first so malformed workflows are never charged, then the credit
//! gate runs, the job store persists the job as `Queued`, and finally a
//! `job.created` message is published. A publish failure does
//! not undo the job; the orchestrator's poller will still find it.

use jobflow_types::error::JobStoreError;
use jobflow_types::job::Job;
use jobflow_types::queue::QueueMessage;
use jobflow_types::workflow::WorkflowDefinition;
use thiserror::Error;

use crate::queue::Producer;
use crate::repository::job::JobRepository;
use crate::service::job::JobStore;
use crate::workflow::validate_definition;

/// Why a submission was refused.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("insufficient credits for user '{user_id}': {reason}")]
    InsufficientCredits { user_id: String, reason: String },

    #[error(transparent)]
    Store(#[from] JobStoreError),
}

/// Authorizes (and charges for) a workflow before it is admitted.
pub trait CreditGate: Send + Sync {
    fn authorize(
        &self,
        user_id: &str,
        definition: &WorkflowDefinition,
    ) -> impl std::future::Future<Output = Result<(), AdmissionError>> + Send;
}

/// Gate that admits everything. Used when billing is handled elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllCredits;

impl CreditGate for AllowAllCredits {
    async fn authorize(
        &self,
        _user_id: &str,
        _definition: &WorkflowDefinition,
    ) -> Result<(), AdmissionError> {
        Ok(())
    }
}

/// Entry point for new jobs.
pub struct JobAdmission<R: JobRepository, P: Producer, C: CreditGate> {
    store: JobStore<R>,
    producer: P,
    credits: C,
}

impl<R: JobRepository, P: Producer, C: CreditGate> JobAdmission<R, P, C> {
    pub fn new(store: JobStore<R>, producer: P, credits: C) -> Self {
        Self {
            store,
            producer,
            credits,
        }
    }

    /// Admit a workflow for `user_id` and return the `Queued` job.
    pub async fn submit(
        &self,
        user_id: &str,
        definition: WorkflowDefinition,
    ) -> Result<Job, AdmissionError> {
        validate_definition(&definition).map_err(JobStoreError::from)?;
        self.credits.authorize(user_id, &definition).await?;
        let job = self.store.create(user_id, definition).await?;

        match QueueMessage::job_created(&job) {
            Ok(message) => {
                if let Err(e) = self.producer.send(message).await {
                    tracing::warn!(job_id = %job.job_id, error = %e, "failed to publish job.created, poller will pick the job up");
                }
            }
            Err(e) => {
                tracing::warn!(job_id = %job.job_id, error = %e, "failed to encode job.created");
            }
        }
        Ok(job)
    }
}
