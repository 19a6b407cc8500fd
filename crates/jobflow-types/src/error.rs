use thiserror::Error;

use crate::job::{JobId, JobStatus};

/// Structural problems in a workflow definition, reported at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("workflow must have at least one step")]
    EmptyWorkflow,

    #[error("step at position {index} has an empty id")]
    EmptyStepId { index: usize },

    #[error("step '{step_id}' has an empty {field}")]
    EmptyField { step_id: String, field: &'static str },

    #[error("duplicate step ID: '{0}'")]
    DuplicateStepId(String),

    #[error("step '{0}' depends on itself")]
    SelfDependency(String),

    #[error("step '{step_id}' depends on unknown step '{dependency}'")]
    UnknownDependency { step_id: String, dependency: String },

    #[error("step '{step_id}' depends on '{dependency}', which is declared after it")]
    ForwardDependency { step_id: String, dependency: String },

    #[error("cycle detected involving step '{0}'")]
    Cycle(String),
}

/// Errors from repository operations (used by trait definitions in jobflow-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from job store operations.
#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("invalid workflow: {0}")]
    Validation(#[from] ValidationError),

    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {job_id} is {actual}, expected {expected}")]
    InvalidTransition {
        job_id: JobId,
        expected: JobStatus,
        actual: JobStatus,
    },

    #[error("job {0} has exhausted its retries")]
    RetriesExhausted(JobId),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
