use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::workflow::{StepOutputs, WorkflowDefinition};

/// Upper bound on automatic retries of a failed job.
///
/// A job is attempted at most `MAX_RETRIES + 1` times: the first attempt plus
/// one attempt per pass through `Retrying`.
pub const MAX_RETRIES: u32 = 3;

/// Unique identifier for a job, wrapping a UUID v7 (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a new JobId using UUID v7.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// One workflow execution request tied to a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub user_id: String,
    pub workflow_definition: WorkflowDefinition,
    pub status: JobStatus,
    /// Set when the job was last claimed into `Running`.
    pub start_time: Option<DateTime<Utc>>,
    /// Set when the job reached `Success` or `Failed`.
    pub end_time: Option<DateTime<Utc>>,
    /// Step results keyed by step id. Only present on `Success`.
    pub final_output: Option<StepOutputs>,
    /// Last failure message. Present on `Failed` and `Retrying`.
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build a freshly admitted job in `Queued` state.
    pub fn queued(user_id: impl Into<String>, workflow_definition: WorkflowDefinition) -> Self {
        let now = Utc::now();
        Self {
            job_id: JobId::new(),
            user_id: user_id.into(),
            workflow_definition,
            status: JobStatus::Queued,
            start_time: None,
            end_time: None,
            final_output: None,
            error_message: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Job lifecycle states.
///
/// - Queued: admitted, waiting to be claimed
/// - Running: claimed by exactly one orchestrator
/// - Retrying: last attempt failed, waiting to be reclaimed
/// - Success / Failed: terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    Failed,
    Retrying,
}

impl JobStatus {
    /// States a job can be claimed from.
    pub const CLAIMABLE: [JobStatus; 2] = [JobStatus::Queued, JobStatus::Retrying];

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }

    pub fn is_claimable(&self) -> bool {
        Self::CLAIMABLE.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Retrying => "retrying",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "success" => Ok(JobStatus::Success),
            "failed" => Ok(JobStatus::Failed),
            "retrying" => Ok(JobStatus::Retrying),
            other => Err(format!("invalid job status: '{other}'")),
        }
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        JobStatus::Queued
    }
}
