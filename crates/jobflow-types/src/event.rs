//! Event types for the Jobflow lifecycle event bus.
//!
//! `JobEvent` is broadcast by the orchestrator and workflow executor as a job
//! moves through its state machine. All variants are Clone + Send + Sync for
//! use with tokio broadcast channels.

use serde::{Deserialize, Serialize};

use crate::job::JobId;

/// Events emitted while jobs are claimed and executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// This orchestrator won the claim and moved the job to `Running`.
    JobClaimed {
        job_id: JobId,
        /// Attempt number (1-based).
        attempt: u32,
    },

    /// A step is about to call its tool.
    StepStarted {
        job_id: JobId,
        step_id: String,
        tool_id: String,
    },

    /// A step's tool call returned a result.
    StepCompleted {
        job_id: JobId,
        step_id: String,
        duration_ms: u64,
    },

    /// All steps completed and the output was persisted.
    JobSucceeded {
        job_id: JobId,
        steps_completed: u32,
        duration_ms: u64,
    },

    /// The attempt failed and the job was put back for another try.
    JobRetrying {
        job_id: JobId,
        retry_count: u32,
        error: String,
    },

    /// The job failed permanently.
    JobFailed { job_id: JobId, error: String },
}

impl JobEvent {
    /// The job every variant refers to.
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::JobClaimed { job_id, .. }
            | JobEvent::StepStarted { job_id, .. }
            | JobEvent::StepCompleted { job_id, .. }
            | JobEvent::JobSucceeded { job_id, .. }
            | JobEvent::JobRetrying { job_id, .. }
            | JobEvent::JobFailed { job_id, .. } => *job_id,
        }
    }

    /// Whether this event ends the current attempt.
    pub fn ends_attempt(&self) -> bool {
        matches!(
            self,
            JobEvent::JobSucceeded { .. } | JobEvent::JobRetrying { .. } | JobEvent::JobFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_claimed_serde_roundtrip() {
        let event = JobEvent::JobClaimed {
            job_id: JobId::new(),
            attempt: 2,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"job_claimed\""));
        let parsed: JobEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_job_id_accessor() {
        let job_id = JobId::new();
        let event = JobEvent::StepStarted {
            job_id,
            step_id: "a".to_string(),
            tool_id: "t1".to_string(),
        };
        assert_eq!(event.job_id(), job_id);
        assert!(!event.ends_attempt());
    }

    #[test]
    fn test_ends_attempt() {
        let job_id = JobId::new();
        assert!(JobEvent::JobFailed {
            job_id,
            error: "x".to_string()
        }
        .ends_attempt());
        assert!(JobEvent::JobRetrying {
            job_id,
            retry_count: 1,
            error: "x".to_string()
        }
        .ends_attempt());
    }
}
