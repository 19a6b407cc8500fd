//! Job-level retry decisions.
//!
//! Retries are blind: a retried job re-runs its whole workflow from the
//! first step. The policy only decides whether another attempt is allowed.

use jobflow_types::config::OrchestratorConfig;
use jobflow_types::job::MAX_RETRIES;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Mark the job `Retrying` so an intake path reclaims it.
    Retry,
    /// Mark the job permanently `Failed`.
    GiveUp,
}

/// Stateless retry bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    /// Build a policy. Bounds above `MAX_RETRIES` are clamped.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.min(MAX_RETRIES),
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config.effective_max_retries())
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decide based on how many retries the job has already used.
    pub fn decide(&self, retry_count: u32) -> RetryDecision {
        if retry_count >= self.max_retries {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MAX_RETRIES)
    }
}
