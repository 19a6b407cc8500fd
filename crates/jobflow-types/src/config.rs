//! Global configuration types for Jobflow.
//!
//! `JobflowConfig` represents the top-level `config.toml` that controls the
//! database location, orchestrator polling, queue backend selection, and the
//! tool HTTP client.

use serde::{Deserialize, Serialize};

use crate::job::MAX_RETRIES;

/// Top-level configuration.
///
/// Loaded from `~/.jobflow/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobflowConfig {
    /// Explicit database URL. Defaults to `{data_dir}/jobflow.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub tools: ToolClientConfig,
}

/// Orchestrator polling and retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Interval between backstop polls for queued jobs.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Interval used after a poll failed with a store error.
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
    /// Maximum jobs fetched per poll.
    #[serde(default = "default_poll_batch_size")]
    pub poll_batch_size: u32,
    /// Retry bound. Values above `MAX_RETRIES` are clamped.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_error_backoff_secs() -> u64 {
    10
}

fn default_poll_batch_size() -> u32 {
    10
}

fn default_max_retries() -> u32 {
    MAX_RETRIES
}

impl OrchestratorConfig {
    /// The retry bound actually enforced.
    pub fn effective_max_retries(&self) -> u32 {
        self.max_retries.min(MAX_RETRIES)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            error_backoff_secs: default_error_backoff_secs(),
            poll_batch_size: default_poll_batch_size(),
            max_retries: default_max_retries(),
        }
    }
}

/// Which queue transport backs the Producer/Consumer pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// In-process channel. Messages do not survive a restart.
    #[default]
    Memory,
    /// Durable outbox table in the job database.
    Sqlite,
}

/// Queue transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub backend: QueueBackend,
    /// Poll interval of table-backed consumers.
    #[serde(default = "default_queue_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Messages fetched per consumer poll.
    #[serde(default = "default_queue_batch_size")]
    pub batch_size: u32,
    /// Handler failures tolerated before a message is dropped.
    #[serde(default = "default_max_redeliveries")]
    pub max_redeliveries: u32,
    /// Maximum handlers running at once per consumer.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// How long a fetched message stays hidden from other consumers of a
    /// table-backed queue before it is handed out again.
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
}

fn default_queue_poll_interval_ms() -> u64 {
    500
}

fn default_queue_batch_size() -> u32 {
    32
}

fn default_max_redeliveries() -> u32 {
    5
}

fn default_max_in_flight() -> usize {
    8
}

fn default_visibility_timeout_secs() -> u64 {
    300
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            poll_interval_ms: default_queue_poll_interval_ms(),
            batch_size: default_queue_batch_size(),
            max_redeliveries: default_max_redeliveries(),
            max_in_flight: default_max_in_flight(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
        }
    }
}

/// Tool HTTP client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolClientConfig {
    /// Per-request deadline for tool calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_user_agent() -> String {
    "jobflow-tool-client/0.1".to_string()
}

impl Default for ToolClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}
