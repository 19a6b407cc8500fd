//! Job orchestrator.
//!
//! An `Orchestrator` owns one consumer and one `JobProcessor`. At
//! construction it installs the `job.created` handler on its consumer; `run`
//! then drives two intake paths until shutdown:
//!
//! - **Event-driven:** the consumer delivers `job.created` messages.
//! - **Poll-driven backstop:** a loop over `find_queued_jobs` recovers lost
//!   messages and reclaims `Retrying` jobs.
//!
//! Several orchestrator processes may share one store. The claim
//! compare-and-set guarantees each attempt runs on exactly one of them.

pub mod poller;
pub mod processor;
pub mod retry;

use std::sync::Arc;

use jobflow_types::config::OrchestratorConfig;
use jobflow_types::error::JobStoreError;
use jobflow_types::job::JobId;
use jobflow_types::queue::TOPIC_JOB_CREATED;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::queue::{Consumer, QueueError, handler};
use crate::repository::job::JobRepository;
use crate::repository::tool::ToolRegistry;
use crate::tool::ToolClient;

pub use processor::{JobOutcome, JobProcessor};
pub use retry::{RetryDecision, RetryPolicy};

/// Errors raised while handling jobs.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The referenced job no longer exists. Logged, never a job failure.
    #[error("job {0} no longer exists")]
    StaleMessage(JobId),

    #[error(transparent)]
    Store(#[from] JobStoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Runs jobs from a queue consumer and the polling backstop.
pub struct Orchestrator<R, G, T, C>
where
    R: JobRepository,
    G: ToolRegistry,
    T: ToolClient,
    C: Consumer,
{
    processor: Arc<JobProcessor<R, G, T>>,
    consumer: C,
    config: OrchestratorConfig,
}

impl<R, G, T, C> Orchestrator<R, G, T, C>
where
    R: JobRepository + 'static,
    G: ToolRegistry + 'static,
    T: ToolClient + 'static,
    C: Consumer,
{
    /// Build an orchestrator and subscribe its handler to `job.created`.
    pub fn new(processor: JobProcessor<R, G, T>, consumer: C, config: OrchestratorConfig) -> Self {
        let processor = Arc::new(processor);

        let shared = Arc::clone(&processor);
        consumer.subscribe(
            TOPIC_JOB_CREATED,
            handler(move |message| {
                let processor = Arc::clone(&shared);
                async move { processor.handle_message(message).await }
            }),
        );

        Self {
            processor,
            consumer,
            config,
        }
    }

    pub fn processor(&self) -> &Arc<JobProcessor<R, G, T>> {
        &self.processor
    }

    /// Run a single backstop poll. Returns how many jobs were found.
    pub async fn poll_once(&self) -> Result<usize, OrchestratorError> {
        poller::poll_once(&self.processor, self.config.poll_batch_size).await
    }

    /// Start the consumer and poll until `shutdown` is cancelled, then stop
    /// the consumer.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), OrchestratorError> {
        self.consumer.start().await?;
        tracing::info!(
            poll_interval_secs = self.config.poll_interval_secs,
            max_retries = self.config.effective_max_retries(),
            "orchestrator started"
        );

        poller::run_poll_loop(&self.processor, &self.config, &shutdown).await;

        self.consumer.stop().await?;
        tracing::info!("orchestrator stopped");
        Ok(())
    }
}
