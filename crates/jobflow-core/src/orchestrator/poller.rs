//! Polling backstop.
//!
//! Recovers jobs whose `job.created` message was lost and reclaims jobs left
//! in `Retrying`. Runs on a fixed interval and backs off after store errors.

use std::time::Duration;

use jobflow_types::config::OrchestratorConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::repository::job::JobRepository;
use crate::repository::tool::ToolRegistry;
use crate::tool::ToolClient;

use super::OrchestratorError;
use super::processor::JobProcessor;

/// Fetch up to `batch_size` claimable jobs and hand each to the processor.
///
/// Jobs in one batch run one after another. A failure on one job is logged
/// and does not stop the batch. Returns how many jobs were found.
pub async fn poll_once<R, G, T>(
    processor: &JobProcessor<R, G, T>,
    batch_size: u32,
) -> Result<usize, OrchestratorError>
where
    R: JobRepository,
    G: ToolRegistry,
    T: ToolClient,
{
    let jobs = processor.store().find_queued_jobs(batch_size).await?;
    let found = jobs.len();
    if found > 0 {
        debug!(found, "poll found claimable jobs");
    }

    for job in jobs {
        match processor.handle_job(job.job_id).await {
            Ok(outcome) => debug!(job_id = %job.job_id, ?outcome, "polled job handled"),
            Err(OrchestratorError::StaleMessage(job_id)) => {
                debug!(%job_id, "polled job vanished");
            }
            Err(e) => warn!(job_id = %job.job_id, error = %e, "polled job handling failed"),
        }
    }
    Ok(found)
}

/// Poll until `shutdown` is cancelled.
///
/// The first poll happens immediately.
pub async fn run_poll_loop<R, G, T>(
    processor: &JobProcessor<R, G, T>,
    config: &OrchestratorConfig,
    shutdown: &CancellationToken,
) where
    R: JobRepository,
    G: ToolRegistry,
    T: ToolClient,
{
    let interval = Duration::from_secs(config.poll_interval_secs);
    let backoff = Duration::from_secs(config.error_backoff_secs);

    loop {
        let delay = match poll_once(processor, config.poll_batch_size).await {
            Ok(_) => interval,
            Err(e) => {
                warn!(error = %e, backoff_secs = backoff.as_secs(), "poll failed, backing off");
                backoff
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    debug!("poll loop stopped");
}
