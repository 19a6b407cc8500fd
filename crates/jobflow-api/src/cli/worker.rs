//! `jobflow worker`: run the orchestrator in the foreground.

use anyhow::{Context, Result};
use console::style;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use jobflow_core::event::JobSubscription;
use jobflow_types::event::JobEvent;
use jobflow_types::job::JobId;

use crate::state::AppState;

/// Run the orchestrator until Ctrl+C or SIGTERM, or until the job named by
/// `until` finishes.
pub async fn run(state: &AppState, follow: bool, until: Option<&str>, json: bool) -> Result<()> {
    let orchestrator = state.orchestrator();
    let shutdown = CancellationToken::new();

    if let Some(job_id) = until {
        let job_id: JobId = job_id
            .parse()
            .with_context(|| format!("Invalid job ID '{job_id}'"))?;
        // Subscribe before checking the store so a finish in between is not missed.
        let subscription = state.event_bus.subscribe_job(job_id);
        let job = state.job_store.get(&job_id).await?;
        if job.status.is_terminal() {
            if !json {
                println!("  Job {job_id} is already {}.", job.status);
            }
            return Ok(());
        }
        tokio::spawn(stop_when_finished(subscription, shutdown.clone()));
    }

    let printer = follow.then(|| {
        let events = state.event_bus.subscribe();
        tokio::spawn(print_events(events, json, shutdown.clone()))
    });

    if !json {
        println!(
            "  {} Jobflow worker running ({:?} queue)",
            style("⚡").bold(),
            state.queue.backend()
        );
        println!("  {}", style("Press Ctrl+C to stop").dim());
    }

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        crate::shutdown_signal().await;
        tracing::info!("shutdown requested");
        signal_token.cancel();
    });

    orchestrator.run(shutdown.clone()).await?;
    shutdown.cancel();

    if let Some(printer) = printer {
        let _ = printer.await;
    }
    if !json {
        println!("\n  Worker stopped.");
    }
    Ok(())
}

async fn stop_when_finished(mut subscription: JobSubscription, shutdown: CancellationToken) {
    while let Some(event) = subscription.attempt_end().await {
        if !matches!(event, JobEvent::JobRetrying { .. }) {
            tracing::info!(job_id = %subscription.job_id(), "watched job finished");
            shutdown.cancel();
            return;
        }
    }
}

async fn print_events(
    mut events: broadcast::Receiver<JobEvent>,
    json: bool,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(event) if json => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "failed to encode event"),
            },
            Ok(event) => println!("  {}", describe(&event)),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn describe(event: &JobEvent) -> String {
    match event {
        JobEvent::JobClaimed { job_id, attempt } => {
            format!("{} {job_id} claimed (attempt {attempt})", style("▶").cyan())
        }
        JobEvent::StepStarted {
            job_id,
            step_id,
            tool_id,
        } => format!("{} {job_id} step '{step_id}' -> {tool_id}", style("·").dim()),
        JobEvent::StepCompleted {
            job_id,
            step_id,
            duration_ms,
        } => format!(
            "{} {job_id} step '{step_id}' done in {duration_ms}ms",
            style("·").dim()
        ),
        JobEvent::JobSucceeded {
            job_id,
            steps_completed,
            duration_ms,
        } => format!(
            "{} {job_id} succeeded ({steps_completed} steps, {duration_ms}ms)",
            style("✓").green()
        ),
        JobEvent::JobRetrying {
            job_id,
            retry_count,
            error,
        } => format!(
            "{} {job_id} retry #{retry_count}: {error}",
            style("↻").yellow()
        ),
        JobEvent::JobFailed { job_id, error } => {
            format!("{} {job_id} failed: {error}", style("✗").red())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobflow_types::job::JobId;

    #[test]
    fn test_describe_mentions_job_and_detail() {
        let job_id = JobId::new();
        let line = describe(&JobEvent::JobRetrying {
            job_id,
            retry_count: 2,
            error: "tool 't2' is unavailable: status is disabled".to_string(),
        });
        assert!(line.contains(&job_id.to_string()));
        assert!(line.contains("retry #2"));
        assert!(line.contains("status is disabled"));
    }

    #[tokio::test]
    async fn test_stop_when_finished_ignores_retries() {
        let bus = jobflow_core::event::EventBus::new(16);
        let job_id = JobId::new();
        let shutdown = CancellationToken::new();
        let watcher = tokio::spawn(stop_when_finished(bus.subscribe_job(job_id), shutdown.clone()));

        bus.publish(JobEvent::JobRetrying {
            job_id,
            retry_count: 1,
            error: "flaky".to_string(),
        });
        tokio::task::yield_now().await;
        assert!(!shutdown.is_cancelled());

        bus.publish(JobEvent::JobSucceeded {
            job_id,
            steps_completed: 2,
            duration_ms: 5,
        });
        watcher.await.unwrap();
        assert!(shutdown.is_cancelled());
    }

    #[test]
    fn test_describe_step_started() {
        let line = describe(&JobEvent::StepStarted {
            job_id: JobId::new(),
            step_id: "a".to_string(),
            tool_id: "t1".to_string(),
        });
        assert!(line.contains("step 'a' -> t1"));
    }
}
