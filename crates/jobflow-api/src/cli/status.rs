//! Status dashboard command.

use anyhow::Result;
use console::style;

use jobflow_core::repository::ToolRegistry;
use jobflow_infra::queue::QueueTransport;
use jobflow_types::tool::ToolStatus;

use crate::state::AppState;

/// How many claimable jobs the dashboard counts before showing "N+".
const CLAIMABLE_SCAN_LIMIT: u32 = 1000;

/// Display configuration, registry, and backlog at a glance.
pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let tools = state.tools.list().await?;
    let approved = tools
        .iter()
        .filter(|t| t.status == ToolStatus::Approved)
        .count();
    let pending = tools
        .iter()
        .filter(|t| t.status == ToolStatus::Pending)
        .count();

    let claimable = state
        .job_store
        .find_queued_jobs(CLAIMABLE_SCAN_LIMIT)
        .await?
        .len();

    let queue_depth = match &state.queue {
        QueueTransport::Sqlite(q) => Some(q.depth().await?),
        QueueTransport::Memory(_) => None,
    };

    let orchestrator = &state.config.orchestrator;

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "queue": {
                "backend": format!("{:?}", state.queue.backend()).to_lowercase(),
                "depth": queue_depth,
            },
            "jobs": { "claimable": claimable },
            "tools": {
                "total": tools.len(),
                "approved": approved,
                "pending": pending,
            },
            "orchestrator": {
                "poll_interval_secs": orchestrator.poll_interval_secs,
                "max_retries": orchestrator.effective_max_retries(),
            },
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Jobflow v{}",
        style("⚡").bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!();

    println!("  {}", style("── Jobs ──").dim());
    let claimable_label = if claimable as u32 >= CLAIMABLE_SCAN_LIMIT {
        format!("{claimable}+")
    } else {
        claimable.to_string()
    };
    println!("  Waiting:  {}", style(claimable_label).bold());
    println!();

    println!("  {}", style("── Tools ──").dim());
    println!("  Total:    {}", style(tools.len()).bold());
    println!("  Approved: {}", style(approved).green());
    if pending > 0 {
        println!("  Pending:  {}", style(pending).yellow());
    }
    println!();

    println!("  {}", style("── Queue ──").dim());
    println!("  Backend:  {:?}", state.queue.backend());
    if let Some(depth) = queue_depth {
        println!("  Stored:   {depth}");
    }
    println!();

    println!("  {}", style("── System ──").dim());
    println!("  Data dir: {}", style(state.data_dir.display()).dim());
    println!(
        "  Polling:  every {}s, up to {} retries",
        orchestrator.poll_interval_secs,
        orchestrator.effective_max_retries()
    );
    println!();

    Ok(())
}
