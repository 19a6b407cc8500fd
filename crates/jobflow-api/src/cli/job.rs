//! Job submission and inspection commands.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use jobflow_core::service::AdmissionError;
use jobflow_core::workflow::{DefinitionError, load_workflow_file, serialize_workflow_yaml};
use jobflow_types::config::QueueBackend;
use jobflow_types::job::{Job, JobId};

use super::{format_job_status, format_relative_time};
use crate::state::AppState;

/// Job inspection subcommands.
#[derive(Subcommand)]
pub enum JobsCommand {
    /// List jobs for a user, or every claimable job.
    #[command(alias = "ls")]
    List {
        /// Show the user's jobs, newest first.
        #[arg(long, required_unless_present = "queued", conflicts_with = "queued")]
        user: Option<String>,

        /// Show jobs waiting to be claimed (queued or retrying), oldest first.
        #[arg(long)]
        queued: bool,

        /// Maximum number of jobs to display.
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Show one job, including its output or last error.
    Show {
        /// Job UUID.
        job_id: String,

        /// Print the workflow definition as YAML instead of the summary.
        #[arg(long)]
        definition: bool,
    },
}

/// Handle a jobs subcommand.
pub async fn handle_jobs_command(cmd: JobsCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        JobsCommand::List {
            user,
            queued,
            limit,
        } => handle_list(user.as_deref(), queued, limit, state, json).await,
        JobsCommand::Show { job_id, definition } => {
            handle_show(&job_id, definition, state, json).await
        }
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// Load a workflow file and admit it as a new job.
pub async fn submit(file: &Path, user_id: &str, state: &AppState, json: bool) -> Result<()> {
    let definition = load_workflow_file(file).map_err(|e| match e {
        DefinitionError::Parse(msg) => anyhow::anyhow!("Failed to parse workflow file: {msg}"),
        DefinitionError::Invalid(err) => anyhow::anyhow!("Workflow validation failed: {err}"),
        other => anyhow::anyhow!("Failed to load workflow: {other}"),
    })?;

    let job = state
        .admission()
        .submit(user_id, definition)
        .await
        .map_err(|e| match e {
            AdmissionError::InsufficientCredits { .. } => anyhow::anyhow!("Job rejected: {e}"),
            AdmissionError::Store(err) => anyhow::anyhow!("Failed to create job: {err}"),
        })?;

    if json {
        let out = serde_json::json!({
            "job_id": job.job_id.to_string(),
            "user_id": job.user_id,
            "status": job.status.as_str(),
            "steps": job.workflow_definition.steps.len(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Submitted job {}",
        style("*").green().bold(),
        style(job.job_id).cyan()
    );
    println!("  User:   {}", job.user_id);
    println!("  Steps:  {}", job.workflow_definition.steps.len());
    println!("  Status: {}", format_job_status(job.status));
    if state.queue.backend() == QueueBackend::Memory {
        println!(
            "  {}",
            style("In-memory queue: a running worker will pick this job up on its next poll.").dim()
        );
    }
    println!();
    println!(
        "  Check progress: {}",
        style(format!("jobflow jobs show {}", job.job_id)).dim()
    );
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

async fn handle_list(
    user: Option<&str>,
    queued: bool,
    limit: u32,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let jobs = match user {
        Some(user_id) if !queued => state.job_store.find_by_user(user_id, limit).await,
        _ => state.job_store.find_queued_jobs(limit).await,
    }
    .context("Failed to list jobs")?;

    if json {
        let out: Vec<_> = jobs.iter().map(job_summary_json).collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if jobs.is_empty() {
        println!();
        println!("  No jobs found.");
        println!(
            "  Submit one with: {}",
            style("jobflow submit <workflow.yaml> --user <id>").dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Job").fg(Color::Cyan),
            Cell::new("User"),
            Cell::new("Status"),
            Cell::new("Steps"),
            Cell::new("Retries"),
            Cell::new("Created"),
        ]);

    for job in &jobs {
        table.add_row(vec![
            Cell::new(job.job_id),
            Cell::new(&job.user_id),
            Cell::new(format_job_status(job.status)),
            Cell::new(job.workflow_definition.steps.len()),
            Cell::new(job.retry_count),
            Cell::new(format_relative_time(&job.created_at)),
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(())
}

fn job_summary_json(job: &Job) -> serde_json::Value {
    serde_json::json!({
        "job_id": job.job_id.to_string(),
        "user_id": job.user_id,
        "status": job.status.as_str(),
        "steps": job.workflow_definition.steps.len(),
        "retry_count": job.retry_count,
        "created_at": job.created_at.to_rfc3339(),
    })
}

// ---------------------------------------------------------------------------
// Show
// ---------------------------------------------------------------------------

async fn handle_show(job_id: &str, definition: bool, state: &AppState, json: bool) -> Result<()> {
    let job_id: JobId = job_id
        .parse()
        .with_context(|| format!("Invalid job ID '{job_id}'"))?;
    let job = state.job_store.get(&job_id).await?;

    if definition {
        print!("{}", serialize_workflow_yaml(&job.workflow_definition)?);
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&job)?);
        return Ok(());
    }

    println!();
    println!("  {} Job {}", style("#").bold(), style(job.job_id).cyan());
    println!();
    println!("  User:     {}", job.user_id);
    println!("  Status:   {}", format_job_status(job.status));
    println!("  Retries:  {}", job.retry_count);
    println!("  Created:  {}", job.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(start) = job.start_time {
        println!("  Started:  {}", start.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(end) = job.end_time {
        println!("  Finished: {}", end.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!();

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Tool"),
            Cell::new("Action"),
            Cell::new("Depends on"),
            Cell::new("Output"),
        ]);
    for step in &job.workflow_definition.steps {
        let output = job
            .final_output
            .as_ref()
            .and_then(|out| out.get(&step.id))
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(&step.id),
            Cell::new(&step.tool_id),
            Cell::new(&step.action),
            Cell::new(step.depends_on.join(", ")),
            Cell::new(output),
        ]);
    }
    println!("{table}");

    if let Some(error) = &job.error_message {
        println!();
        println!("  {} {}", style("Last error:").red().bold(), error);
    }
    println!();

    Ok(())
}
