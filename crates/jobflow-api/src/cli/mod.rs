//! CLI command definitions for the `jobflow` binary.
//!
//! Uses clap derive macros for argument parsing. Commands are grouped by
//! noun (`jobflow jobs list`, `jobflow tool approve`).

pub mod job;
pub mod status;
pub mod tool;
pub mod worker;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use console::style;
use jobflow_types::job::JobStatus;

/// Run and manage multi-step tool workflows.
#[derive(Parser)]
#[command(name = "jobflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Detailed logs (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format.
    #[arg(long, value_enum, default_value_t = LogFormatArg::Pretty, global = true)]
    pub log_format: LogFormatArg,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "JOBFLOW_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the orchestrator until Ctrl+C.
    Worker {
        /// Print job lifecycle events as they happen.
        #[arg(long)]
        follow: bool,

        /// Stop once this job has succeeded or failed.
        #[arg(long, value_name = "JOB_ID")]
        until: Option<String>,
    },

    /// Submit a workflow definition (JSON or YAML) as a new job.
    Submit {
        /// Path to the workflow file.
        file: PathBuf,

        /// User the job is submitted for.
        #[arg(long, env = "JOBFLOW_USER")]
        user: String,
    },

    /// Inspect jobs.
    Jobs {
        #[command(subcommand)]
        action: job::JobsCommand,
    },

    /// Manage the tool registry.
    Tool {
        #[command(subcommand)]
        action: tool::ToolCommand,
    },

    /// Show configuration and queue status.
    Status,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

// --- Formatting helpers ---

pub(crate) fn format_job_status(status: JobStatus) -> String {
    match status {
        JobStatus::Queued => format!("{}", style("○ queued").cyan()),
        JobStatus::Running => format!("{}", style("● running").blue()),
        JobStatus::Retrying => format!("{}", style("↻ retrying").yellow()),
        JobStatus::Success => format!("{}", style("✓ success").green()),
        JobStatus::Failed => format!("{}", style("✗ failed").red()),
    }
}

pub(crate) fn format_relative_time(dt: &chrono::DateTime<chrono::Utc>) -> String {
    let diff = chrono::Utc::now() - *dt;

    if diff.num_minutes() < 1 {
        "just now".to_string()
    } else if diff.num_hours() < 1 {
        format!("{}m ago", diff.num_minutes())
    } else if diff.num_days() < 1 {
        format!("{}h ago", diff.num_hours())
    } else if diff.num_days() < 30 {
        format!("{}d ago", diff.num_days())
    } else {
        dt.format("%Y-%m-%d").to_string()
    }
}
