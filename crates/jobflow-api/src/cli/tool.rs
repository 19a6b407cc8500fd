//! Tool registry commands.
//!
//! Tools are registered as `pending`; an operator must approve a tool before
//! workflow steps may call it.

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use jobflow_core::repository::ToolRegistry;
use jobflow_core::tool::ToolClient;
use jobflow_types::error::RepositoryError;
use jobflow_types::tool::{Tool, ToolStatus};

use crate::state::AppState;

/// Tool registry subcommands.
#[derive(Subcommand)]
pub enum ToolCommand {
    /// Register (or re-register) a tool endpoint.
    Register {
        /// Tool ID referenced by workflow steps.
        id: String,

        /// HTTP endpoint accepting JSON-RPC requests.
        #[arg(long)]
        endpoint: String,

        /// Display name (defaults to the ID).
        #[arg(long)]
        name: Option<String>,

        /// Short description.
        #[arg(long)]
        description: Option<String>,

        /// Approve immediately instead of leaving the tool pending.
        #[arg(long)]
        approve: bool,
    },

    /// List registered tools.
    #[command(alias = "ls")]
    List,

    /// Allow workflow steps to call a tool.
    Approve {
        /// Tool ID.
        id: String,
    },

    /// Stop workflow steps from calling a tool.
    Disable {
        /// Tool ID.
        id: String,
    },

    /// Ask a tool endpoint which operations it offers.
    Inspect {
        /// Tool ID.
        id: String,
    },
}

/// Handle a tool subcommand.
pub async fn handle_tool_command(cmd: ToolCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        ToolCommand::Register {
            id,
            endpoint,
            name,
            description,
            approve,
        } => {
            let mut tool = Tool::new(id.clone(), name.unwrap_or(id), endpoint);
            tool.description = description;
            if approve {
                tool = tool.with_status(ToolStatus::Approved);
            }
            handle_register(tool, state, json).await
        }
        ToolCommand::List => handle_list(state, json).await,
        ToolCommand::Approve { id } => handle_set_status(&id, ToolStatus::Approved, state, json).await,
        ToolCommand::Disable { id } => handle_set_status(&id, ToolStatus::Disabled, state, json).await,
        ToolCommand::Inspect { id } => handle_inspect(&id, state, json).await,
    }
}

async fn handle_register(tool: Tool, state: &AppState, json: bool) -> Result<()> {
    if !tool.endpoint.starts_with("http://") && !tool.endpoint.starts_with("https://") {
        bail!("Endpoint must be an http:// or https:// URL, got '{}'", tool.endpoint);
    }

    state
        .tools
        .register(&tool)
        .await
        .context("Failed to register tool")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tool)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Registered tool '{}'",
        style("*").green().bold(),
        style(&tool.id).cyan()
    );
    println!("  Endpoint: {}", tool.endpoint);
    println!("  Status:   {}", format_tool_status(tool.status));
    if tool.status == ToolStatus::Pending {
        println!(
            "  Approve it with: {}",
            style(format!("jobflow tool approve {}", tool.id)).dim()
        );
    }
    println!();

    Ok(())
}

async fn handle_list(state: &AppState, json: bool) -> Result<()> {
    let tools = state.tools.list().await.context("Failed to list tools")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tools)?);
        return Ok(());
    }

    if tools.is_empty() {
        println!();
        println!("  No tools registered.");
        println!(
            "  Register one with: {}",
            style("jobflow tool register <id> --endpoint <url>").dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Name"),
            Cell::new("Status"),
            Cell::new("Endpoint"),
        ]);
    for tool in &tools {
        table.add_row(vec![
            Cell::new(&tool.id),
            Cell::new(&tool.name),
            Cell::new(format_tool_status(tool.status)),
            Cell::new(&tool.endpoint),
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(())
}

async fn handle_set_status(id: &str, status: ToolStatus, state: &AppState, json: bool) -> Result<()> {
    match state.tools.set_status(id, status).await {
        Ok(()) => {}
        Err(RepositoryError::NotFound) => bail!("Tool '{id}' is not registered"),
        Err(e) => return Err(e).context("Failed to update tool"),
    }

    if json {
        let out = serde_json::json!({ "id": id, "status": status.as_str() });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  {} Tool '{}' is now {}",
            style("*").green().bold(),
            style(id).cyan(),
            format_tool_status(status)
        );
        println!();
    }

    Ok(())
}

async fn handle_inspect(id: &str, state: &AppState, json: bool) -> Result<()> {
    let tool = state
        .tools
        .find_by_id(id)
        .await
        .context("Failed to look up tool")?
        .with_context(|| format!("Tool '{id}' is not registered"))?;

    let operations = state
        .tool_client
        .list_tools(&tool)
        .await
        .with_context(|| format!("Failed to query '{}'", tool.endpoint))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&operations)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} ({})",
        style("#").bold(),
        style(&tool.name).cyan(),
        format_tool_status(tool.status)
    );
    println!();
    if operations.is_empty() {
        println!("  The tool reports no operations.");
    }
    for op in &operations {
        match &op.description {
            Some(desc) => println!("  {}  {}", style(&op.name).bold(), style(desc).dim()),
            None => println!("  {}", style(&op.name).bold()),
        }
    }
    println!();

    Ok(())
}

fn format_tool_status(status: ToolStatus) -> String {
    match status {
        ToolStatus::Approved => format!("{}", style("● approved").green()),
        ToolStatus::Pending => format!("{}", style("○ pending").yellow()),
        ToolStatus::Disabled => format!("{}", style("◌ disabled").dim()),
    }
}
