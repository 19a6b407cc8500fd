//! Workflow executor: sequential step execution against registered tools.
//!
//! Steps run strictly in declared order. Before each step the executor
//! checks that every dependency already produced an output, then resolves
//! the step's tool (which must be `Approved`) and calls it with the step's
//! parameters passed through untouched. The first failure aborts the run and
//! discards the partial outputs.

use std::time::Instant;

use jobflow_types::error::RepositoryError;
use jobflow_types::event::JobEvent;
use jobflow_types::job::JobId;
use jobflow_types::tool::{Tool, ToolInvocationError};
use jobflow_types::workflow::{StepDefinition, StepOutputs, WorkflowDefinition};
use serde_json::Value;
use thiserror::Error;

use crate::event::EventBus;
use crate::repository::tool::ToolRegistry;
use crate::tool::ToolClient;

// ---------------------------------------------------------------------------
// ExecutorError
// ---------------------------------------------------------------------------

/// Why a workflow run stopped.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// A step ran before all of its dependencies produced output.
    #[error("step '{step_id}' is missing output from: {}", missing.join(", "))]
    Dependency {
        step_id: String,
        missing: Vec<String>,
    },

    /// The step's tool is not registered or not approved.
    #[error("tool '{tool_id}' is unavailable: {reason}")]
    ToolUnavailable { tool_id: String, reason: String },

    /// The tool call itself failed.
    #[error("step '{step_id}' failed: {source}")]
    ToolInvocation {
        step_id: String,
        #[source]
        source: ToolInvocationError,
    },

    /// The registry could not be read.
    #[error("tool registry error: {0}")]
    Registry(#[from] RepositoryError),
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Runs a `WorkflowDefinition` step by step.
///
/// Generic over the tool registry and tool client so tests can swap both.
pub struct WorkflowExecutor<G: ToolRegistry, T: ToolClient> {
    registry: G,
    client: T,
    event_bus: EventBus,
}

impl<G: ToolRegistry, T: ToolClient> WorkflowExecutor<G, T> {
    pub fn new(registry: G, client: T, event_bus: EventBus) -> Self {
        Self {
            registry,
            client,
            event_bus,
        }
    }

    /// Execute every step of `definition` for `job_id`.
    ///
    /// Returns each step's result keyed by step ID.
    pub async fn execute(
        &self,
        job_id: JobId,
        definition: &WorkflowDefinition,
    ) -> Result<StepOutputs, ExecutorError> {
        let mut outputs = StepOutputs::new();

        for step in &definition.steps {
            check_dependencies(step, &outputs)?;
            let tool = self.resolve_tool(&step.tool_id).await?;

            self.event_bus.publish(JobEvent::StepStarted {
                job_id,
                step_id: step.id.clone(),
                tool_id: tool.id.clone(),
            });
            let started = Instant::now();

            let arguments = Value::Object(step.parameters.clone());
            let result = self
                .client
                .call_tool(&tool, &step.action, &arguments)
                .await
                .map_err(|source| ExecutorError::ToolInvocation {
                    step_id: step.id.clone(),
                    source,
                })?;

            let duration_ms = started.elapsed().as_millis() as u64;
            tracing::debug!(
                %job_id,
                step_id = %step.id,
                tool_id = %tool.id,
                duration_ms,
                "step completed"
            );
            self.event_bus.publish(JobEvent::StepCompleted {
                job_id,
                step_id: step.id.clone(),
                duration_ms,
            });

            outputs.insert(step.id.clone(), result);
        }

        Ok(outputs)
    }

    /// Look up a tool and make sure it may be called.
    async fn resolve_tool(&self, tool_id: &str) -> Result<Tool, ExecutorError> {
        let tool = self
            .registry
            .find_by_id(tool_id)
            .await?
            .ok_or_else(|| ExecutorError::ToolUnavailable {
                tool_id: tool_id.to_string(),
                reason: "not registered".to_string(),
            })?;

        if !tool.is_callable() {
            return Err(ExecutorError::ToolUnavailable {
                tool_id: tool_id.to_string(),
                reason: format!("status is {}", tool.status),
            });
        }
        Ok(tool)
    }
}

fn check_dependencies(step: &StepDefinition, outputs: &StepOutputs) -> Result<(), ExecutorError> {
    let missing: Vec<String> = step
        .depends_on
        .iter()
        .filter(|dep| !outputs.contains_key(dep.as_str()))
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ExecutorError::Dependency {
            step_id: step.id.clone(),
            missing,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
