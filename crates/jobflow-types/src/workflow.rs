//! Workflow definition types for Jobflow.
//!
//! A `WorkflowDefinition` is the ordered, DAG-shaped list of tool-invocation
//! steps that one job executes. It is persisted verbatim inside the job row
//! and travels inside the `job.created` queue payload, so its serialized
//! shape is part of the wire contract.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// The workflow a job executes.
///
/// Steps run strictly in declared order. Every id in a step's `depends_on`
/// must name a step that appears earlier in `steps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Ordered list of step definitions.
    pub steps: Vec<StepDefinition>,
    /// Free-form metadata carried alongside the steps (name, description, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl WorkflowDefinition {
    /// Build a definition from steps with no metadata.
    pub fn new(steps: Vec<StepDefinition>) -> Self {
        Self {
            steps,
            metadata: HashMap::new(),
        }
    }

    /// Look up a step by its id.
    pub fn step(&self, id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == id)
    }
}

// ---------------------------------------------------------------------------
// Step Definition
// ---------------------------------------------------------------------------

/// A single tool invocation in a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// User-defined step ID (e.g. "fetch-page"). Unique within a workflow.
    pub id: String,
    /// ID of the registered tool that performs this step.
    pub tool_id: String,
    /// Operation name passed to the tool as `params.name`.
    pub action: String,
    /// Arguments passed to the tool as `params.arguments`, untouched.
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    /// Step IDs this step depends on (DAG edges).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl StepDefinition {
    /// Build a step with empty parameters and no dependencies.
    pub fn new(id: impl Into<String>, tool_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool_id: tool_id.into(),
            action: action.into(),
            parameters: serde_json::Map::new(),
            depends_on: Vec::new(),
        }
    }

    /// Add a dependency on another step.
    pub fn depends_on(mut self, step_id: impl Into<String>) -> Self {
        self.depends_on.push(step_id.into());
        self
    }

    /// Set a single parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

/// Accumulated step results keyed by step id.
pub type StepOutputs = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
