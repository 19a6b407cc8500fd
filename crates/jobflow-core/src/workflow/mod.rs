//! Workflow definitions, validation, and execution.
//!
//! - `definition`: JSON/YAML parsing and structural validation
//! - `dag`: dependency-graph cycle detection
//! - `executor`: sequential step execution against registered tools

pub mod dag;
pub mod definition;
pub mod executor;

pub use definition::{
    DefinitionError, WorkflowFormat, load_workflow_file, parse_workflow, serialize_workflow_yaml,
    validate_definition,
};
pub use executor::{ExecutorError, WorkflowExecutor};
