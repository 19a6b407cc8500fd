//! Workflow definition parsing and validation.
//!
//! Converts JSON or YAML documents into the canonical `WorkflowDefinition`
//! and validates the structural constraints every admitted job must meet:
//! at least one step, unique non-empty IDs, and dependencies that only point
//! at earlier steps.

use std::collections::HashMap;
use std::path::Path;

use jobflow_types::error::ValidationError;
use jobflow_types::workflow::WorkflowDefinition;
use thiserror::Error;

use super::dag::check_acyclic;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from loading a workflow document.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// JSON/YAML parse failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The document parsed but is not a valid workflow.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Document encodings accepted for workflow definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowFormat {
    Json,
    Yaml,
}

impl WorkflowFormat {
    /// Pick the format from a file extension. Anything other than `.json` is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => WorkflowFormat::Json,
            _ => WorkflowFormat::Yaml,
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a document into a validated `WorkflowDefinition`.
pub fn parse_workflow(
    source: &str,
    format: WorkflowFormat,
) -> Result<WorkflowDefinition, DefinitionError> {
    let def: WorkflowDefinition = match format {
        WorkflowFormat::Json => {
            serde_json::from_str(source).map_err(|e| DefinitionError::Parse(e.to_string()))?
        }
        WorkflowFormat::Yaml => {
            serde_yaml_ng::from_str(source).map_err(|e| DefinitionError::Parse(e.to_string()))?
        }
    };
    validate_definition(&def)?;
    Ok(def)
}

/// Load and validate a workflow file. The format follows the extension.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition, DefinitionError> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow(&content, WorkflowFormat::from_path(path))
}

/// Serialize a `WorkflowDefinition` to a YAML string.
pub fn serialize_workflow_yaml(def: &WorkflowDefinition) -> Result<String, DefinitionError> {
    serde_yaml_ng::to_string(def).map_err(|e| DefinitionError::Parse(e.to_string()))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `WorkflowDefinition`.
///
/// Checks, in order:
/// - At least one step exists
/// - Every step has a non-empty `id`, `tool_id`, and `action`
/// - All step IDs are unique
/// - No step depends on itself
/// - All `depends_on` references point to existing step IDs
/// - The dependency graph has no cycle
/// - Every dependency is declared before the step that needs it
///
/// The last rule is what lets the executor run steps in declared order.
pub fn validate_definition(def: &WorkflowDefinition) -> Result<(), ValidationError> {
    if def.steps.is_empty() {
        return Err(ValidationError::EmptyWorkflow);
    }

    for (index, step) in def.steps.iter().enumerate() {
        if step.id.trim().is_empty() {
            return Err(ValidationError::EmptyStepId { index });
        }
        if step.tool_id.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                step_id: step.id.clone(),
                field: "tool_id",
            });
        }
        if step.action.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                step_id: step.id.clone(),
                field: "action",
            });
        }
    }

    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(def.steps.len());
    for (index, step) in def.steps.iter().enumerate() {
        if positions.insert(step.id.as_str(), index).is_some() {
            return Err(ValidationError::DuplicateStepId(step.id.clone()));
        }
    }

    for step in &def.steps {
        for dep in &step.depends_on {
            if dep == &step.id {
                return Err(ValidationError::SelfDependency(step.id.clone()));
            }
            if !positions.contains_key(dep.as_str()) {
                return Err(ValidationError::UnknownDependency {
                    step_id: step.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    check_acyclic(&def.steps)?;

    for (index, step) in def.steps.iter().enumerate() {
        if let Some(dep) = step
            .depends_on
            .iter()
            .find(|dep| positions[dep.as_str()] > index)
        {
            return Err(ValidationError::ForwardDependency {
                step_id: step.id.clone(),
                dependency: dep.clone(),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use jobflow_types::workflow::StepDefinition;
    use proptest::prelude::*;

    fn def(steps: Vec<StepDefinition>) -> WorkflowDefinition {
        WorkflowDefinition::new(steps)
    }

    #[test]
    fn test_valid_chain() {
        let d = def(vec![
            StepDefinition::new("a", "t1", "foo"),
            StepDefinition::new("b", "t2", "bar").depends_on("a"),
        ]);
        assert!(validate_definition(&d).is_ok());
    }

    #[test]
    fn test_empty_workflow() {
        assert_eq!(
            validate_definition(&def(vec![])),
            Err(ValidationError::EmptyWorkflow)
        );
    }

    #[test]
    fn test_empty_fields() {
        let d = def(vec![StepDefinition::new("", "t1", "foo")]);
        assert_eq!(
            validate_definition(&d),
            Err(ValidationError::EmptyStepId { index: 0 })
        );

        let d = def(vec![StepDefinition::new("a", " ", "foo")]);
        assert_eq!(
            validate_definition(&d),
            Err(ValidationError::EmptyField {
                step_id: "a".to_string(),
                field: "tool_id"
            })
        );

        let d = def(vec![StepDefinition::new("a", "t1", "")]);
        assert!(matches!(
            validate_definition(&d),
            Err(ValidationError::EmptyField { field: "action", .. })
        ));
    }

    #[test]
    fn test_duplicate_step_id() {
        let d = def(vec![
            StepDefinition::new("a", "t1", "foo"),
            StepDefinition::new("a", "t1", "bar"),
        ]);
        assert_eq!(
            validate_definition(&d),
            Err(ValidationError::DuplicateStepId("a".to_string()))
        );
    }

    #[test]
    fn test_self_dependency() {
        let d = def(vec![StepDefinition::new("a", "t1", "foo").depends_on("a")]);
        assert_eq!(
            validate_definition(&d),
            Err(ValidationError::SelfDependency("a".to_string()))
        );
    }

    #[test]
    fn test_unknown_dependency() {
        let d = def(vec![StepDefinition::new("a", "t1", "foo").depends_on("ghost")]);
        assert!(matches!(
            validate_definition(&d),
            Err(ValidationError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_forward_dependency() {
        let d = def(vec![
            StepDefinition::new("a", "t1", "foo").depends_on("b"),
            StepDefinition::new("b", "t1", "bar"),
        ]);
        assert_eq!(
            validate_definition(&d),
            Err(ValidationError::ForwardDependency {
                step_id: "a".to_string(),
                dependency: "b".to_string(),
            })
        );
    }

    #[test]
    fn test_cycle_reported_before_forward_reference() {
        let d = def(vec![
            StepDefinition::new("a", "t1", "foo").depends_on("b"),
            StepDefinition::new("b", "t1", "bar").depends_on("a"),
        ]);
        assert!(matches!(
            validate_definition(&d),
            Err(ValidationError::Cycle(_))
        ));
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{
            "steps": [
                {"id": "a", "tool_id": "t1", "action": "foo", "parameters": {"x": 1}},
                {"id": "b", "tool_id": "t2", "action": "bar", "depends_on": ["a"]}
            ]
        }"#;
        let d = parse_workflow(json, WorkflowFormat::Json).unwrap();
        assert_eq!(d.steps.len(), 2);
        assert_eq!(d.steps[0].parameters["x"], 1);
        assert_eq!(d.steps[1].depends_on, vec!["a"]);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
steps:
  - id: fetch
    tool_id: http
    action: get
    parameters:
      url: https://example.com
  - id: summarize
    tool_id: llm
    action: summarize
    depends_on: [fetch]
"#;
        let d = parse_workflow(yaml, WorkflowFormat::Yaml).unwrap();
        assert_eq!(d.steps[1].id, "summarize");
        assert_eq!(d.steps[0].parameters["url"], "https://example.com");
    }

    #[test]
    fn test_parse_rejects_invalid() {
        let yaml = "steps: []\n";
        assert!(matches!(
            parse_workflow(yaml, WorkflowFormat::Yaml),
            Err(DefinitionError::Invalid(ValidationError::EmptyWorkflow))
        ));
        assert!(matches!(
            parse_workflow("{not json", WorkflowFormat::Json),
            Err(DefinitionError::Parse(_))
        ));
    }

    #[test]
    fn test_yaml_serialize_roundtrip() {
        let d = def(vec![
            StepDefinition::new("a", "t1", "foo").with_parameter("k", serde_json::json!("v")),
        ]);
        let yaml = serialize_workflow_yaml(&d).unwrap();
        let parsed = parse_workflow(&yaml, WorkflowFormat::Yaml).unwrap();
        assert_eq!(parsed, d);
    }

    #[test]
    fn test_load_workflow_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.json");
        std::fs::write(
            &path,
            r#"{"steps":[{"id":"a","tool_id":"t1","action":"foo"}]}"#,
        )
        .unwrap();
        assert_eq!(load_workflow_file(&path).unwrap().steps.len(), 1);

        assert!(matches!(
            load_workflow_file(&dir.path().join("missing.yaml")),
            Err(DefinitionError::Io(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Property tests
    // -----------------------------------------------------------------------

    /// Workflows whose dependencies only point backwards.
    fn backward_workflow() -> impl Strategy<Value = WorkflowDefinition> {
        (1usize..12)
            .prop_flat_map(|n| proptest::collection::vec(proptest::collection::vec(any::<prop::sample::Index>(), 0..3), n))
            .prop_map(|deps| {
                let steps = deps
                    .iter()
                    .enumerate()
                    .map(|(i, picks)| {
                        let mut step = StepDefinition::new(format!("s{i}"), "t1", "run");
                        if i > 0 {
                            for pick in picks {
                                step = step.depends_on(format!("s{}", pick.index(i)));
                            }
                        }
                        step
                    })
                    .collect();
                WorkflowDefinition::new(steps)
            })
    }

    proptest! {
        #[test]
        fn backward_only_workflows_validate(d in backward_workflow()) {
            prop_assert!(validate_definition(&d).is_ok());
        }

        #[test]
        fn reversing_declaration_order_of_dependent_steps_fails(d in backward_workflow()) {
            let has_deps = d.steps.iter().any(|s| !s.depends_on.is_empty());
            let mut reversed = d.clone();
            reversed.steps.reverse();
            let result = validate_definition(&reversed);
            if has_deps {
                let is_forward = matches!(result, Err(ValidationError::ForwardDependency { .. }));
                prop_assert!(is_forward);
            } else {
                prop_assert!(result.is_ok());
            }
        }
    }
}
