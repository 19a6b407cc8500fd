//! Dependency graph checks.
//!
//! Uses `petgraph` to model step dependencies as a directed graph so cycles
//! can be reported by the step that closes them.

use std::collections::HashMap;

use jobflow_types::error::ValidationError;
use jobflow_types::workflow::StepDefinition;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

/// Verify that `steps` form a DAG.
///
/// Edges run from dependency to dependent. Dependencies on unknown steps are
/// reported as `UnknownDependency`; callers that already checked references
/// never see that variant.
pub fn check_acyclic(steps: &[StepDefinition]) -> Result<(), ValidationError> {
    let mut graph = DiGraph::<&str, ()>::new();
    let nodes: HashMap<&str, _> = steps
        .iter()
        .map(|s| (s.id.as_str(), graph.add_node(s.id.as_str())))
        .collect();

    for step in steps {
        let to = nodes[step.id.as_str()];
        for dep in &step.depends_on {
            let from = nodes.get(dep.as_str()).ok_or_else(|| ValidationError::UnknownDependency {
                step_id: step.id.clone(),
                dependency: dep.clone(),
            })?;
            graph.add_edge(*from, to, ());
        }
    }

    toposort(&graph, None)
        .map(|_| ())
        .map_err(|cycle| ValidationError::Cycle(graph[cycle.node_id()].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, deps: &[&str]) -> StepDefinition {
        deps.iter()
            .fold(StepDefinition::new(id, "t1", "run"), |s, d| s.depends_on(*d))
    }

    #[test]
    fn test_linear_chain_is_acyclic() {
        let steps = vec![step("a", &[]), step("b", &["a"]), step("c", &["b"])];
        assert!(check_acyclic(&steps).is_ok());
    }

    #[test]
    fn test_diamond_is_acyclic() {
        let steps = vec![
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["a"]),
            step("d", &["b", "c"]),
        ];
        assert!(check_acyclic(&steps).is_ok());
    }

    #[test]
    fn test_two_step_cycle() {
        let steps = vec![step("a", &["b"]), step("b", &["a"])];
        assert!(matches!(check_acyclic(&steps), Err(ValidationError::Cycle(_))));
    }

    #[test]
    fn test_unknown_dependency() {
        let steps = vec![step("a", &["ghost"])];
        assert_eq!(
            check_acyclic(&steps),
            Err(ValidationError::UnknownDependency {
                step_id: "a".to_string(),
                dependency: "ghost".to_string(),
            })
        );
    }
}
