//! Instance-level dependency graph built on `petgraph`.

use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::EngineError;
use crate::instantiate::ExecutableRule;

/// Directed graph over the executable rules of one run. Edges point from a
/// dependency to its dependent.
#[derive(Debug)]
pub struct RuleGraph {
    graph: DiGraph<usize, ()>,
}

impl RuleGraph {
    /// Build the graph from resolved rules. Node `i` is rule index `i`.
    #[must_use]
    pub fn from_rules(rules: &[ExecutableRule]) -> Self {
        let mut graph = DiGraph::with_capacity(rules.len(), rules.len());
        for rule in rules {
            graph.add_node(rule.index);
        }
        for rule in rules {
            for &dependency in &rule.dependencies {
                graph.add_edge(NodeIndex::new(dependency), NodeIndex::new(rule.index), ());
            }
        }
        Self { graph }
    }

    /// Returns `true` if the graph contains at least one cycle.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        algo::is_cyclic_directed(&self.graph)
    }

    /// Rule indices of one cycle, ordered by index, or `None` for a DAG.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<usize>> {
        algo::tarjan_scc(&self.graph)
            .into_iter()
            .find(|component| {
                component.len() > 1 || self.graph.contains_edge(component[0], component[0])
            })
            .map(|component| {
                let mut rules: Vec<usize> =
                    component.into_iter().map(|idx| self.graph[idx]).collect();
                rules.sort_unstable();
                rules
            })
    }
}

/// Fail with [`EngineError::CircularDependency`] naming the rules of a cycle
/// if the resolved rules do not form a DAG.
pub fn check_acyclic(rules: &[ExecutableRule]) -> Result<(), EngineError> {
    let graph = RuleGraph::from_rules(rules);
    if !graph.has_cycle() {
        return Ok(());
    }
    let cycle = graph.find_cycle().unwrap_or_default();
    let identifiers: Vec<_> = cycle
        .into_iter()
        .filter_map(|index| rules.get(index))
        .map(|rule| rule.identifier.clone())
        .collect();
    tracing::error!(rules = identifiers.len(), "circular dependency between rules");
    Err(EngineError::CircularDependency { rules: identifiers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::RuleIdentifier;
    use crate::rule::{RuleContext, RuleError, RuleLogic, RuleOutput, ValueRule};
    use crate::value::ValueId;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use verdict_manifest::{Manifest, RuleDefinition, RuleKey};

    struct Pass;

    #[async_trait::async_trait]
    impl ValueRule for Pass {
        async fn validate(
            &self,
            _value: &Value,
            _ctx: &RuleContext,
        ) -> Result<RuleOutput, RuleError> {
            Ok(RuleOutput::pass())
        }
    }

    /// Rules named by index with the given dependency lists.
    fn rules(dependencies: &[&[usize]]) -> Vec<ExecutableRule> {
        let mut m = Manifest::new("T");
        let definition = m.add_rule(m.root(), RuleDefinition::new("R")).unwrap();
        dependencies
            .iter()
            .enumerate()
            .map(|(index, deps)| ExecutableRule {
                index,
                identifier: RuleIdentifier::new(
                    RuleKey::new("R", "T").named(index.to_string()),
                    None,
                ),
                definition,
                value: ValueId(0),
                logic: RuleLogic::value(Pass),
                dependencies: deps.to_vec(),
                unsatisfiable: false,
            })
            .collect()
    }

    #[test]
    fn dag_passes() {
        let rules = rules(&[&[], &[0], &[0, 1]]);
        assert!(check_acyclic(&rules).is_ok());
        assert_eq!(RuleGraph::from_rules(&rules).find_cycle(), None);
    }

    #[test]
    fn cycle_names_its_rules() {
        let rules = rules(&[&[], &[2], &[1]]);
        let err = check_acyclic(&rules).unwrap_err();
        let EngineError::CircularDependency { rules: on_cycle } = err else {
            panic!("expected a circular dependency");
        };
        let names: Vec<_> = on_cycle.iter().filter_map(RuleIdentifier::name).collect();
        assert_eq!(names, vec!["1", "2"]);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let rules = rules(&[&[0]]);
        assert_eq!(RuleGraph::from_rules(&rules).find_cycle(), Some(vec![0]));
        assert!(check_acyclic(&rules).is_err());
    }
}
