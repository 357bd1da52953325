//! Everything decided before the first rule runs.

use std::sync::Arc;

use serde_json::Value;
use verdict_manifest::{AccessorExceptionBehavior, Manifest};

use crate::error::EngineError;
use crate::graph::check_acyclic;
use crate::instantiate::{ExecutableRule, instantiate};
use crate::materialize::materialize;
use crate::registry::RuleRegistry;
use crate::resolve::resolve;
use crate::value::ValueTree;

/// A materialized value tree plus its resolved, acyclic executable rules.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub(crate) tree: Arc<ValueTree>,
    pub(crate) rules: Vec<ExecutableRule>,
}

impl ExecutionPlan {
    /// Validate the manifest, materialize `root`, instantiate and resolve
    /// rules, and reject dependency cycles.
    ///
    /// Any error here is a configuration or data-access error; no rule
    /// logic has run.
    pub fn prepare(
        manifest: &Manifest,
        registry: &RuleRegistry,
        root: Value,
        behavior: AccessorExceptionBehavior,
    ) -> Result<Self, EngineError> {
        manifest.validate()?;
        let tree = materialize(manifest, root, behavior)?;
        let mut rules = instantiate(manifest, registry, &tree)?;
        resolve(manifest, &tree, &mut rules)?;
        check_acyclic(&rules)?;
        Ok(Self {
            tree: Arc::new(tree),
            rules,
        })
    }

    /// The materialized values.
    #[must_use]
    pub fn tree(&self) -> &ValueTree {
        &self.tree
    }

    /// Executable rules in instantiation order.
    #[must_use]
    pub fn rules(&self) -> &[ExecutableRule] {
        &self.rules
    }

    /// Number of dependency edges between rules.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.rules.iter().map(|r| r.dependencies.len()).sum()
    }
}
