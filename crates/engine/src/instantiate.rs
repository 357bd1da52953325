//! Pairs materialized values with the manifest rules that apply to them.

use std::collections::{HashMap, HashSet};

use verdict_manifest::{Manifest, ManifestError, RuleDefId};

use crate::error::EngineError;
use crate::identifier::RuleIdentifier;
use crate::registry::RuleRegistry;
use crate::rule::RuleLogic;
use crate::value::{ValueId, ValueTree};

/// One schedulable (value, rule) pairing of a run.
#[derive(Debug, Clone)]
pub struct ExecutableRule {
    pub(crate) index: usize,
    pub(crate) identifier: RuleIdentifier,
    pub(crate) definition: RuleDefId,
    pub(crate) value: ValueId,
    pub(crate) logic: RuleLogic,
    pub(crate) dependencies: Vec<usize>,
    pub(crate) unsatisfiable: bool,
}

impl ExecutableRule {
    /// Position in instantiation order; also the rule's scheduling tie-break.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Concrete identifier of this rule instance.
    #[must_use]
    pub fn identifier(&self) -> &RuleIdentifier {
        &self.identifier
    }

    /// The manifest rule this instantiates.
    #[must_use]
    pub fn definition(&self) -> RuleDefId {
        self.definition
    }

    /// The value this rule validates.
    #[must_use]
    pub fn value(&self) -> ValueId {
        self.value
    }

    /// The rule's logic.
    #[must_use]
    pub fn logic(&self) -> &RuleLogic {
        &self.logic
    }

    /// Indices of the rules this one depends on.
    #[must_use]
    pub fn dependencies(&self) -> &[usize] {
        &self.dependencies
    }

    /// Whether some dependency matched no rule in this run. Such a rule
    /// can never run its logic.
    #[must_use]
    pub fn is_unsatisfiable(&self) -> bool {
        self.unsatisfiable
    }
}

/// Create one [`ExecutableRule`] per value and applicable manifest rule.
///
/// Order follows the value tree (depth-first), then the value's applied
/// items (definition first, then matching polymorphic sub-nodes), then rule
/// declaration order. Logic is created once per manifest rule and shared by
/// its instances. Dependencies are left empty for the resolver.
pub fn instantiate(
    manifest: &Manifest,
    registry: &RuleRegistry,
    tree: &ValueTree,
) -> Result<Vec<ExecutableRule>, EngineError> {
    let mut logic: HashMap<RuleDefId, RuleLogic> = HashMap::new();
    let mut rules = Vec::new();

    for value in tree.iter() {
        for &item in value.applied_items() {
            let owner = manifest
                .item(item)
                .ok_or(ManifestError::UnknownItem(item))?;
            for &definition in owner.rules() {
                let rule = manifest
                    .rule(definition)
                    .ok_or(ManifestError::UnknownRule(definition))?;
                let rule_logic = match logic.get(&definition) {
                    Some(existing) => existing.clone(),
                    None => {
                        let created = registry.create(rule)?;
                        logic.insert(definition, created.clone());
                        created
                    }
                };
                rules.push(ExecutableRule {
                    index: rules.len(),
                    identifier: RuleIdentifier::new(rule.key().clone(), value.identity().cloned()),
                    definition,
                    value: value.id(),
                    logic: rule_logic,
                    dependencies: Vec::new(),
                    unsatisfiable: false,
                });
            }
        }
    }

    let mut seen = HashSet::with_capacity(rules.len());
    for rule in &rules {
        if !seen.insert(&rule.identifier) {
            tracing::warn!(
                rule = %rule.identifier,
                "duplicate rule identifier; give the rule a name or its item an identity"
            );
        }
    }

    tracing::debug!(rules = rules.len(), "instantiated rules");
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialize::materialize;
    use crate::rule::{RuleContext, RuleError, RuleOutput, ValueRule};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use verdict_manifest::{
        AccessorExceptionBehavior, IdentityAccessor, RuleDefinition, TypeMatcher,
    };

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

    fn registry() -> RuleRegistry {
        let registry = RuleRegistry::new();
        registry.register_instance("NotNull", RuleLogic::value(Pass));
        registry.register_instance("Positive", RuleLogic::value(Pass));
        registry
    }

    #[test]
    fn one_rule_per_collection_item() {
        let mut m = Manifest::new("Order");
        let root = m.root();
        let lines = m.add_member(root, "lines", "Vec<Line>").unwrap();
        let line = m.set_collection_item(lines, "Line").unwrap();
        m.with_identity(line, IdentityAccessor::field("sku")).unwrap();
        m.add_rule(line, RuleDefinition::new("NotNull")).unwrap();

        let tree = materialize(
            &m,
            json!({"lines": [{"sku": "a"}, {"sku": "b"}]}),
            AccessorExceptionBehavior::Propagate,
        )
        .unwrap();
        let rules = instantiate(&m, &registry(), &tree).unwrap();

        let ids: Vec<String> = rules.iter().map(|r| r.identifier().to_string()).collect();
        assert_eq!(ids, vec!["NotNull<Line>@a", "NotNull<Line>@b"]);
        assert_eq!(rules[1].index(), 1);
    }

    #[test]
    fn polymorphic_rules_follow_the_definition() {
        let mut m = Manifest::new("Shape");
        let root = m.root();
        let circle = m
            .add_polymorphic(root, TypeMatcher::discriminator("Circle", "kind", ["circle"]))
            .unwrap();
        m.add_rule(circle, RuleDefinition::new("Positive")).unwrap();
        m.add_rule(root, RuleDefinition::new("NotNull")).unwrap();

        let tree = materialize(&m, json!({"kind": "circle"}), AccessorExceptionBehavior::Propagate)
            .unwrap();
        let rules = instantiate(&m, &registry(), &tree).unwrap();
        let types: Vec<&str> = rules.iter().map(|r| r.identifier().rule_type()).collect();
        assert_eq!(types, vec!["NotNull", "Positive"]);
    }

    #[test]
    fn unknown_rule_type_fails() {
        let mut m = Manifest::new("Order");
        let root = m.root();
        m.add_rule(root, RuleDefinition::new("Unregistered")).unwrap();
        let tree = materialize(&m, json!({}), AccessorExceptionBehavior::Propagate).unwrap();
        let err = instantiate(&m, &registry(), &tree).unwrap_err();
        assert!(matches!(err, EngineError::UnknownRuleType { .. }));
    }
}
