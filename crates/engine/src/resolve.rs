//! Turns manifest-level dependency references into edges between the
//! executable rules of one run.
//!
//! A reference names a target item and rule. For a dependent rule declared
//! on item `M` and bound to value `v`, the target values are found relative
//! to `v`: walk up from `v` as many levels as separate `M` from the lowest
//! common ancestor of `M` and the target, then descend the manifest path
//! from that ancestor to the target through `v`'s own subtree. Collection
//! items fan out; polymorphic steps keep only values the sub-node applies to.

use std::collections::HashMap;

use verdict_manifest::{ItemId, ItemKind, Manifest, ManifestError, RuleDefId};

use crate::error::EngineError;
use crate::instantiate::ExecutableRule;
use crate::value::{ValueId, ValueTree};

/// Fill in [`ExecutableRule::dependencies`], marking rules whose references
/// match nothing as unsatisfiable.
pub fn resolve(
    manifest: &Manifest,
    tree: &ValueTree,
    rules: &mut [ExecutableRule],
) -> Result<(), EngineError> {
    let by_binding: HashMap<(RuleDefId, ValueId), usize> = rules
        .iter()
        .map(|rule| ((rule.definition, rule.value), rule.index))
        .collect();

    let mut edges = 0;
    for rule in rules.iter_mut() {
        let definition = manifest
            .rule(rule.definition)
            .ok_or(ManifestError::UnknownRule(rule.definition))?;
        let owner = definition.item();

        for dependency in definition.dependencies() {
            let target = manifest
                .find_rule(dependency.item, &dependency.rule)
                .ok_or_else(|| ManifestError::UnknownDependencyRule {
                    rule: definition.key().clone(),
                    target_item: dependency.item,
                    target: dependency.rule.clone(),
                })?;
            let common = manifest
                .lowest_common_ancestor(owner, dependency.item)
                .ok_or_else(|| ManifestError::DanglingDependency {
                    rule: definition.key().clone(),
                    target: dependency.item,
                })?;

            let levels = manifest.depth(owner).saturating_sub(manifest.depth(common));
            let Some(start) = walk_up(tree, rule.value, levels) else {
                return Err(EngineError::UnresolvableDependency {
                    rule: rule.identifier.clone(),
                    target_item: dependency.item,
                    target: dependency.rule.clone(),
                });
            };

            let path = manifest.path_from(common, dependency.item).ok_or_else(|| {
                ManifestError::DanglingDependency {
                    rule: definition.key().clone(),
                    target: dependency.item,
                }
            })?;
            let matched = descend(manifest, tree, start, &path);

            let before = rule.dependencies.len();
            rule.dependencies.extend(
                matched
                    .into_iter()
                    .filter_map(|value| by_binding.get(&(target.id(), value)).copied()),
            );
            if rule.dependencies.len() == before {
                tracing::debug!(
                    rule = %rule.identifier,
                    target = %dependency.rule,
                    "dependency matches no rule in this run"
                );
                rule.unsatisfiable = true;
            }
        }

        rule.dependencies.sort_unstable();
        rule.dependencies.dedup();
        edges += rule.dependencies.len();
    }

    tracing::debug!(rules = rules.len(), edges, "resolved rule dependencies");
    Ok(())
}

fn walk_up(tree: &ValueTree, from: ValueId, levels: usize) -> Option<ValueId> {
    let mut current = from;
    for _ in 0..levels {
        current = tree.get(current)?.parent()?;
    }
    Some(current)
}

fn descend(manifest: &Manifest, tree: &ValueTree, start: ValueId, path: &[ItemId]) -> Vec<ValueId> {
    let mut current = vec![start];
    for &step in path {
        let polymorphic = manifest
            .item(step)
            .is_some_and(|item| matches!(item.kind(), ItemKind::Polymorphic { .. }));
        current = if polymorphic {
            current
                .into_iter()
                .filter(|id| tree.get(*id).is_some_and(|v| v.applies(step)))
                .collect()
        } else {
            current
                .into_iter()
                .flat_map(|id| tree.children_of(id))
                .filter(|child| child.item() == step)
                .map(|child| child.id())
                .collect()
        };
        if current.is_empty() {
            break;
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instantiate::instantiate;
    use crate::materialize::materialize;
    use crate::registry::RuleRegistry;
    use crate::rule::{RuleContext, RuleError, RuleLogic, RuleOutput, ValueRule};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use verdict_manifest::{
        AccessorError, AccessorExceptionBehavior, IdentityAccessor, MemberAccessor, RuleDefinition,
        TypeMatcher,
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

    fn prepare(m: &Manifest, root: Value) -> Vec<ExecutableRule> {
        let registry = RuleRegistry::new();
        for rule_type in ["A", "B", "C"] {
            registry.register_instance(rule_type, RuleLogic::value(Pass));
        }
        let tree = materialize(m, root, AccessorExceptionBehavior::Skip).unwrap();
        let mut rules = instantiate(m, &registry, &tree).unwrap();
        resolve(m, &tree, &mut rules).unwrap();
        rules
    }

    fn named(rules: &[ExecutableRule], index: usize) -> String {
        rules[index].identifier().to_string()
    }

    /// Order { status, lines: [Line { sku, qty }] } with identities on lines.
    struct OrderShape {
        manifest: Manifest,
        status: ItemId,
        line: ItemId,
        sku: ItemId,
        qty: ItemId,
    }

    fn order_shape() -> OrderShape {
        let mut manifest = Manifest::new("Order");
        let root = manifest.root();
        let status = manifest.add_member(root, "status", "String").unwrap();
        let lines = manifest.add_member(root, "lines", "Vec<Line>").unwrap();
        let line = manifest.set_collection_item(lines, "Line").unwrap();
        manifest.with_identity(line, IdentityAccessor::field("sku")).unwrap();
        let sku = manifest.add_member(line, "sku", "String").unwrap();
        let qty = manifest.add_member(line, "qty", "u32").unwrap();
        OrderShape {
            manifest,
            status,
            line,
            sku,
            qty,
        }
    }

    fn order() -> Value {
        json!({
            "status": "open",
            "lines": [{"sku": "a", "qty": 1}, {"sku": "b", "qty": 2}]
        })
    }

    #[test]
    fn sibling_dependency_stays_within_the_same_item() {
        let OrderShape {
            mut manifest,
            sku,
            qty,
            ..
        } = order_shape();
        let a = manifest.add_rule(sku, RuleDefinition::new("A")).unwrap();
        let a_ref = manifest.rule_ref(a).unwrap();
        manifest
            .add_rule(qty, RuleDefinition::new("B").depends_on(a_ref))
            .unwrap();

        let rules = prepare(&manifest, order());
        // A(sku of a), B(qty of a), A(sku of b), B(qty of b)
        assert_eq!(rules.len(), 4);
        assert_eq!(rules[1].dependencies(), &[0]);
        assert_eq!(rules[3].dependencies(), &[2]);
    }

    #[test]
    fn dependency_on_collection_items_fans_out() {
        let OrderShape {
            mut manifest,
            status,
            line,
            ..
        } = order_shape();
        let a = manifest.add_rule(line, RuleDefinition::new("A")).unwrap();
        let a_ref = manifest.rule_ref(a).unwrap();
        manifest
            .add_rule(status, RuleDefinition::new("B").depends_on(a_ref))
            .unwrap();

        let rules = prepare(&manifest, order());
        assert_eq!(named(&rules, 0), "B<String>");
        assert_eq!(rules[0].dependencies(), &[1, 2]);
        assert!(!rules[0].is_unsatisfiable());
    }

    #[test]
    fn item_rule_reaches_up_to_an_ancestor() {
        let OrderShape {
            mut manifest,
            status,
            qty,
            ..
        } = order_shape();
        let a = manifest.add_rule(status, RuleDefinition::new("A")).unwrap();
        let a_ref = manifest.rule_ref(a).unwrap();
        manifest
            .add_rule(qty, RuleDefinition::new("B").depends_on(a_ref))
            .unwrap();

        let rules = prepare(&manifest, order());
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[1].dependencies(), &[0]);
        assert_eq!(rules[2].dependencies(), &[0]);
    }

    #[test]
    fn pruned_target_is_unsatisfiable() {
        let mut manifest = Manifest::new("Customer");
        let root = manifest.root();
        let broken = manifest
            .add_member_with(
                root,
                "email",
                "String",
                MemberAccessor::new(|_| Err(AccessorError::new("unavailable"))),
            )
            .unwrap();
        let name = manifest.add_member(root, "name", "String").unwrap();
        let a = manifest.add_rule(broken, RuleDefinition::new("A")).unwrap();
        let a_ref = manifest.rule_ref(a).unwrap();
        manifest
            .add_rule(name, RuleDefinition::new("B").depends_on(a_ref))
            .unwrap();

        let rules = prepare(&manifest, json!({"name": "Ada"}));
        assert_eq!(rules.len(), 1);
        assert!(rules[0].is_unsatisfiable());
        assert!(rules[0].dependencies().is_empty());
    }

    #[test]
    fn polymorphic_target_must_apply() {
        let mut manifest = Manifest::new("Shape");
        let root = manifest.root();
        let circle = manifest
            .add_polymorphic(root, TypeMatcher::discriminator("Circle", "kind", ["circle"]))
            .unwrap();
        let a = manifest.add_rule(circle, RuleDefinition::new("A")).unwrap();
        let a_ref = manifest.rule_ref(a).unwrap();
        manifest
            .add_rule(root, RuleDefinition::new("B").depends_on(a_ref))
            .unwrap();

        let rules = prepare(&manifest, json!({"kind": "circle"}));
        assert_eq!(named(&rules, 0), "B<Shape>");
        assert_eq!(rules[0].dependencies(), &[1]);

        let rules = prepare(&manifest, json!({"kind": "square"}));
        assert_eq!(rules.len(), 1);
        assert!(rules[0].is_unsatisfiable());
    }
}
