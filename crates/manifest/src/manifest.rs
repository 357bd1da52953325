//! The manifest arena and its structural queries.

use std::sync::Arc;

use serde_json::Value;

use crate::accessor::{
    AccessorExceptionBehavior, CollectionEnumerator, IdentityAccessor, MemberAccessor, TypeMatcher,
};
use crate::error::ManifestError;
use crate::ids::{ItemId, RuleDefId, RuleKey, TypeName};
use crate::item::{ItemKind, ManifestItem};
use crate::rule::{DependencyRef, ManifestRule, RuleDefinition};

/// A rooted tree of [`ManifestItem`]s with their attached [`ManifestRule`]s.
///
/// Items and rules live in flat arenas and refer to each other by id, so the
/// tree has no owning back-edges. Polymorphic sub-nodes share their owner's
/// structural position; recursive nodes re-use an ancestor's definition.
#[derive(Debug, Clone)]
pub struct Manifest {
    items: Vec<ManifestItem>,
    rules: Vec<ManifestRule>,
}

impl Manifest {
    /// Create a manifest whose root validates values of `root_type`.
    pub fn new(root_type: impl Into<TypeName>) -> Self {
        let root = ManifestItem::new(ItemId(0), ItemKind::Root, root_type.into(), None);
        Self {
            items: vec![root],
            rules: Vec::new(),
        }
    }

    /// The root item.
    #[must_use]
    pub fn root(&self) -> ItemId {
        ItemId(0)
    }

    /// Look up an item.
    #[must_use]
    pub fn item(&self, id: ItemId) -> Option<&ManifestItem> {
        self.items.get(id.0)
    }

    /// Look up a rule definition.
    #[must_use]
    pub fn rule(&self, id: RuleDefId) -> Option<&ManifestRule> {
        self.rules.get(id.0)
    }

    /// All items, in creation order.
    #[must_use]
    pub fn items(&self) -> &[ManifestItem] {
        &self.items
    }

    /// All rule definitions, in declaration order.
    #[must_use]
    pub fn rules(&self) -> &[ManifestRule] {
        &self.rules
    }

    fn get(&self, id: ItemId) -> Result<&ManifestItem, ManifestError> {
        self.item(id).ok_or(ManifestError::UnknownItem(id))
    }

    fn get_mut(&mut self, id: ItemId) -> Result<&mut ManifestItem, ManifestError> {
        self.items
            .get_mut(id.0)
            .ok_or(ManifestError::UnknownItem(id))
    }

    fn push_item(
        &mut self,
        parent: ItemId,
        kind: ItemKind,
        validated_type: TypeName,
    ) -> Result<ItemId, ManifestError> {
        if self.get(parent)?.kind.is_recursive() {
            return Err(ManifestError::RecursiveNodeChildren(parent));
        }
        let id = ItemId(self.items.len());
        self.items
            .push(ManifestItem::new(id, kind, validated_type, Some(parent)));
        Ok(id)
    }

    // ── construction ────────────────────────────────────────────────────────

    /// Add a member read as the object field `name`.
    pub fn add_member(
        &mut self,
        parent: ItemId,
        name: &str,
        validated_type: impl Into<TypeName>,
    ) -> Result<ItemId, ManifestError> {
        self.add_member_with(parent, name, validated_type, MemberAccessor::field(name))
    }

    /// Add a member read by a custom accessor.
    pub fn add_member_with(
        &mut self,
        parent: ItemId,
        name: impl Into<Arc<str>>,
        validated_type: impl Into<TypeName>,
        accessor: MemberAccessor,
    ) -> Result<ItemId, ManifestError> {
        let kind = ItemKind::Member {
            name: name.into(),
            accessor,
        };
        let id = self.push_item(parent, kind, validated_type.into())?;
        self.items[parent.0].children.push(id);
        Ok(id)
    }

    /// Declare `owner` a collection whose items are validated as `item_type`.
    pub fn set_collection_item(
        &mut self,
        owner: ItemId,
        item_type: impl Into<TypeName>,
    ) -> Result<ItemId, ManifestError> {
        self.set_collection_item_with(owner, item_type, CollectionEnumerator::default())
    }

    /// Like [`set_collection_item`](Self::set_collection_item) with a custom enumerator.
    pub fn set_collection_item_with(
        &mut self,
        owner: ItemId,
        item_type: impl Into<TypeName>,
        enumerator: CollectionEnumerator,
    ) -> Result<ItemId, ManifestError> {
        if self.get(owner)?.collection_item.is_some() {
            return Err(ManifestError::CollectionItemAlreadySet(owner));
        }
        let id = self.push_item(
            owner,
            ItemKind::CollectionItem { enumerator },
            item_type.into(),
        )?;
        self.items[owner.0].collection_item = Some(id);
        Ok(id)
    }

    /// Declare `owner` a collection whose items are validated with the
    /// definition of the ancestor `ancestor_depth` levels above each item.
    ///
    /// `Node { children: [Node] }` is the root's `children` member with a
    /// recursive collection item of depth 2.
    pub fn set_recursive_collection_item(
        &mut self,
        owner: ItemId,
        ancestor_depth: usize,
    ) -> Result<ItemId, ManifestError> {
        let enumerator = CollectionEnumerator::default();
        self.set_recursive_collection_item_with(owner, enumerator, ancestor_depth)
    }

    /// Like [`set_recursive_collection_item`](Self::set_recursive_collection_item)
    /// with a custom enumerator. The depth is checked by [`validate`](Self::validate).
    pub fn set_recursive_collection_item_with(
        &mut self,
        owner: ItemId,
        enumerator: CollectionEnumerator,
        ancestor_depth: usize,
    ) -> Result<ItemId, ManifestError> {
        let owner_item = self.get(owner)?;
        if owner_item.collection_item.is_some() {
            return Err(ManifestError::CollectionItemAlreadySet(owner));
        }
        let validated_type = self.ancestor_type(owner, ancestor_depth, owner_item);
        let kind = ItemKind::RecursiveCollectionItem {
            enumerator,
            ancestor_depth,
        };
        let id = self.push_item(owner, kind, validated_type)?;
        self.items[owner.0].collection_item = Some(id);
        Ok(id)
    }

    /// Add a polymorphic sub-node that applies when `matcher` accepts the owner's value.
    pub fn add_polymorphic(
        &mut self,
        owner: ItemId,
        matcher: TypeMatcher,
    ) -> Result<ItemId, ManifestError> {
        let validated_type = matcher.type_name().clone();
        let id = self.push_item(owner, ItemKind::Polymorphic { matcher }, validated_type)?;
        self.items[owner.0].polymorphic.push(id);
        Ok(id)
    }

    /// Add a member, read as the object field `name`, that is validated with
    /// the definition of the ancestor `ancestor_depth` levels up.
    pub fn add_recursive(
        &mut self,
        parent: ItemId,
        name: &str,
        ancestor_depth: usize,
    ) -> Result<ItemId, ManifestError> {
        self.add_recursive_with(parent, name, MemberAccessor::field(name), ancestor_depth)
    }

    /// Like [`add_recursive`](Self::add_recursive) with a custom accessor.
    ///
    /// The depth is not checked here; [`validate`](Self::validate) and the
    /// engine report an unreachable ancestor.
    pub fn add_recursive_with(
        &mut self,
        parent: ItemId,
        name: impl Into<Arc<str>>,
        accessor: MemberAccessor,
        ancestor_depth: usize,
    ) -> Result<ItemId, ManifestError> {
        let parent_item = self.get(parent)?;
        let validated_type = self.ancestor_type(parent, ancestor_depth, parent_item);
        let kind = ItemKind::Recursive {
            name: name.into(),
            accessor,
            ancestor_depth,
        };
        let id = self.push_item(parent, kind, validated_type)?;
        self.items[parent.0].children.push(id);
        Ok(id)
    }

    /// Type of the ancestor a recursive node below `parent` re-uses, or the
    /// parent's own type when the depth does not reach one.
    fn ancestor_type(
        &self,
        parent: ItemId,
        ancestor_depth: usize,
        parent_item: &ManifestItem,
    ) -> TypeName {
        ancestor_depth
            .checked_sub(1)
            .and_then(|extra| self.walk_up(self.anchor(parent), extra))
            .and_then(|target| self.item(target))
            .unwrap_or(parent_item)
            .validated_type
            .clone()
    }

    /// Set the identity accessor of an item.
    pub fn with_identity(
        &mut self,
        item: ItemId,
        identity: IdentityAccessor,
    ) -> Result<(), ManifestError> {
        self.get_mut(item)?.identity = Some(identity);
        Ok(())
    }

    /// Set the value substituted when reading the item fails.
    pub fn with_default_value(&mut self, item: ItemId, value: Value) -> Result<(), ManifestError> {
        self.get_mut(item)?.default_value = value;
        Ok(())
    }

    /// Override the run's accessor-exception behaviour for one item.
    pub fn with_accessor_exception_behavior(
        &mut self,
        item: ItemId,
        behavior: AccessorExceptionBehavior,
    ) -> Result<(), ManifestError> {
        self.get_mut(item)?.accessor_exception_behavior = Some(behavior);
        Ok(())
    }

    /// Attach a rule to an item.
    pub fn add_rule(
        &mut self,
        item: ItemId,
        definition: RuleDefinition,
    ) -> Result<RuleDefId, ManifestError> {
        let owner = self.get(item)?;
        if owner.kind.is_recursive() {
            return Err(ManifestError::RecursiveNodeChildren(item));
        }
        let key = RuleKey {
            rule_type: definition.rule_type,
            validated_type: owner.validated_type.clone(),
            name: definition.name,
        };
        if self.find_rule(item, &key).is_some() {
            return Err(ManifestError::DuplicateRule { item, rule: key });
        }
        let id = RuleDefId(self.rules.len());
        self.rules.push(ManifestRule {
            id,
            key,
            item,
            config: definition.config,
            dependencies: definition.dependencies,
        });
        self.items[item.0].rules.push(id);
        Ok(id)
    }

    /// Add a dependency to an already declared rule.
    pub fn add_dependency(
        &mut self,
        rule: RuleDefId,
        target: DependencyRef,
    ) -> Result<(), ManifestError> {
        self.rules
            .get_mut(rule.0)
            .ok_or(ManifestError::UnknownRule(rule))?
            .dependencies
            .push(target);
        Ok(())
    }

    /// A dependency reference to a declared rule.
    #[must_use]
    pub fn rule_ref(&self, rule: RuleDefId) -> Option<DependencyRef> {
        self.rule(rule).map(ManifestRule::as_dependency)
    }

    /// Find the rule with `key` attached to `item`.
    #[must_use]
    pub fn find_rule(&self, item: ItemId, key: &RuleKey) -> Option<&ManifestRule> {
        self.item(item)?
            .rules
            .iter()
            .filter_map(|id| self.rule(*id))
            .find(|rule| &rule.key == key)
    }

    // ── structural queries ──────────────────────────────────────────────────

    /// The non-polymorphic item whose value `id` applies to.
    #[must_use]
    pub fn anchor(&self, id: ItemId) -> ItemId {
        let mut current = id;
        while let Some(item) = self.item(current) {
            match (item.is_polymorphic(), item.parent) {
                (true, Some(parent)) => current = parent,
                _ => break,
            }
        }
        current
    }

    /// The item one value-level above `id`; `None` at the root.
    #[must_use]
    pub fn structural_parent(&self, id: ItemId) -> Option<ItemId> {
        let parent = self.item(self.anchor(id))?.parent?;
        Some(self.anchor(parent))
    }

    /// Number of value-levels between `id` and the root.
    #[must_use]
    pub fn depth(&self, id: ItemId) -> usize {
        let mut depth = 0;
        let mut current = id;
        while let Some(parent) = self.structural_parent(current) {
            depth += 1;
            current = parent;
        }
        depth
    }

    fn walk_up(&self, from: ItemId, levels: usize) -> Option<ItemId> {
        let mut current = from;
        for _ in 0..levels {
            current = self.structural_parent(current)?;
        }
        Some(current)
    }

    /// The item whose sub-nodes and rules define `id`: the re-used ancestor
    /// for a recursive node or recursive collection item, `id` itself
    /// otherwise.
    pub fn definition_of(&self, id: ItemId) -> Result<ItemId, ManifestError> {
        let Some(depth) = self.get(id)?.kind.ancestor_depth() else {
            return Ok(id);
        };
        let invalid = ManifestError::InvalidRecursiveDepth { item: id, depth };
        if depth == 0 {
            return Err(invalid);
        }
        self.walk_up(id, depth).ok_or(invalid)
    }

    /// The deepest item that is a structural ancestor of (or equal to) both
    /// `a` and `b`.
    #[must_use]
    pub fn lowest_common_ancestor(&self, a: ItemId, b: ItemId) -> Option<ItemId> {
        let (mut a, mut b) = (self.anchor(a), self.anchor(b));
        self.item(a)?;
        self.item(b)?;
        let (mut depth_a, mut depth_b) = (self.depth(a), self.depth(b));
        while depth_a > depth_b {
            a = self.structural_parent(a)?;
            depth_a -= 1;
        }
        while depth_b > depth_a {
            b = self.structural_parent(b)?;
            depth_b -= 1;
        }
        while a != b {
            a = self.structural_parent(a)?;
            b = self.structural_parent(b)?;
        }
        Some(a)
    }

    /// Items on the way down from `ancestor` (exclusive) to `item`
    /// (inclusive), polymorphic sub-nodes included. `None` if `ancestor` is
    /// not above `item`.
    #[must_use]
    pub fn path_from(&self, ancestor: ItemId, item: ItemId) -> Option<Vec<ItemId>> {
        let mut path = Vec::new();
        let mut current = item;
        while current != ancestor {
            path.push(current);
            current = self.item(current)?.parent?;
        }
        path.reverse();
        Some(path)
    }

    /// Check that every recursive node reaches its ancestor and every
    /// dependency names a declared rule.
    pub fn validate(&self) -> Result<(), ManifestError> {
        for item in &self.items {
            self.definition_of(item.id)?;
        }
        for rule in &self.rules {
            for dependency in &rule.dependencies {
                if self.item(dependency.item).is_none() {
                    return Err(ManifestError::DanglingDependency {
                        rule: rule.key.clone(),
                        target: dependency.item,
                    });
                }
                if self.find_rule(dependency.item, &dependency.rule).is_none() {
                    return Err(ManifestError::UnknownDependencyRule {
                        rule: rule.key.clone(),
                        target_item: dependency.item,
                        target: dependency.rule.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
