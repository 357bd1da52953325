//! Manifest construction and validation errors.

use thiserror::Error;

use crate::ids::{ItemId, RuleDefId, RuleKey};

/// Errors raised while building or validating a [`Manifest`](crate::Manifest).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    /// An item id does not belong to this manifest.
    #[error("unknown manifest item: {0}")]
    UnknownItem(ItemId),

    /// A rule definition id does not belong to this manifest.
    #[error("unknown rule definition: {0}")]
    UnknownRule(RuleDefId),

    /// The item already has a collection-item sub-node.
    #[error("{0} already has a collection item")]
    CollectionItemAlreadySet(ItemId),

    /// Recursive nodes re-point to an ancestor and cannot own sub-nodes or rules.
    #[error("recursive node {0} cannot own sub-nodes or rules")]
    RecursiveNodeChildren(ItemId),

    /// A recursive node names an ancestor depth that does not exist.
    #[error("recursive node {item} asks for ancestor depth {depth}, which does not exist")]
    InvalidRecursiveDepth {
        /// The recursive node.
        item: ItemId,
        /// The requested depth (1 is the immediate parent).
        depth: usize,
    },

    /// Two rules on one item share a key; give one of them a name.
    #[error("{item} already has rule {rule}; name one of them to tell them apart")]
    DuplicateRule {
        /// The item both rules are attached to.
        item: ItemId,
        /// The shared key.
        rule: RuleKey,
    },

    /// A dependency points at an item that is not part of the manifest.
    #[error("rule {rule} depends on unknown item {target}")]
    DanglingDependency {
        /// The dependent rule.
        rule: RuleKey,
        /// The missing item.
        target: ItemId,
    },

    /// A dependency names a rule that is not attached to the target item.
    #[error("rule {rule} depends on {target} at {target_item}, which is not declared there")]
    UnknownDependencyRule {
        /// The dependent rule.
        rule: RuleKey,
        /// Item the dependency points at.
        target_item: ItemId,
        /// Rule the dependency names.
        target: RuleKey,
    },
}
