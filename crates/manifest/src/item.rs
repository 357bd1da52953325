//! Nodes of the manifest tree.

use std::sync::Arc;

use serde_json::Value;

use crate::accessor::{
    AccessorExceptionBehavior, CollectionEnumerator, IdentityAccessor, MemberAccessor, TypeMatcher,
};
use crate::ids::{ItemId, ObjectIdentity, RuleDefId, TypeName};

/// How a node obtains its value from its parent.
#[derive(Debug, Clone)]
pub enum ItemKind {
    /// The root object itself.
    Root,
    /// A named member read from the parent value.
    Member {
        /// Member name, used in diagnostics.
        name: Arc<str>,
        /// Reads the member.
        accessor: MemberAccessor,
    },
    /// One item of the parent collection; materialized once per item.
    CollectionItem {
        /// Enumerates the parent collection.
        enumerator: CollectionEnumerator,
    },
    /// Additional children and rules that apply when the parent value's
    /// runtime shape matches.
    Polymorphic {
        /// Decides whether the parent value matches.
        matcher: TypeMatcher,
    },
    /// A member whose definition is an ancestor node, re-used by reference.
    Recursive {
        /// Member name, used in diagnostics.
        name: Arc<str>,
        /// Reads the member.
        accessor: MemberAccessor,
        /// Structural levels up to the re-used ancestor; 1 is the parent.
        ancestor_depth: usize,
    },
    /// One item of the parent collection, validated with an ancestor's
    /// definition. Describes self-similar collections such as tree children.
    RecursiveCollectionItem {
        /// Enumerates the parent collection.
        enumerator: CollectionEnumerator,
        /// Structural levels from the item up to the re-used ancestor.
        ancestor_depth: usize,
    },
}

impl ItemKind {
    /// Whether the node borrows an ancestor's definition instead of owning
    /// children and rules.
    #[must_use]
    pub fn is_recursive(&self) -> bool {
        matches!(
            self,
            Self::Recursive { .. } | Self::RecursiveCollectionItem { .. }
        )
    }

    /// Levels up to the re-used ancestor, for recursive nodes.
    #[must_use]
    pub fn ancestor_depth(&self) -> Option<usize> {
        match self {
            Self::Recursive { ancestor_depth, .. }
            | Self::RecursiveCollectionItem { ancestor_depth, .. } => Some(*ancestor_depth),
            _ => None,
        }
    }

    /// The enumerator of a collection-item node.
    #[must_use]
    pub fn enumerator(&self) -> Option<&CollectionEnumerator> {
        match self {
            Self::CollectionItem { enumerator }
            | Self::RecursiveCollectionItem { enumerator, .. } => Some(enumerator),
            _ => None,
        }
    }
}

/// One node of the manifest: what is validated and which rules apply.
#[derive(Debug, Clone)]
pub struct ManifestItem {
    pub(crate) id: ItemId,
    pub(crate) kind: ItemKind,
    pub(crate) validated_type: TypeName,
    pub(crate) parent: Option<ItemId>,
    pub(crate) identity: Option<IdentityAccessor>,
    pub(crate) default_value: Value,
    pub(crate) accessor_exception_behavior: Option<AccessorExceptionBehavior>,
    pub(crate) children: Vec<ItemId>,
    pub(crate) collection_item: Option<ItemId>,
    pub(crate) polymorphic: Vec<ItemId>,
    pub(crate) rules: Vec<RuleDefId>,
}

impl ManifestItem {
    pub(crate) fn new(
        id: ItemId,
        kind: ItemKind,
        validated_type: TypeName,
        parent: Option<ItemId>,
    ) -> Self {
        Self {
            id,
            kind,
            validated_type,
            parent,
            identity: None,
            default_value: Value::Null,
            accessor_exception_behavior: None,
            children: Vec::new(),
            collection_item: None,
            polymorphic: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// This node's id.
    #[must_use]
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// How the node obtains its value.
    #[must_use]
    pub fn kind(&self) -> &ItemKind {
        &self.kind
    }

    /// Type of the value under validation.
    #[must_use]
    pub fn validated_type(&self) -> &TypeName {
        &self.validated_type
    }

    /// The node this one hangs from in the manifest; `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<ItemId> {
        self.parent
    }

    /// Member name for member and recursive nodes.
    #[must_use]
    pub fn member_name(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::Member { name, .. } | ItemKind::Recursive { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Whether this is a polymorphic sub-node.
    #[must_use]
    pub fn is_polymorphic(&self) -> bool {
        matches!(self.kind, ItemKind::Polymorphic { .. })
    }

    /// Identity of `value` according to this node's identity accessor.
    pub fn identity_of(&self, value: &Value) -> Option<ObjectIdentity> {
        self.identity.as_ref().and_then(|accessor| accessor.identify(value))
    }

    /// Value substituted when an accessor fails under
    /// [`AccessorExceptionBehavior::TreatAsDefault`].
    #[must_use]
    pub fn default_value(&self) -> &Value {
        &self.default_value
    }

    /// Per-node override of the run's accessor-exception behaviour.
    #[must_use]
    pub fn accessor_exception_behavior(&self) -> Option<AccessorExceptionBehavior> {
        self.accessor_exception_behavior
    }

    /// Member and recursive children, in declaration order.
    #[must_use]
    pub fn children(&self) -> &[ItemId] {
        &self.children
    }

    /// Collection-item sub-node, if this node is a collection.
    #[must_use]
    pub fn collection_item(&self) -> Option<ItemId> {
        self.collection_item
    }

    /// Polymorphic sub-nodes, in declaration order.
    #[must_use]
    pub fn polymorphic_types(&self) -> &[ItemId] {
        &self.polymorphic
    }

    /// Rules attached to this node, in declaration order.
    #[must_use]
    pub fn rules(&self) -> &[RuleDefId] {
        &self.rules
    }
}
