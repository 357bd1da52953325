//! The materialized value tree of one validation run.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use verdict_manifest::{ItemId, ObjectIdentity};

/// Position of a [`ValidatedValue`] in its [`ValueTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ValueId(pub(crate) usize);

impl ValueId {
    /// Zero-based arena index; values are numbered in depth-first order.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value#{}", self.0)
    }
}

/// One concrete value under validation.
///
/// Immutable once the tree is built. The parent link is an index used for
/// traversal only. The value is shared with the materializer that expanded
/// it.
#[derive(Debug)]
pub struct ValidatedValue {
    pub(crate) id: ValueId,
    pub(crate) item: ItemId,
    pub(crate) definition: ItemId,
    pub(crate) applied: Vec<ItemId>,
    pub(crate) value: Arc<Value>,
    pub(crate) identity: Option<ObjectIdentity>,
    pub(crate) parent: Option<ValueId>,
    pub(crate) children: Vec<ValueId>,
    pub(crate) arrival_order: Option<usize>,
}

impl ValidatedValue {
    /// This value's id.
    #[must_use]
    pub fn id(&self) -> ValueId {
        self.id
    }

    /// The manifest node this value was read through.
    #[must_use]
    pub fn item(&self) -> ItemId {
        self.item
    }

    /// The manifest node whose rules and sub-nodes apply (differs from
    /// [`item`](Self::item) for recursive nodes).
    #[must_use]
    pub fn definition(&self) -> ItemId {
        self.definition
    }

    /// The definition plus every polymorphic sub-node that matched.
    #[must_use]
    pub fn applied_items(&self) -> &[ItemId] {
        &self.applied
    }

    /// Whether rules attached to `item` apply to this value.
    #[must_use]
    pub fn applies(&self, item: ItemId) -> bool {
        self.applied.contains(&item)
    }

    /// The actual value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Identity computed by the manifest node's identity accessor.
    #[must_use]
    pub fn identity(&self) -> Option<&ObjectIdentity> {
        self.identity.as_ref()
    }

    /// The value this one was read from; `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<ValueId> {
        self.parent
    }

    /// Values read from this one, in materialization order.
    #[must_use]
    pub fn children(&self) -> &[ValueId] {
        &self.children
    }

    /// Zero-based position within the enumerated collection, for collection items.
    #[must_use]
    pub fn arrival_order(&self) -> Option<usize> {
        self.arrival_order
    }
}

/// All values materialized for one run, stored depth-first.
#[derive(Debug)]
pub struct ValueTree {
    pub(crate) values: Vec<ValidatedValue>,
}

impl ValueTree {
    /// The value for the root object.
    ///
    /// # Panics
    ///
    /// Never for trees built by the materializer, which always creates the root.
    #[must_use]
    pub fn root(&self) -> &ValidatedValue {
        &self.values[0]
    }

    /// Look up a value.
    #[must_use]
    pub fn get(&self, id: ValueId) -> Option<&ValidatedValue> {
        self.values.get(id.0)
    }

    /// Number of materialized values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the tree is empty (never true for a materialized tree).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All values, depth-first.
    pub fn iter(&self) -> impl Iterator<Item = &ValidatedValue> {
        self.values.iter()
    }

    /// Values materialized through `item`.
    pub fn values_for(&self, item: ItemId) -> impl Iterator<Item = &ValidatedValue> {
        self.values.iter().filter(move |v| v.item == item)
    }

    /// Direct children of a value.
    pub fn children_of(&self, id: ValueId) -> impl Iterator<Item = &ValidatedValue> {
        self.get(id)
            .map(|v| v.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.get(*child))
    }

    /// Ancestors of a value, closest first.
    pub fn ancestors(&self, id: ValueId) -> impl Iterator<Item = &ValidatedValue> {
        let mut next = self.get(id).and_then(|v| v.parent);
        std::iter::from_fn(move || {
            let current = self.get(next?)?;
            next = current.parent;
            Some(current)
        })
    }

    /// The parent handed to rules that validate a value together with its
    /// parent. A collection item's parent is the object owning the
    /// collection, not the collection itself.
    #[must_use]
    pub fn logical_parent(&self, id: ValueId) -> Option<&ValidatedValue> {
        let value = self.get(id)?;
        let parent = self.get(value.parent?)?;
        if value.arrival_order.is_some() {
            self.get(parent.parent?)
        } else {
            Some(parent)
        }
    }
}
