//! Builds the value tree for one run from a manifest and a root object.

use std::sync::Arc;

use serde_json::Value;
use verdict_manifest::{
    AccessorError, AccessorExceptionBehavior, ItemId, ItemKind, Manifest, ManifestError,
    ManifestItem,
};

use crate::error::EngineError;
use crate::value::{ValidatedValue, ValueId, ValueTree};

/// Walk `manifest` against `root`, producing one [`ValidatedValue`] per
/// value under validation.
///
/// Values are created depth-first in manifest declaration order. `null`
/// values are materialized but never descended into. Accessor failures are
/// handled per `behavior`, unless the failing node overrides it; a collection
/// that cannot be enumerated is treated as empty unless the failure
/// propagates.
pub fn materialize(
    manifest: &Manifest,
    root: Value,
    behavior: AccessorExceptionBehavior,
) -> Result<ValueTree, EngineError> {
    let mut materializer = Materializer {
        manifest,
        behavior,
        values: Vec::new(),
    };
    let root_id = materializer.push(manifest.root(), root, None, None)?;
    materializer.expand(root_id)?;
    tracing::debug!(values = materializer.values.len(), "materialized value tree");
    Ok(ValueTree {
        values: materializer.values,
    })
}

struct Materializer<'m> {
    manifest: &'m Manifest,
    behavior: AccessorExceptionBehavior,
    values: Vec<ValidatedValue>,
}

/// What to do with a value after trying to read it.
enum Read {
    Value(Value),
    Skip,
}

impl<'m> Materializer<'m> {
    fn item(&self, id: ItemId) -> Result<&'m ManifestItem, EngineError> {
        self.manifest
            .item(id)
            .ok_or(EngineError::Manifest(ManifestError::UnknownItem(id)))
    }

    fn push(
        &mut self,
        item: ItemId,
        value: Value,
        parent: Option<ValueId>,
        arrival_order: Option<usize>,
    ) -> Result<ValueId, EngineError> {
        let definition = self.manifest.definition_of(item)?;
        let identity = self.item(definition)?.identity_of(&value);
        let id = ValueId(self.values.len());
        self.values.push(ValidatedValue {
            id,
            item,
            definition,
            applied: vec![definition],
            value: Arc::new(value),
            identity,
            parent,
            children: Vec::new(),
            arrival_order,
        });
        if let Some(parent) = parent {
            self.values[parent.0].children.push(id);
        }
        Ok(id)
    }

    fn expand(&mut self, id: ValueId) -> Result<(), EngineError> {
        let current = &self.values[id.0];
        if current.value.is_null() {
            return Ok(());
        }
        let definition = current.definition;
        let value = Arc::clone(&current.value);
        self.expand_definition(id, definition, &value)
    }

    fn expand_definition(
        &mut self,
        id: ValueId,
        definition: ItemId,
        value: &Value,
    ) -> Result<(), EngineError> {
        let item = self.item(definition)?;

        for &child in item.children() {
            let child_item = self.item(child)?;
            let (accessor, recursive) = match child_item.kind() {
                ItemKind::Member { accessor, .. } => (accessor, false),
                ItemKind::Recursive { accessor, .. } => (accessor, true),
                _ => continue,
            };
            let read = match accessor.access(value) {
                Ok(read) => Read::Value(read),
                Err(err) => self.on_accessor_error(child_item, err)?,
            };
            let Read::Value(read) = read else {
                continue;
            };
            if recursive && self.repeats_ancestor(id, child, &read)? {
                tracing::debug!(item = %child, "recursive value repeats an ancestor");
                continue;
            }
            let child_id = self.push(child, read, Some(id), None)?;
            self.expand(child_id)?;
        }

        if let Some(collection_item) = item.collection_item() {
            let element_item = self.item(collection_item)?;
            if let Some(enumerator) = element_item.kind().enumerator() {
                let recursive = element_item.kind().is_recursive();
                let elements = match enumerator.enumerate(value) {
                    Ok(elements) => elements,
                    Err(err) => {
                        // Elements have no default of their own.
                        self.on_accessor_error(element_item, err)?;
                        Vec::new()
                    }
                };
                for (order, element) in elements.into_iter().enumerate() {
                    if recursive && self.repeats_ancestor(id, collection_item, &element)? {
                        tracing::debug!(
                            item = %collection_item,
                            order,
                            "collection item repeats an ancestor"
                        );
                        continue;
                    }
                    let element_id = self.push(collection_item, element, Some(id), Some(order))?;
                    self.expand(element_id)?;
                }
            }
        }

        for &sub_type in item.polymorphic_types() {
            if let ItemKind::Polymorphic { matcher } = self.item(sub_type)?.kind() {
                if matcher.matches(value) {
                    self.values[id.0].applied.push(sub_type);
                    self.expand_definition(id, sub_type, value)?;
                }
            }
        }
        Ok(())
    }

    fn on_accessor_error(
        &self,
        item: &ManifestItem,
        err: AccessorError,
    ) -> Result<Read, EngineError> {
        let behavior = item.accessor_exception_behavior().unwrap_or(self.behavior);
        match behavior {
            AccessorExceptionBehavior::Propagate => Err(EngineError::Accessor {
                item: item.id(),
                source: err,
            }),
            AccessorExceptionBehavior::TreatAsDefault => {
                tracing::debug!(item = %item.id(), error = %err, "accessor failed, using default");
                Ok(Read::Value(item.default_value().clone()))
            }
            AccessorExceptionBehavior::Skip => {
                tracing::debug!(item = %item.id(), error = %err, "accessor failed, skipping");
                Ok(Read::Skip)
            }
        }
    }

    /// Whether `value`, about to be read through recursive node `item` below
    /// `parent`, is an ancestor validated with the same definition.
    ///
    /// Objects with an identity are compared by identity alone; the others
    /// by value, and only against ancestors sharing the definition.
    fn repeats_ancestor(
        &self,
        parent: ValueId,
        item: ItemId,
        value: &Value,
    ) -> Result<bool, EngineError> {
        let definition = self.manifest.definition_of(item)?;
        let identity = self.item(definition)?.identity_of(value);
        let mut next = Some(parent);
        while let Some(id) = next {
            let ancestor = &self.values[id.0];
            if ancestor.definition == definition {
                let repeats = match (&identity, &ancestor.identity) {
                    (Some(identity), Some(seen)) => identity == seen,
                    _ => *ancestor.value == *value,
                };
                if repeats {
                    return Ok(true);
                }
            }
            next = ancestor.parent;
        }
        Ok(false)
    }
}
