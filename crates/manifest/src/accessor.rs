//! Pre-resolved functions the engine calls to walk an object graph.
//!
//! The engine never inspects types itself. Every manifest node carries
//! opaque closures built ahead of time: how to read a member, how to
//! extract an identity, how to enumerate a collection, and which runtime
//! shapes a polymorphic sub-node applies to.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{ObjectIdentity, TypeName};

/// Raised when an accessor or enumerator cannot read a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AccessorError {
    message: String,
}

impl AccessorError {
    /// Create an accessor error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// What to do when a member accessor or collection enumerator fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessorExceptionBehavior {
    /// Abort the whole run with the accessor error.
    #[default]
    Propagate,
    /// Substitute the node's default value and keep going.
    TreatAsDefault,
    /// Drop the value and its subtree; rules that depend on it can never pass.
    Skip,
}

type AccessFn = dyn Fn(&Value) -> Result<Value, AccessorError> + Send + Sync;
type IdentityFn = dyn Fn(&Value) -> Option<ObjectIdentity> + Send + Sync;
type EnumerateFn = dyn Fn(&Value) -> Result<Vec<Value>, AccessorError> + Send + Sync;
type MatchFn = dyn Fn(&Value) -> bool + Send + Sync;

/// Reads one member of a parent value.
#[derive(Clone)]
pub struct MemberAccessor(Arc<AccessFn>);

impl MemberAccessor {
    /// Wrap an arbitrary accessor function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, AccessorError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Read an object field. A missing field reads as `null`; reading a
    /// field of anything but an object is an error.
    pub fn field(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(move |value| match value {
            Value::Object(map) => Ok(map.get(&name).cloned().unwrap_or(Value::Null)),
            other => Err(AccessorError::new(format!(
                "cannot read member `{name}` of {}",
                kind_name(other)
            ))),
        })
    }

    /// Apply the accessor to a parent value.
    pub fn access(&self, parent: &Value) -> Result<Value, AccessorError> {
        (self.0)(parent)
    }
}

impl fmt::Debug for MemberAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MemberAccessor(..)")
    }
}

/// Extracts a stable identity from a value.
#[derive(Clone)]
pub struct IdentityAccessor(Arc<IdentityFn>);

impl IdentityAccessor {
    /// Wrap an arbitrary identity function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Option<ObjectIdentity> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Use a scalar object field as the identity.
    pub fn field(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(move |value| match value.get(&name)? {
            Value::String(s) => Some(ObjectIdentity::from(s.as_str())),
            Value::Number(n) => Some(ObjectIdentity::from(n.to_string())),
            Value::Bool(b) => Some(ObjectIdentity::from(b.to_string())),
            _ => None,
        })
    }

    /// Compute the identity of a value, if it has one.
    pub fn identify(&self, value: &Value) -> Option<ObjectIdentity> {
        (self.0)(value)
    }
}

impl fmt::Debug for IdentityAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdentityAccessor(..)")
    }
}

/// Enumerates the items of a collection value.
#[derive(Clone)]
pub struct CollectionEnumerator(Arc<EnumerateFn>);

impl CollectionEnumerator {
    /// Wrap an arbitrary enumeration function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<Vec<Value>, AccessorError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Enumerate the items of `collection`, in enumeration order.
    pub fn enumerate(&self, collection: &Value) -> Result<Vec<Value>, AccessorError> {
        (self.0)(collection)
    }
}

impl Default for CollectionEnumerator {
    /// Arrays yield their elements, objects their values, `null` nothing.
    fn default() -> Self {
        Self::new(|value| match value {
            Value::Array(items) => Ok(items.clone()),
            Value::Object(map) => Ok(map.values().cloned().collect()),
            Value::Null => Ok(Vec::new()),
            other => Err(AccessorError::new(format!(
                "{} is not enumerable",
                kind_name(other)
            ))),
        })
    }
}

impl fmt::Debug for CollectionEnumerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CollectionEnumerator(..)")
    }
}

/// Decides whether a value's runtime shape is (or derives from) a declared type.
#[derive(Clone)]
pub struct TypeMatcher {
    type_name: TypeName,
    predicate: Arc<MatchFn>,
}

impl TypeMatcher {
    /// Match values accepted by `predicate` as `type_name`.
    pub fn new<F>(type_name: impl Into<TypeName>, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            type_name: type_name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Match objects whose `field` holds one of `tags`.
    ///
    /// Listing a derived type's tag alongside the base tag makes derived
    /// values match the base sub-node too.
    pub fn discriminator<I, S>(
        type_name: impl Into<TypeName>,
        field: impl Into<String>,
        tags: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let field = field.into();
        let tags: Vec<String> = tags.into_iter().map(Into::into).collect();
        Self::new(type_name, move |value| {
            value
                .get(&field)
                .and_then(Value::as_str)
                .is_some_and(|tag| tags.iter().any(|t| t == tag))
        })
    }

    /// The declared type name.
    #[must_use]
    pub fn type_name(&self) -> &TypeName {
        &self.type_name
    }

    /// Whether `value` is an instance of the declared type.
    pub fn matches(&self, value: &Value) -> bool {
        (self.predicate)(value)
    }
}

impl fmt::Debug for TypeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeMatcher")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_accessor_reads_and_defaults_missing_to_null() {
        let accessor = MemberAccessor::field("name");
        assert_eq!(accessor.access(&json!({"name": "Ada"})).unwrap(), json!("Ada"));
        assert_eq!(accessor.access(&json!({})).unwrap(), Value::Null);
    }

    #[test]
    fn field_accessor_rejects_non_objects() {
        let accessor = MemberAccessor::field("name");
        let err = accessor.access(&json!(5)).unwrap_err();
        assert_eq!(err.to_string(), "cannot read member `name` of a number");
        assert!(accessor.access(&Value::Null).is_err());
    }

    #[test]
    fn identity_from_scalar_fields() {
        let by_id = IdentityAccessor::field("id");
        assert_eq!(by_id.identify(&json!({"id": 7})), Some(ObjectIdentity::from("7")));
        assert_eq!(by_id.identify(&json!({"id": "x"})), Some(ObjectIdentity::from("x")));
        assert_eq!(by_id.identify(&json!({"id": [1]})), None);
        assert_eq!(by_id.identify(&Value::Null), None);
    }

    #[test]
    fn default_enumerator() {
        let e = CollectionEnumerator::default();
        assert_eq!(e.enumerate(&json!([1, 2, 3])).unwrap().len(), 3);
        assert!(e.enumerate(&Value::Null).unwrap().is_empty());
        assert!(e.enumerate(&json!("abc")).is_err());
    }

    #[test]
    fn discriminator_matches_any_listed_tag() {
        let shape = TypeMatcher::discriminator("Shape", "kind", ["circle", "square"]);
        assert!(shape.matches(&json!({"kind": "circle"})));
        assert!(shape.matches(&json!({"kind": "square"})));
        assert!(!shape.matches(&json!({"kind": "line"})));
        assert!(!shape.matches(&json!(null)));
        assert_eq!(shape.type_name().as_ref(), "Shape");
    }
}
