//! Identifiers for manifest nodes, rule definitions and validated objects.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Name of a type under validation, e.g. `"Customer"`.
pub type TypeName = Arc<str>;

/// Position of a [`ManifestItem`](crate::ManifestItem) inside its [`Manifest`](crate::Manifest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub(crate) usize);

impl ItemId {
    /// Zero-based arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

/// Position of a [`ManifestRule`](crate::ManifestRule) inside its [`Manifest`](crate::Manifest).
///
/// Rule definitions are numbered in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleDefId(pub(crate) usize);

impl RuleDefId {
    /// Zero-based arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RuleDefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule#{}", self.0)
    }
}

/// The manifest-level identity of a rule: which implementation, for which
/// validated type, and an optional disambiguating name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleKey {
    /// Rule implementation name, as registered with the engine.
    pub rule_type: Arc<str>,
    /// Type of the value the rule validates.
    pub validated_type: TypeName,
    /// Disambiguates several rules of the same type on one value.
    #[serde(default)]
    pub name: Option<Arc<str>>,
}

impl RuleKey {
    /// Create an unnamed rule key.
    pub fn new(rule_type: impl Into<Arc<str>>, validated_type: impl Into<TypeName>) -> Self {
        Self {
            rule_type: rule_type.into(),
            validated_type: validated_type.into(),
            name: None,
        }
    }

    /// Attach a disambiguating name.
    #[must_use]
    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>", self.rule_type, self.validated_type)?;
        if let Some(name) = &self.name {
            write!(f, "[{name}]")?;
        }
        Ok(())
    }
}

/// Stable identity of a validated object, extracted by an
/// [`IdentityAccessor`](crate::IdentityAccessor).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectIdentity(Arc<str>);

impl ObjectIdentity {
    /// The identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ObjectIdentity {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for ObjectIdentity {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_key_display() {
        let key = RuleKey::new("NotNull", "Customer");
        assert_eq!(key.to_string(), "NotNull<Customer>");
        assert_eq!(key.named("email").to_string(), "NotNull<Customer>[email]");
    }

    #[test]
    fn rule_key_equality_includes_name() {
        let a = RuleKey::new("Range", "Order");
        let b = RuleKey::new("Range", "Order").named("total");
        assert_ne!(a, b);
        assert_eq!(b, RuleKey::new("Range", "Order").named("total"));
    }

    #[test]
    fn identity_serializes_as_plain_string() {
        let id = ObjectIdentity::from("c-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"c-42\"");
    }
}
