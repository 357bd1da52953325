//! Concrete rule identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};
use verdict_manifest::{ObjectIdentity, RuleKey};

/// Identifies one executed rule within a run: rule type, validated type,
/// the validated object's identity and the optional rule name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleIdentifier {
    /// Manifest-level rule identity.
    #[serde(flatten)]
    pub key: RuleKey,
    /// Identity of the validated object, if its manifest node has an
    /// identity accessor.
    pub identity: Option<ObjectIdentity>,
}

impl RuleIdentifier {
    /// Pair a rule key with an object identity.
    #[must_use]
    pub fn new(key: RuleKey, identity: Option<ObjectIdentity>) -> Self {
        Self { key, identity }
    }

    /// Rule implementation name.
    #[must_use]
    pub fn rule_type(&self) -> &str {
        &self.key.rule_type
    }

    /// Type of the validated value.
    #[must_use]
    pub fn validated_type(&self) -> &str {
        &self.key.validated_type
    }

    /// Disambiguating rule name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.key.name.as_deref()
    }
}

impl fmt::Display for RuleIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>", self.key.rule_type, self.key.validated_type)?;
        if let Some(identity) = &self.identity {
            write!(f, "@{identity}")?;
        }
        if let Some(name) = &self.key.name {
            write!(f, "[{name}]")?;
        }
        Ok(())
    }
}
