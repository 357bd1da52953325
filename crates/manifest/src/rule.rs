//! Rule definitions attached to manifest nodes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{ItemId, RuleDefId, RuleKey};

/// Settings applied to a rule instance when it is created.
pub type RuleConfig = serde_json::Map<String, Value>;

/// An absolute reference to another rule definition: the item it is attached
/// to plus its key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyRef {
    /// Item the target rule is attached to.
    pub item: ItemId,
    /// Key of the target rule on that item.
    pub rule: RuleKey,
}

/// A rule declared on a [`ManifestItem`](crate::ManifestItem).
#[derive(Debug, Clone)]
pub struct ManifestRule {
    pub(crate) id: RuleDefId,
    pub(crate) key: RuleKey,
    pub(crate) item: ItemId,
    pub(crate) config: RuleConfig,
    pub(crate) dependencies: Vec<DependencyRef>,
}

impl ManifestRule {
    /// Declaration-order id.
    #[must_use]
    pub fn id(&self) -> RuleDefId {
        self.id
    }

    /// Rule identity within its item.
    #[must_use]
    pub fn key(&self) -> &RuleKey {
        &self.key
    }

    /// The item this rule is attached to.
    #[must_use]
    pub fn item(&self) -> ItemId {
        self.item
    }

    /// Settings applied to each instance of the rule.
    #[must_use]
    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    /// Resolved structural dependencies.
    #[must_use]
    pub fn dependencies(&self) -> &[DependencyRef] {
        &self.dependencies
    }

    /// A reference other rules can depend on.
    #[must_use]
    pub fn as_dependency(&self) -> DependencyRef {
        DependencyRef {
            item: self.item,
            rule: self.key.clone(),
        }
    }
}

/// Input to [`Manifest::add_rule`](crate::Manifest::add_rule). The validated
/// type is taken from the item the rule is attached to.
#[derive(Debug, Clone, Default)]
pub struct RuleDefinition {
    pub(crate) rule_type: Arc<str>,
    pub(crate) name: Option<Arc<str>>,
    pub(crate) config: RuleConfig,
    pub(crate) dependencies: Vec<DependencyRef>,
}

impl RuleDefinition {
    /// Declare a rule of the given registered type.
    pub fn new(rule_type: impl Into<Arc<str>>) -> Self {
        Self {
            rule_type: rule_type.into(),
            ..Self::default()
        }
    }

    /// Give the rule a disambiguating name.
    #[must_use]
    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set one configuration entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Depend on another rule.
    #[must_use]
    pub fn depends_on(mut self, target: DependencyRef) -> Self {
        self.dependencies.push(target);
        self
    }
}
