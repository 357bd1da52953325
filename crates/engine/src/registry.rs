//! Rule registry for creating rule logic by rule type.

use std::sync::Arc;

use dashmap::DashMap;
use verdict_manifest::{ManifestRule, RuleConfig};

use crate::error::EngineError;
use crate::rule::{RuleError, RuleLogic};

/// Creates rule logic from a manifest rule's configuration.
///
/// Implemented for any `Fn(&RuleConfig) -> Result<RuleLogic, RuleError>`.
pub trait RuleFactory: Send + Sync {
    /// Build one rule instance, applying `config` to it.
    fn create(&self, config: &RuleConfig) -> Result<RuleLogic, RuleError>;
}

impl<F> RuleFactory for F
where
    F: Fn(&RuleConfig) -> Result<RuleLogic, RuleError> + Send + Sync,
{
    fn create(&self, config: &RuleConfig) -> Result<RuleLogic, RuleError> {
        self(config)
    }
}

/// Thread-safe registry of rule factories keyed by rule type
/// (e.g. `"NotNull"`).
///
/// # Examples
///
/// ```rust,ignore
/// let registry = RuleRegistry::new();
/// registry.register_instance("NotNull", RuleLogic::value(NotNull));
/// ```
pub struct RuleRegistry {
    factories: DashMap<String, Arc<dyn RuleFactory>>,
}

impl RuleRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }

    /// Register a factory for `rule_type`.
    ///
    /// If a factory for the same rule type already exists, it is replaced.
    pub fn register(&self, rule_type: impl Into<String>, factory: Arc<dyn RuleFactory>) {
        let rule_type = rule_type.into();
        tracing::info!(rule_type = %rule_type, "registered rule factory");
        self.factories.insert(rule_type, factory);
    }

    /// Register a closure as the factory for `rule_type`.
    pub fn register_fn<F>(&self, rule_type: impl Into<String>, factory: F)
    where
        F: Fn(&RuleConfig) -> Result<RuleLogic, RuleError> + Send + Sync + 'static,
    {
        self.register(rule_type, Arc::new(factory));
    }

    /// Register one shared instance for every rule of `rule_type`,
    /// ignoring configuration.
    pub fn register_instance(&self, rule_type: impl Into<String>, logic: RuleLogic) {
        self.register_fn(rule_type, move |_: &RuleConfig| Ok(logic.clone()));
    }

    /// Create the logic for a manifest rule.
    pub fn create(&self, rule: &ManifestRule) -> Result<RuleLogic, EngineError> {
        let rule_type = &rule.key().rule_type;
        let factory = self
            .factories
            .get(&**rule_type)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::UnknownRuleType {
                rule_type: rule_type.clone(),
            })?;
        factory
            .create(rule.config())
            .map_err(|source| EngineError::RuleConstruction {
                rule: rule.key().clone(),
                source,
            })
    }

    /// Check if a factory is registered for the given rule type.
    #[must_use]
    pub fn contains(&self, rule_type: &str) -> bool {
        self.factories.contains_key(rule_type)
    }

    /// Remove a factory. Returns the removed factory, if any.
    pub fn remove(&self, rule_type: &str) -> Option<Arc<dyn RuleFactory>> {
        self.factories.remove(rule_type).map(|(_, v)| v)
    }

    /// Number of registered rule types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// List all registered rule types.
    #[must_use]
    pub fn rule_types(&self) -> Vec<String> {
        self.factories.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("rule_types", &self.rule_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleContext, RuleOutput, ValueRule};
    use serde_json::{Value, json};
    use verdict_manifest::{Manifest, RuleDefinition};

    struct MaxLength(u64);

    #[async_trait::async_trait]
    impl ValueRule for MaxLength {
        async fn validate(
            &self,
            value: &Value,
            _ctx: &RuleContext,
        ) -> Result<RuleOutput, RuleError> {
            let len = value.as_str().map_or(0, str::len);
            Ok(RuleOutput::from_bool(u64::try_from(len).is_ok_and(|len| len <= self.0)))
        }
    }

    fn max_length(config: &RuleConfig) -> Result<RuleLogic, RuleError> {
        let max = config
            .get("max")
            .and_then(Value::as_u64)
            .ok_or_else(|| RuleError::Configuration("`max` must be an integer".into()))?;
        Ok(RuleLogic::value(MaxLength(max)))
    }

    fn manifest_with(definition: RuleDefinition) -> Manifest {
        let mut m = Manifest::new("Customer");
        let root = m.root();
        m.add_rule(root, definition).unwrap();
        m
    }

    #[test]
    fn register_and_create() {
        let reg = RuleRegistry::new();
        reg.register_fn("MaxLength", max_length);
        assert!(reg.contains("MaxLength"));
        assert_eq!(reg.len(), 1);

        let m = manifest_with(RuleDefinition::new("MaxLength").with_config("max", json!(5)));
        let logic = reg.create(&m.rules()[0]).unwrap();
        assert!(!logic.is_parallel_safe());
    }

    #[test]
    fn unknown_rule_type_is_an_error() {
        let reg = RuleRegistry::new();
        let m = manifest_with(RuleDefinition::new("Missing"));
        let err = reg.create(&m.rules()[0]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::UnknownRuleType { ref rule_type } if &**rule_type == "Missing"
        ));
    }

    #[test]
    fn factory_errors_name_the_rule() {
        let reg = RuleRegistry::new();
        reg.register_fn("MaxLength", max_length);
        let m = manifest_with(RuleDefinition::new("MaxLength").named("email"));
        let err = reg.create(&m.rules()[0]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot create rule MaxLength<Customer>[email]: \
             invalid rule configuration: `max` must be an integer"
        );
    }

    #[test]
    fn register_replaces_and_remove() {
        let reg = RuleRegistry::new();
        reg.register_instance("A", RuleLogic::value(MaxLength(1)));
        reg.register_instance("A", RuleLogic::value(MaxLength(2)));
        assert_eq!(reg.len(), 1);
        assert!(reg.remove("A").is_some());
        assert!(reg.is_empty());
    }
}
