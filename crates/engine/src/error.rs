//! Engine error types.

use std::sync::Arc;

use verdict_manifest::{AccessorError, ItemId, ManifestError, RuleKey};

use crate::identifier::RuleIdentifier;
use crate::result::ValidationResult;
use crate::rule::RuleError;

/// Errors that abort a validation run.
///
/// Configuration errors ([`is_configuration`](Self::is_configuration)) are
/// detected before any rule executes. Failures of individual rules never
/// show up here; they become [`RuleOutcome::Errored`](crate::RuleOutcome::Errored)
/// results instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The manifest is malformed.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// A member accessor or enumerator failed under the
    /// [`Propagate`](verdict_manifest::AccessorExceptionBehavior::Propagate)
    /// behaviour.
    #[error("cannot read value for {item}: {source}")]
    Accessor {
        /// The item whose value could not be read.
        item: ItemId,
        /// The accessor failure.
        source: AccessorError,
    },

    /// No factory is registered for a rule type used by the manifest.
    #[error("no rule registered for type `{rule_type}`")]
    UnknownRuleType {
        /// The unregistered rule type.
        rule_type: Arc<str>,
    },

    /// A rule factory refused the rule's configuration.
    #[error("cannot create rule {rule}: {source}")]
    RuleConstruction {
        /// The rule that could not be created.
        rule: RuleKey,
        /// Why the factory failed.
        source: RuleError,
    },

    /// A structural dependency reference walks above the root of the value tree.
    #[error("dependency of {rule} on {target} at {target_item} has no ancestor to resolve against")]
    UnresolvableDependency {
        /// The dependent rule.
        rule: RuleIdentifier,
        /// Item the dependency points at.
        target_item: ItemId,
        /// Rule the dependency names.
        target: RuleKey,
    },

    /// The instance-level dependency graph contains a cycle.
    #[error("circular dependency between rules: {}", join_identifiers(.rules))]
    CircularDependency {
        /// Rules on the cycle.
        rules: Vec<RuleIdentifier>,
    },

    /// The scheduler found no runnable rule while rules were still pending.
    #[error("scheduler stalled with {pending} rules pending")]
    Stalled {
        /// Rules that never became ready.
        pending: usize,
    },

    /// The run's cancellation token fired.
    #[error("validation cancelled after {completed} rules completed")]
    Cancelled {
        /// Rules that had a result when the run stopped.
        completed: usize,
    },

    /// A rule task ended without producing a result.
    #[error("rule task failed: {0}")]
    TaskFailed(String),

    /// The run finished but its results trip the configured
    /// [`RejectionPolicy`](crate::RejectionPolicy).
    #[error("validation rejected: {} of {} rules did not pass", .0.failures().count(), .0.len())]
    Rejected(Box<ValidationResult>),

    /// Options could not be parsed.
    #[error("invalid options: {0}")]
    Options(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether this is a configuration error, reported before any rule ran.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Manifest(_)
                | Self::UnknownRuleType { .. }
                | Self::RuleConstruction { .. }
                | Self::UnresolvableDependency { .. }
                | Self::CircularDependency { .. }
        )
    }
}

fn join_identifiers(rules: &[RuleIdentifier]) -> String {
    rules
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_rule_type_display() {
        let err = EngineError::UnknownRuleType {
            rule_type: "NotNull".into(),
        };
        assert_eq!(err.to_string(), "no rule registered for type `NotNull`");
        assert!(err.is_configuration());
    }

    #[test]
    fn cancelled_display() {
        let err = EngineError::Cancelled { completed: 3 };
        assert_eq!(err.to_string(), "validation cancelled after 3 rules completed");
        assert!(!err.is_configuration());
    }

    #[test]
    fn circular_dependency_lists_rules() {
        let a = RuleIdentifier::new(RuleKey::new("A", "T"), None);
        let b = RuleIdentifier::new(RuleKey::new("B", "T"), None);
        let err = EngineError::CircularDependency { rules: vec![a, b] };
        assert_eq!(
            err.to_string(),
            "circular dependency between rules: A<T> -> B<T>"
        );
        assert!(err.is_configuration());
    }

    #[test]
    fn manifest_errors_convert() {
        let root = verdict_manifest::Manifest::new("T").root();
        let err: EngineError = ManifestError::UnknownItem(root).into();
        assert!(matches!(err, EngineError::Manifest(_)));
    }
}
