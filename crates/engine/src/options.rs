//! Per-run validation options.

use serde::{Deserialize, Serialize};
use verdict_manifest::AccessorExceptionBehavior;

use crate::error::EngineError;
use crate::result::{RuleOutcome, ValidationResult};

/// Options for one validation run.
///
/// Every field has a default, so partial JSON documents load:
///
/// ```rust,ignore
/// let options = ValidationOptions::from_json(r#"{"enable_parallelization": false}"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOptions {
    /// Run parallel-safe rules concurrently within a wave.
    #[serde(default = "default_true")]
    pub enable_parallelization: bool,
    /// Record per-rule elapsed time and phase.
    #[serde(default)]
    pub instrument_execution: bool,
    /// What to do when a member accessor or enumerator fails.
    #[serde(default)]
    pub accessor_exception_behavior: AccessorExceptionBehavior,
    /// Maximum number of rules running at once in a parallel phase.
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,
    /// Whether a completed run with non-passing results is reported as an error.
    #[serde(default)]
    pub rejection_policy: RejectionPolicy,
}

fn default_true() -> bool {
    true
}

fn default_max_parallelism() -> usize {
    16
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            enable_parallelization: true,
            instrument_execution: false,
            accessor_exception_behavior: AccessorExceptionBehavior::default(),
            max_parallelism: default_max_parallelism(),
            rejection_policy: RejectionPolicy::default(),
        }
    }
}

impl ValidationOptions {
    /// Parse options from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Enable or disable the parallel phase.
    #[must_use]
    pub fn with_parallelization(mut self, enabled: bool) -> Self {
        self.enable_parallelization = enabled;
        self
    }

    /// Enable or disable per-rule instrumentation.
    #[must_use]
    pub fn with_instrumentation(mut self, enabled: bool) -> Self {
        self.instrument_execution = enabled;
        self
    }

    /// Set the global accessor-exception behavior.
    #[must_use]
    pub fn with_accessor_exception_behavior(mut self, behavior: AccessorExceptionBehavior) -> Self {
        self.accessor_exception_behavior = behavior;
        self
    }

    /// Bound the parallel phase.
    #[must_use]
    pub fn with_max_parallelism(mut self, max: usize) -> Self {
        self.max_parallelism = max;
        self
    }

    /// Set the rejection policy.
    #[must_use]
    pub fn with_rejection_policy(mut self, policy: RejectionPolicy) -> Self {
        self.rejection_policy = policy;
        self
    }

    /// Parallel permits actually used; at least one.
    #[must_use]
    pub fn effective_parallelism(&self) -> usize {
        self.max_parallelism.max(1)
    }
}

/// When a completed run is turned into [`EngineError::Rejected`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionPolicy {
    /// Always return the result set.
    #[default]
    Never,
    /// Reject if any rule is [`RuleOutcome::Errored`].
    OnError,
    /// Reject if any rule did not pass.
    OnAnyFailure,
}

impl RejectionPolicy {
    /// Whether `result` is rejected under this policy.
    #[must_use]
    pub fn rejects(self, result: &ValidationResult) -> bool {
        match self {
            Self::Never => false,
            Self::OnError => result.outcome_count(RuleOutcome::Errored) > 0,
            Self::OnAnyFailure => !result.passed(),
        }
    }
}
