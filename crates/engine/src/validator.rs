//! The validation entry point.

use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use verdict_manifest::Manifest;

use crate::error::EngineError;
use crate::options::ValidationOptions;
use crate::plan::ExecutionPlan;
use crate::registry::RuleRegistry;
use crate::result::{ResultAggregator, ValidationResult};
use crate::scheduler::Scheduler;

/// Validates root objects against one manifest.
///
/// Cheap to clone; the manifest and registry are shared.
#[derive(Debug, Clone)]
pub struct Validator {
    manifest: Arc<Manifest>,
    registry: Arc<RuleRegistry>,
}

impl Validator {
    /// Create a validator for `manifest`, resolving rule types via `registry`.
    pub fn new(manifest: impl Into<Arc<Manifest>>, registry: Arc<RuleRegistry>) -> Self {
        Self {
            manifest: manifest.into(),
            registry,
        }
    }

    /// The manifest.
    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// The rule registry.
    #[must_use]
    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Build the execution plan for `root` without running any rule.
    pub fn prepare(
        &self,
        root: Value,
        options: &ValidationOptions,
    ) -> Result<ExecutionPlan, EngineError> {
        ExecutionPlan::prepare(
            &self.manifest,
            &self.registry,
            root,
            options.accessor_exception_behavior,
        )
    }

    /// Validate `root`.
    pub async fn validate(
        &self,
        root: Value,
        options: &ValidationOptions,
    ) -> Result<ValidationResult, EngineError> {
        self.validate_with_cancellation(root, options, CancellationToken::new())
            .await
    }

    /// Validate `root`, stopping early once `cancellation` fires.
    ///
    /// Configuration errors are returned before any rule runs. Once the run
    /// completes, [`ValidationOptions::rejection_policy`] decides whether
    /// non-passing results are returned as [`EngineError::Rejected`].
    pub async fn validate_with_cancellation(
        &self,
        root: Value,
        options: &ValidationOptions,
        cancellation: CancellationToken,
    ) -> Result<ValidationResult, EngineError> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();

        let plan = self.prepare(root, options).inspect_err(|err| {
            tracing::error!(%run_id, error = %err, "validation could not start");
        })?;
        tracing::info!(
            %run_id,
            values = plan.tree.len(),
            rules = plan.rules.len(),
            edges = plan.edge_count(),
            parallel = options.enable_parallelization,
            "validation started"
        );

        let results = Arc::new(ResultAggregator::new());
        Scheduler {
            rules: &plan.rules,
            tree: Arc::clone(&plan.tree),
            options,
            cancellation,
            results: Arc::clone(&results),
        }
        .run()
        .await?;

        let result = results.finish(
            run_id,
            plan.rules
                .iter()
                .map(|rule| (rule.identifier.clone(), rule.value)),
            started.elapsed(),
            plan.tree,
        );
        tracing::info!(
            %run_id,
            rules = result.len(),
            failures = result.failures().count(),
            passed = result.passed(),
            elapsed_ms = result.duration().as_millis(),
            "validation finished"
        );

        if options.rejection_policy.rejects(&result) {
            tracing::warn!(%run_id, policy = ?options.rejection_policy, "validation rejected");
            return Err(EngineError::Rejected(Box::new(result)));
        }
        Ok(result)
    }
}
