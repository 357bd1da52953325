//! Runs one rule's logic with panic containment, timeout and timing.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::identifier::RuleIdentifier;
use crate::instantiate::ExecutableRule;
use crate::result::{RuleInstrumentation, RuleResult};
use crate::rule::{RuleContext, RuleError, RuleLogic, RuleOutput};
use crate::value::{ValidatedValue, ValueId, ValueTree};

/// Everything needed to invoke one rule, detached from the plan so it can
/// move into a spawned task.
pub(crate) struct RuleInvocation {
    index: usize,
    identifier: RuleIdentifier,
    logic: RuleLogic,
    value: ValueId,
    tree: Arc<ValueTree>,
    cancellation: CancellationToken,
}

impl RuleInvocation {
    /// Prepare `rule` for invocation. The rule gets a child of the run's
    /// token so a timeout cancels only this rule.
    pub(crate) fn new(
        rule: &ExecutableRule,
        tree: Arc<ValueTree>,
        run: &CancellationToken,
    ) -> Self {
        Self {
            index: rule.index,
            identifier: rule.identifier.clone(),
            logic: rule.logic.clone(),
            value: rule.value,
            tree,
            cancellation: run.child_token(),
        }
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    /// Invoke the rule. Never fails: errors, panics and timeouts all become
    /// [`RuleOutcome::Errored`](crate::RuleOutcome::Errored) results.
    pub(crate) async fn run(
        self,
        parallel: bool,
        instrument: bool,
    ) -> (RuleResult, Option<RuleInstrumentation>) {
        let started = Instant::now();
        let output = self.invoke().await;
        let elapsed = started.elapsed();

        match &output {
            Ok(out) => tracing::debug!(
                rule = %self.identifier,
                passed = out.passed,
                elapsed_ms = elapsed.as_millis(),
                parallel,
                "rule completed"
            ),
            Err(err) => tracing::warn!(
                rule = %self.identifier,
                error = %err,
                elapsed_ms = elapsed.as_millis(),
                parallel,
                "rule errored"
            ),
        }

        let instrumentation = instrument.then_some(RuleInstrumentation { elapsed, parallel });
        (RuleResult::from_output(output), instrumentation)
    }

    async fn invoke(&self) -> Result<RuleOutput, RuleError> {
        let value = self.tree.get(self.value).ok_or_else(|| {
            RuleError::logic(format!("{} is not part of the value tree", self.value))
        })?;
        let parent = self.tree.logical_parent(self.value).map(ValidatedValue::value);
        let ctx = RuleContext::new(
            self.identifier.clone(),
            self.logic.interface(),
            Arc::clone(&self.tree),
            self.value,
            self.cancellation.clone(),
        );

        let call = AssertUnwindSafe(self.logic.invoke(value.value(), parent, &ctx)).catch_unwind();
        let caught = match self.logic.timeout() {
            Some(limit) => {
                if let Ok(caught) = tokio::time::timeout(limit, call).await {
                    caught
                } else {
                    self.cancellation.cancel();
                    return Err(RuleError::Timeout(limit));
                }
            }
            None => call.await,
        };
        caught.unwrap_or_else(|payload| Err(RuleError::Panicked(panic_message(payload.as_ref()))))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialize::materialize;
    use crate::result::RuleOutcome;
    use crate::rule::{ParentRule, ValueRule};
    use serde_json::{Value, json};
    use std::time::Duration;
    use verdict_manifest::{
        AccessorExceptionBehavior, IdentityAccessor, Manifest, RuleDefinition, RuleKey,
    };

    struct Sleepy(Duration);

    #[async_trait::async_trait]
    impl ValueRule for Sleepy {
        async fn validate(
            &self,
            _value: &Value,
            ctx: &RuleContext,
        ) -> Result<RuleOutput, RuleError> {
            tokio::select! {
                () = tokio::time::sleep(self.0) => Ok(RuleOutput::pass()),
                () = ctx.cancellation().cancelled() => Err(RuleError::Cancelled),
            }
        }

        fn timeout(&self) -> Option<Duration> {
            Some(Duration::from_millis(100))
        }
    }

    struct Panics;

    #[async_trait::async_trait]
    impl ValueRule for Panics {
        async fn validate(
            &self,
            _value: &Value,
            _ctx: &RuleContext,
        ) -> Result<RuleOutput, RuleError> {
            panic!("rule blew up");
        }
    }

    /// Reports the parent it was handed and the identities of its ancestors.
    struct Inspect;

    #[async_trait::async_trait]
    impl ParentRule for Inspect {
        async fn validate(
            &self,
            _value: &Value,
            parent: Option<&Value>,
            ctx: &RuleContext,
        ) -> Result<RuleOutput, RuleError> {
            let ancestors: Vec<Value> = ctx
                .ancestors()
                .map(|a| a.identity.map_or(Value::Null, |id| json!(id.as_str())))
                .collect();
            Ok(RuleOutput::pass()
                .with_data("parent", parent.cloned().unwrap_or(Value::Null))
                .with_data("ancestors", Value::Array(ancestors))
                .with_data("order", json!(ctx.arrival_order())))
        }
    }

    fn invocation(logic: RuleLogic, tree: Arc<ValueTree>, value: ValueId) -> RuleInvocation {
        let mut m = Manifest::new("T");
        let definition = m.add_rule(m.root(), RuleDefinition::new("R")).unwrap();
        let rule = ExecutableRule {
            index: 0,
            identifier: RuleIdentifier::new(RuleKey::new("R", "T"), None),
            definition,
            value,
            logic,
            dependencies: Vec::new(),
            unsatisfiable: false,
        };
        RuleInvocation::new(&rule, tree, &CancellationToken::new())
    }

    fn single_value() -> Arc<ValueTree> {
        let manifest = Manifest::new("T");
        let tree = materialize(&manifest, json!({}), AccessorExceptionBehavior::Propagate).unwrap();
        Arc::new(tree)
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_becomes_errored_and_cancels_the_rule() {
        let tree = single_value();
        let run = invocation(RuleLogic::value(Sleepy(Duration::from_secs(5))), tree, ValueId(0));
        let token = run.cancellation.clone();
        let (result, timing) = run.run(false, true).await;
        assert_eq!(result.outcome(), RuleOutcome::Errored);
        assert_eq!(result.error(), Some(&RuleError::Timeout(Duration::from_millis(100))));
        assert!(token.is_cancelled());
        assert!(timing.is_some_and(|t| t.elapsed >= Duration::from_millis(100) && !t.parallel));
    }

    #[tokio::test(start_paused = true)]
    async fn finishing_within_the_timeout_passes() {
        let run = invocation(
            RuleLogic::value(Sleepy(Duration::from_millis(40))),
            single_value(),
            ValueId(0),
        );
        let (result, timing) = run.run(true, false).await;
        assert!(result.is_passed());
        assert!(timing.is_none());
    }

    #[tokio::test]
    async fn panic_becomes_errored() {
        let run = invocation(RuleLogic::value(Panics), single_value(), ValueId(0));
        let (result, _) = run.run(false, false).await;
        assert_eq!(result.outcome(), RuleOutcome::Errored);
        assert_eq!(result.error(), Some(&RuleError::Panicked("rule blew up".into())));
    }

    #[tokio::test]
    async fn collection_item_sees_owner_as_parent() {
        let mut m = Manifest::new("Order");
        let root = m.root();
        m.with_identity(root, IdentityAccessor::field("id")).unwrap();
        let lines = m.add_member(root, "lines", "Vec<Line>").unwrap();
        m.set_collection_item(lines, "Line").unwrap();
        let tree = Arc::new(
            materialize(
                &m,
                json!({"id": "o-1", "lines": [1, 2]}),
                AccessorExceptionBehavior::Propagate,
            )
            .unwrap(),
        );
        let second = tree.iter().last().unwrap().id();

        let (result, _) = invocation(RuleLogic::with_parent(Inspect), tree, second)
            .run(false, false)
            .await;
        assert_eq!(result.data()["parent"], json!({"id": "o-1", "lines": [1, 2]}));
        assert_eq!(result.data()["ancestors"], json!([null, "o-1"]));
        assert_eq!(result.data()["order"], json!(1));
    }
}
