//! Rule-logic contracts and the adapter the engine invokes.
//!
//! Rules come in two shapes: [`ValueRule`] validates a value on its own,
//! [`ParentRule`] also sees the value's parent. [`RuleLogic`] wraps either
//! behind one invocation signature; the variant is chosen when the rule is
//! created.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use verdict_manifest::ObjectIdentity;

use crate::identifier::RuleIdentifier;
use crate::value::{ValueId, ValueTree};

/// What rule logic reports when it completes normally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleOutput {
    /// Whether the value passed.
    pub passed: bool,
    /// Arbitrary data for downstream consumers (e.g. message formatting).
    #[serde(default)]
    pub data: serde_json::Map<String, Value>,
}

impl RuleOutput {
    /// A passing output with no data.
    #[must_use]
    pub fn pass() -> Self {
        Self::from_bool(true)
    }

    /// A failing output with no data.
    #[must_use]
    pub fn fail() -> Self {
        Self::from_bool(false)
    }

    /// Pass iff `passed`.
    #[must_use]
    pub fn from_bool(passed: bool) -> Self {
        Self {
            passed,
            data: serde_json::Map::new(),
        }
    }

    /// Attach one data entry.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

/// Why a rule could not produce an output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RuleError {
    /// The rule logic reported an error.
    #[error("{0}")]
    Logic(String),

    /// The rule did not finish within its declared timeout.
    #[error("rule timed out after {0:?}")]
    Timeout(Duration),

    /// The rule logic panicked.
    #[error("rule panicked: {0}")]
    Panicked(String),

    /// The rule observed the run's cancellation signal.
    #[error("rule cancelled")]
    Cancelled,

    /// The rule's configuration was rejected when it was created.
    #[error("invalid rule configuration: {0}")]
    Configuration(String),
}

impl RuleError {
    /// Shorthand for [`RuleError::Logic`].
    pub fn logic(message: impl Into<String>) -> Self {
        Self::Logic(message.into())
    }

    /// Whether the rule was stopped by its timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Which contract a rule implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleInterface {
    /// [`ValueRule`].
    Value,
    /// [`ParentRule`].
    WithParent,
}

/// A rule that validates a value on its own.
#[async_trait]
pub trait ValueRule: Send + Sync {
    /// Validate `value`.
    async fn validate(&self, value: &Value, ctx: &RuleContext) -> Result<RuleOutput, RuleError>;

    /// Maximum time the engine waits for [`validate`](Self::validate).
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Whether instances may run concurrently with other rules.
    fn is_parallel_safe(&self) -> bool {
        false
    }
}

/// A rule that validates a value together with its parent.
#[async_trait]
pub trait ParentRule: Send + Sync {
    /// Validate `value`; `parent` is `None` for the root object.
    async fn validate(
        &self,
        value: &Value,
        parent: Option<&Value>,
        ctx: &RuleContext,
    ) -> Result<RuleOutput, RuleError>;

    /// Maximum time the engine waits for [`validate`](Self::validate).
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Whether instances may run concurrently with other rules.
    fn is_parallel_safe(&self) -> bool {
        false
    }
}

/// A callable rule instance, whichever contract it implements.
#[derive(Clone)]
pub enum RuleLogic {
    /// Validates the value alone.
    Value(Arc<dyn ValueRule>),
    /// Validates the value and its parent.
    WithParent(Arc<dyn ParentRule>),
}

impl RuleLogic {
    /// Wrap a [`ValueRule`].
    pub fn value<R: ValueRule + 'static>(rule: R) -> Self {
        Self::Value(Arc::new(rule))
    }

    /// Wrap a [`ParentRule`].
    pub fn with_parent<R: ParentRule + 'static>(rule: R) -> Self {
        Self::WithParent(Arc::new(rule))
    }

    /// The contract this logic implements.
    #[must_use]
    pub fn interface(&self) -> RuleInterface {
        match self {
            Self::Value(_) => RuleInterface::Value,
            Self::WithParent(_) => RuleInterface::WithParent,
        }
    }

    /// Declared timeout, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            Self::Value(rule) => rule.timeout(),
            Self::WithParent(rule) => rule.timeout(),
        }
    }

    /// Whether the rule may join a wave's parallel phase.
    #[must_use]
    pub fn is_parallel_safe(&self) -> bool {
        match self {
            Self::Value(rule) => rule.is_parallel_safe(),
            Self::WithParent(rule) => rule.is_parallel_safe(),
        }
    }

    /// Run the logic. `parent` is ignored by value-only rules.
    pub async fn invoke(
        &self,
        value: &Value,
        parent: Option<&Value>,
        ctx: &RuleContext,
    ) -> Result<RuleOutput, RuleError> {
        match self {
            Self::Value(rule) => rule.validate(value, ctx).await,
            Self::WithParent(rule) => rule.validate(value, parent, ctx).await,
        }
    }
}

impl fmt::Debug for RuleLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RuleLogic").field(&self.interface()).finish()
    }
}

/// One ancestor of the validated value.
#[derive(Debug, Clone, Copy)]
pub struct Ancestor<'a> {
    /// The ancestor's object identity.
    pub identity: Option<&'a ObjectIdentity>,
    /// The ancestor's actual value.
    pub value: &'a Value,
}

/// Read-only context handed to every rule invocation.
///
/// Long-running rules should call [`check_cancelled`](Self::check_cancelled)
/// or await [`cancellation`](Self::cancellation) to stop promptly when the
/// run is cancelled or the rule times out.
#[derive(Debug, Clone)]
pub struct RuleContext {
    identifier: RuleIdentifier,
    interface: RuleInterface,
    tree: Arc<ValueTree>,
    value: ValueId,
    cancellation: CancellationToken,
}

impl RuleContext {
    pub(crate) fn new(
        identifier: RuleIdentifier,
        interface: RuleInterface,
        tree: Arc<ValueTree>,
        value: ValueId,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            identifier,
            interface,
            tree,
            value,
            cancellation,
        }
    }

    /// The executing rule's identifier.
    #[must_use]
    pub fn identifier(&self) -> &RuleIdentifier {
        &self.identifier
    }

    /// The contract the rule was invoked through.
    #[must_use]
    pub fn interface(&self) -> RuleInterface {
        self.interface
    }

    /// Ancestors of the validated value, closest first.
    pub fn ancestors(&self) -> impl Iterator<Item = Ancestor<'_>> {
        self.tree.ancestors(self.value).map(|v| Ancestor {
            identity: v.identity(),
            value: v.value(),
        })
    }

    /// Position of the value within its collection, for collection items.
    #[must_use]
    pub fn arrival_order(&self) -> Option<usize> {
        self.tree.get(self.value).and_then(|v| v.arrival_order())
    }

    /// Signal fired when the run is cancelled or the rule times out.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Return [`RuleError::Cancelled`] once cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<(), RuleError> {
        if self.cancellation.is_cancelled() {
            Err(RuleError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct IsString;

    #[async_trait]
    impl ValueRule for IsString {
        async fn validate(
            &self,
            value: &Value,
            _ctx: &RuleContext,
        ) -> Result<RuleOutput, RuleError> {
            Ok(RuleOutput::from_bool(value.is_string()))
        }
    }

    struct SameAsParentName;

    #[async_trait]
    impl ParentRule for SameAsParentName {
        async fn validate(
            &self,
            value: &Value,
            parent: Option<&Value>,
            _ctx: &RuleContext,
        ) -> Result<RuleOutput, RuleError> {
            let parent = parent.ok_or_else(|| RuleError::logic("no parent"))?;
            Ok(RuleOutput::from_bool(parent.get("name") == Some(value)))
        }

        fn timeout(&self) -> Option<Duration> {
            Some(Duration::from_secs(1))
        }

        fn is_parallel_safe(&self) -> bool {
            true
        }
    }

    fn context() -> RuleContext {
        let tree = Arc::new(ValueTree { values: Vec::new() });
        RuleContext::new(
            RuleIdentifier::new(verdict_manifest::RuleKey::new("T", "V"), None),
            RuleInterface::Value,
            tree,
            ValueId(0),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn adapter_dispatches_by_contract() {
        let ctx = context();
        let value_rule = RuleLogic::value(IsString);
        assert_eq!(value_rule.interface(), RuleInterface::Value);
        assert!(!value_rule.is_parallel_safe());
        assert_eq!(value_rule.timeout(), None);
        let out = value_rule.invoke(&json!("x"), None, &ctx).await.unwrap();
        assert!(out.passed);

        let parent_rule = RuleLogic::with_parent(SameAsParentName);
        assert_eq!(parent_rule.interface(), RuleInterface::WithParent);
        assert!(parent_rule.is_parallel_safe());
        assert_eq!(parent_rule.timeout(), Some(Duration::from_secs(1)));
        let parent = json!({"name": "x"});
        let out = parent_rule.invoke(&json!("x"), Some(&parent), &ctx).await.unwrap();
        assert!(out.passed);
        let err = parent_rule.invoke(&json!("x"), None, &ctx).await.unwrap_err();
        assert_eq!(err, RuleError::logic("no parent"));
    }

    #[test]
    fn check_cancelled_follows_token() {
        let ctx = context();
        assert!(ctx.check_cancelled().is_ok());
        ctx.cancellation().cancel();
        assert_eq!(ctx.check_cancelled(), Err(RuleError::Cancelled));
    }

    #[test]
    fn output_builders() {
        let out = RuleOutput::fail().with_data("min", json!(3));
        assert!(!out.passed);
        assert_eq!(out.data.get("min"), Some(&json!(3)));
        assert!(RuleOutput::pass().passed);
    }
}
