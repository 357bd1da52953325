//! Rule results and the run's aggregated result set.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;
use verdict_manifest::ObjectIdentity;

use crate::identifier::RuleIdentifier;
use crate::rule::{RuleError, RuleOutput};
use crate::value::{ValueId, ValueTree};

/// Final outcome of one executable rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOutcome {
    /// The rule ran and the value passed.
    Passed,
    /// The rule ran and the value failed.
    Failed,
    /// A dependency did not pass; the rule's logic never ran.
    DependencyFailed,
    /// The rule's logic raised an error, panicked or timed out.
    Errored,
}

impl fmt::Display for RuleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::DependencyFailed => "dependency failed",
            Self::Errored => "errored",
        })
    }
}

/// Result of one executable rule: an outcome, arbitrary data and, only
/// for [`RuleOutcome::Errored`], the error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleResult {
    outcome: RuleOutcome,
    data: serde_json::Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RuleError>,
}

impl RuleResult {
    fn new(
        outcome: RuleOutcome,
        data: serde_json::Map<String, Value>,
        error: Option<RuleError>,
    ) -> Self {
        Self {
            outcome,
            data,
            error,
        }
    }

    /// A passing result.
    #[must_use]
    pub fn passed() -> Self {
        Self::new(RuleOutcome::Passed, serde_json::Map::new(), None)
    }

    /// A failing result.
    #[must_use]
    pub fn failed() -> Self {
        Self::new(RuleOutcome::Failed, serde_json::Map::new(), None)
    }

    /// A result for a rule whose dependency did not pass.
    #[must_use]
    pub fn dependency_failed() -> Self {
        Self::new(RuleOutcome::DependencyFailed, serde_json::Map::new(), None)
    }

    /// A result carrying the rule's error.
    #[must_use]
    pub fn errored(error: RuleError) -> Self {
        Self::new(RuleOutcome::Errored, serde_json::Map::new(), Some(error))
    }

    /// Convert what the rule logic returned.
    #[must_use]
    pub fn from_output(output: Result<RuleOutput, RuleError>) -> Self {
        match output {
            Ok(RuleOutput { passed, data }) => {
                let outcome = if passed {
                    RuleOutcome::Passed
                } else {
                    RuleOutcome::Failed
                };
                Self::new(outcome, data, None)
            }
            Err(error) => Self::errored(error),
        }
    }

    /// The outcome.
    #[must_use]
    pub fn outcome(&self) -> RuleOutcome {
        self.outcome
    }

    /// Whether the outcome is [`RuleOutcome::Passed`].
    #[must_use]
    pub fn is_passed(&self) -> bool {
        self.outcome == RuleOutcome::Passed
    }

    /// Data reported by the rule.
    #[must_use]
    pub fn data(&self) -> &serde_json::Map<String, Value> {
        &self.data
    }

    /// The error; present iff the outcome is [`RuleOutcome::Errored`].
    #[must_use]
    pub fn error(&self) -> Option<&RuleError> {
        self.error.as_ref()
    }
}

/// Per-rule execution measurements, recorded when instrumentation is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuleInstrumentation {
    /// Wall-clock time spent in the rule's logic.
    pub elapsed: Duration,
    /// Whether the rule ran in its wave's parallel phase.
    pub parallel: bool,
}

/// One rule's result paired with its identifier.
#[derive(Debug, Clone, Serialize)]
pub struct RuleResultEntry {
    /// The executed rule.
    pub identifier: RuleIdentifier,
    /// The value the rule validated.
    pub value: ValueId,
    /// The rule's result.
    pub result: RuleResult,
    /// Timing data, if instrumentation was enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrumentation: Option<RuleInstrumentation>,
}

/// All results of one validation run, in rule instantiation order.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    run_id: Uuid,
    entries: Vec<RuleResultEntry>,
    duration: Duration,
    #[serde(skip)]
    values: Arc<ValueTree>,
}

impl ValidationResult {
    /// Unique id of the run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Whether every rule passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.entries.iter().all(|e| e.result.is_passed())
    }

    /// Number of results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no rule was executed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, in instantiation order.
    #[must_use]
    pub fn entries(&self) -> &[RuleResultEntry] {
        &self.entries
    }

    /// Iterate over entries.
    pub fn iter(&self) -> impl Iterator<Item = &RuleResultEntry> {
        self.entries.iter()
    }

    /// Number of results with `outcome`.
    #[must_use]
    pub fn outcome_count(&self, outcome: RuleOutcome) -> usize {
        self.entries
            .iter()
            .filter(|e| e.result.outcome() == outcome)
            .count()
    }

    /// Entries that did not pass.
    pub fn failures(&self) -> impl Iterator<Item = &RuleResultEntry> {
        self.entries.iter().filter(|e| !e.result.is_passed())
    }

    /// Entries for rules bound to objects with `identity`.
    pub fn by_identity<'a>(
        &'a self,
        identity: &'a ObjectIdentity,
    ) -> impl Iterator<Item = &'a RuleResultEntry> {
        self.entries
            .iter()
            .filter(move |e| e.identifier.identity.as_ref() == Some(identity))
    }

    /// The first entry with `identifier`.
    #[must_use]
    pub fn get(&self, identifier: &RuleIdentifier) -> Option<&RuleResultEntry> {
        self.entries.iter().find(|e| &e.identifier == identifier)
    }

    /// Wall-clock time of the whole run, materialization included.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// The value tree the rules ran against.
    #[must_use]
    pub fn values(&self) -> &ValueTree {
        &self.values
    }
}

impl<'a> IntoIterator for &'a ValidationResult {
    type Item = &'a RuleResultEntry;
    type IntoIter = std::slice::Iter<'a, RuleResultEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Collects rule results while a run executes.
///
/// Written concurrently by every task of a wave's parallel phase. Each rule
/// index is written at most once; later writes are ignored.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    results: DashMap<usize, (RuleResult, Option<RuleInstrumentation>)>,
}

impl ResultAggregator {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of rule `index`. Returns `false` if it already had one.
    pub fn record(
        &self,
        index: usize,
        result: RuleResult,
        instrumentation: Option<RuleInstrumentation>,
    ) -> bool {
        match self.results.entry(index) {
            Entry::Vacant(slot) => {
                slot.insert((result, instrumentation));
                true
            }
            Entry::Occupied(_) => {
                tracing::warn!(rule = index, "ignoring second result for rule");
                false
            }
        }
    }

    /// Whether rule `index` has a result.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.results.contains_key(&index)
    }

    /// Outcome of rule `index`, if it has run.
    #[must_use]
    pub fn outcome(&self, index: usize) -> Option<RuleOutcome> {
        self.results.get(&index).map(|r| r.0.outcome())
    }

    /// Number of recorded results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Assemble the final result set, ordered by rule index.
    pub(crate) fn finish(
        &self,
        run_id: Uuid,
        identifiers: impl IntoIterator<Item = (RuleIdentifier, ValueId)>,
        duration: Duration,
        values: Arc<ValueTree>,
    ) -> ValidationResult {
        let entries = identifiers
            .into_iter()
            .enumerate()
            .filter_map(|(index, (identifier, value))| {
                let (_, (result, instrumentation)) = self.results.remove(&index)?;
                Some(RuleResultEntry {
                    identifier,
                    value,
                    result,
                    instrumentation,
                })
            })
            .collect();
        ValidationResult {
            run_id,
            entries,
            duration,
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;
    use verdict_manifest::RuleKey;

    #[rstest]
    #[case(Ok(RuleOutput::pass()), RuleOutcome::Passed)]
    #[case(Ok(RuleOutput::fail()), RuleOutcome::Failed)]
    #[case(Err(RuleError::logic("boom")), RuleOutcome::Errored)]
    #[case(Err(RuleError::Timeout(Duration::from_millis(5))), RuleOutcome::Errored)]
    fn outcome_from_output(
        #[case] output: Result<RuleOutput, RuleError>,
        #[case] expected: RuleOutcome,
    ) {
        let result = RuleResult::from_output(output);
        assert_eq!(result.outcome(), expected);
        assert_eq!(result.error().is_some(), expected == RuleOutcome::Errored);
    }

    #[test]
    fn output_data_is_kept() {
        let result = RuleResult::from_output(Ok(RuleOutput::fail().with_data("max", json!(10))));
        assert_eq!(result.data().get("max"), Some(&json!(10)));
    }

    #[test]
    fn aggregator_is_write_once() {
        let agg = ResultAggregator::new();
        assert!(agg.record(0, RuleResult::failed(), None));
        assert!(!agg.record(0, RuleResult::passed(), None));
        assert_eq!(agg.outcome(0), Some(RuleOutcome::Failed));
        assert!(!agg.contains(1));
    }

    #[test]
    fn finished_result_is_ordered_and_summarized() {
        let agg = ResultAggregator::new();
        agg.record(1, RuleResult::errored(RuleError::logic("x")), None);
        agg.record(0, RuleResult::passed(), None);
        let id = |t: &str, identity: &str| {
            (
                RuleIdentifier::new(RuleKey::new(t, "Line"), Some(identity.into())),
                ValueId(0),
            )
        };
        let result = agg.finish(
            Uuid::new_v4(),
            vec![id("A", "l-1"), id("B", "l-2")],
            Duration::ZERO,
            Arc::new(ValueTree { values: Vec::new() }),
        );

        assert_eq!(result.len(), 2);
        assert!(!result.passed());
        assert_eq!(result.entries()[0].identifier.rule_type(), "A");
        assert_eq!(result.outcome_count(RuleOutcome::Errored), 1);
        assert_eq!(result.failures().count(), 1);
        assert_eq!(result.by_identity(&"l-2".into()).count(), 1);
    }

    #[test]
    fn serializes_outcome_snake_case() {
        let json = serde_json::to_value(RuleResult::dependency_failed()).unwrap();
        assert_eq!(json, json!({"outcome": "dependency_failed", "data": {}}));
        let json = serde_json::to_value(RuleResult::errored(RuleError::logic("boom"))).unwrap();
        assert_eq!(
            json,
            json!({"outcome": "errored", "data": {}, "error": {"kind": "logic", "detail": "boom"}})
        );
    }
}
