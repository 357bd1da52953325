//! Wave scheduler: runs ready rules in a parallel phase followed by a serial
//! phase until every rule has a result.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::instantiate::ExecutableRule;
use crate::invoker::RuleInvocation;
use crate::options::ValidationOptions;
use crate::result::{ResultAggregator, RuleOutcome, RuleResult};
use crate::value::ValueTree;

/// Drives one run's rules to completion, writing into `results`.
pub(crate) struct Scheduler<'a> {
    pub(crate) rules: &'a [ExecutableRule],
    pub(crate) tree: Arc<ValueTree>,
    pub(crate) options: &'a ValidationOptions,
    pub(crate) cancellation: CancellationToken,
    pub(crate) results: Arc<ResultAggregator>,
}

impl Scheduler<'_> {
    /// Run waves until every rule has a result.
    ///
    /// Returns [`EngineError::Cancelled`] once the run's token fires, and
    /// [`EngineError::Stalled`] if pending rules can never become ready.
    pub(crate) async fn run(&self) -> Result<(), EngineError> {
        let semaphore = Arc::new(Semaphore::new(self.options.effective_parallelism()));
        let mut pending: Vec<usize> = (0..self.rules.len()).collect();
        let mut wave = 0_usize;

        while !pending.is_empty() {
            self.check_cancelled()?;

            let settled = self.settle_dependency_failures(&pending);
            pending.retain(|&index| !self.results.contains(index));

            let ready: Vec<usize> = pending
                .iter()
                .copied()
                .filter(|&index| self.is_ready(index))
                .collect();
            if ready.is_empty() {
                if settled > 0 {
                    continue;
                }
                tracing::error!(pending = pending.len(), "no rule is ready");
                return Err(EngineError::Stalled {
                    pending: pending.len(),
                });
            }

            wave += 1;
            let (parallel, serial): (Vec<usize>, Vec<usize>) =
                ready.into_iter().partition(|&index| {
                    self.options.enable_parallelization
                        && self.rules[index].logic.is_parallel_safe()
                });
            tracing::debug!(
                wave,
                parallel = parallel.len(),
                serial = serial.len(),
                dependency_failed = settled,
                "running wave"
            );

            self.run_parallel(&parallel, &semaphore).await?;
            self.run_serial(&serial).await?;

            pending.retain(|&index| !self.results.contains(index));
        }

        tracing::debug!(waves = wave, rules = self.rules.len(), "all rules completed");
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), EngineError> {
        if self.cancellation.is_cancelled() {
            let completed = self.results.len();
            tracing::warn!(completed, "validation cancelled");
            return Err(EngineError::Cancelled { completed });
        }
        Ok(())
    }

    /// Every dependency has a result.
    fn is_ready(&self, index: usize) -> bool {
        self.rules[index]
            .dependencies
            .iter()
            .all(|&dependency| self.results.contains(dependency))
    }

    /// Record `DependencyFailed` for pending rules that can never run their
    /// logic, repeating until no more rules settle so failures cascade
    /// through chains in one pass. Returns how many rules settled.
    fn settle_dependency_failures(&self, pending: &[usize]) -> usize {
        let mut settled = 0;
        loop {
            let mut changed = false;
            for &index in pending {
                if self.results.contains(index) {
                    continue;
                }
                let rule = &self.rules[index];
                let blocked = rule.unsatisfiable
                    || (self.is_ready(index)
                        && rule.dependencies.iter().any(|&dependency| {
                            self.results.outcome(dependency) != Some(RuleOutcome::Passed)
                        }));
                if blocked {
                    tracing::debug!(rule = %rule.identifier, "dependency did not pass");
                    self.results.record(index, RuleResult::dependency_failed(), None);
                    settled += 1;
                    changed = true;
                }
            }
            if !changed {
                return settled;
            }
        }
    }

    /// Run all `ready` rules concurrently and wait for the whole group.
    async fn run_parallel(
        &self,
        ready: &[usize],
        semaphore: &Arc<Semaphore>,
    ) -> Result<(), EngineError> {
        if ready.is_empty() {
            return Ok(());
        }
        let mut join_set = JoinSet::new();
        for &index in ready {
            join_set.spawn(
                RuleTask {
                    invocation: RuleInvocation::new(
                        &self.rules[index],
                        Arc::clone(&self.tree),
                        &self.cancellation,
                    ),
                    semaphore: Arc::clone(semaphore),
                    cancellation: self.cancellation.clone(),
                    results: Arc::clone(&self.results),
                    instrument: self.options.instrument_execution,
                }
                .run(),
            );
        }

        while let Some(joined) = join_set.join_next().await {
            if let Err(join_err) = joined {
                tracing::error!(?join_err, "rule task failed");
                self.cancellation.cancel();
                return Err(EngineError::TaskFailed(join_err.to_string()));
            }
        }
        Ok(())
    }

    /// Run `ready` rules one at a time, in index order.
    async fn run_serial(&self, ready: &[usize]) -> Result<(), EngineError> {
        for &index in ready {
            self.check_cancelled()?;
            let invocation =
                RuleInvocation::new(&self.rules[index], Arc::clone(&self.tree), &self.cancellation);
            let (result, instrumentation) = invocation
                .run(false, self.options.instrument_execution)
                .await;
            self.results.record(index, result, instrumentation);
        }
        Ok(())
    }
}

/// Bundled parameters for one rule of a parallel phase.
struct RuleTask {
    invocation: RuleInvocation,
    semaphore: Arc<Semaphore>,
    cancellation: CancellationToken,
    results: Arc<ResultAggregator>,
    instrument: bool,
}

impl RuleTask {
    /// Acquire a permit, check cancellation, run the rule and record its result.
    async fn run(self) {
        let Self {
            invocation,
            semaphore,
            cancellation,
            results,
            instrument,
        } = self;
        let Ok(_permit) = semaphore.acquire_owned().await else {
            return;
        };
        if cancellation.is_cancelled() {
            return;
        }
        let index = invocation.index();
        let (result, instrumentation) = invocation.run(true, instrument).await;
        results.record(index, result, instrumentation);
    }
}
