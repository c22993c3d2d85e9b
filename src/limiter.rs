use std::sync::{Mutex, PoisonError};

use crate::{
    limits::{LimitAlgorithm, Sample, Windowed},
    Partition, PartitionStrategy, RequestContext, Result, Token,
};

/// Whether a job succeeded or failed as a result of congestion/overload.
///
/// Errors not considered to be caused by overload should be ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The job succeeded, or failed in a way unrelated to overload.
    Success,
    /// The job failed because of overload, e.g. it timed out or an explicit backpressure signal
    /// was observed.
    Overload,
}

/// Limits the number of concurrent jobs across a set of [Partition]s, adjusting the total limit
/// from the observed outcomes of jobs.
///
/// Job outcomes are aggregated into windows (see [Windowed]) before being handed to the limit
/// algorithm. Every change in the estimated limit is pushed into the [PartitionStrategy].
#[derive(Debug)]
pub struct PartitionedLimiter<L> {
    strategy: PartitionStrategy,
    limit_algo: Windowed<L>,
    /// Held while recording a sample and pushing its limit, so the strategy sees estimates in
    /// the order they were made.
    update: Mutex<()>,
}

impl<L> PartitionedLimiter<L>
where
    L: LimitAlgorithm,
{
    /// Create a limiter with a given limit control algorithm, using its current estimate as the
    /// initial total limit.
    pub fn new(limit_algo: Windowed<L>, partitions: Vec<Partition>) -> Result<Self> {
        let strategy = PartitionStrategy::new(partitions, limit_algo.estimated_limit())?;
        Ok(Self::with_strategy(limit_algo, strategy))
    }

    /// Create a limiter around an existing strategy. The strategy's limit is replaced by the
    /// algorithm's current estimate.
    pub fn with_strategy(limit_algo: Windowed<L>, strategy: PartitionStrategy) -> Self {
        strategy.set_limit(limit_algo.estimated_limit());
        Self {
            strategy,
            limit_algo,
            update: Mutex::new(()),
        }
    }

    /// Try to immediately acquire a concurrency [Token].
    ///
    /// Returns `None` if there are none available for the request's partition.
    pub fn try_acquire(&self, ctx: &RequestContext) -> Option<Token> {
        self.strategy.try_acquire(ctx)
    }

    /// Return the concurrency [Token], along with the outcome of the job.
    ///
    /// The [Outcome] of the job, and the time taken to perform it, may be used to update the
    /// concurrency limit. Set the outcome to `None` to ignore the job.
    ///
    /// Returns the new limit.
    pub fn release(&self, token: Token, outcome: Option<Outcome>) -> usize {
        let sample = outcome.map(|outcome| {
            Sample::new(token.latency(), self.strategy.busy_count(), outcome)
        });

        drop(token);

        let Some(sample) = sample else {
            return self.strategy.limit();
        };

        let _update = self.update.lock().unwrap_or_else(PoisonError::into_inner);
        let new_limit = self.limit_algo.record(&sample);
        if new_limit != self.strategy.limit() {
            self.strategy.set_limit(new_limit);
        }

        new_limit
    }

    /// The current total limit.
    pub fn limit(&self) -> usize {
        self.strategy.limit()
    }

    /// The underlying partition strategy.
    pub fn strategy(&self) -> &PartitionStrategy {
        &self.strategy
    }

    /// The limit control algorithm.
    pub fn limit_algo(&self) -> &Windowed<L> {
        &self.limit_algo
    }
}
