//! Sharing one concurrency limit between several classes of traffic.

mod matchers;
mod partition;

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

pub use matchers::{AttributeValue, Matcher, RequestContext, StringMatcher, CLASSIFICATION_KEY};
pub use partition::Partition;

use crate::{
    error::{Error, Result},
    metrics::{self, EmptyMetricRegistry, MetricRegistry},
    Token,
};

/// Divides a total concurrency limit between [Partition]s, and issues [Token]s.
///
/// Each request is assigned to the first partition whose matcher accepts it. A partition which
/// has used up its own share can borrow capacity left idle by the others, up to the total limit.
/// A partition still within its own share is always admitted, so every partition keeps its
/// guaranteed share even when others have borrowed the rest.
///
/// Cheaply cloneable. Clones share the same state.
#[derive(Debug, Clone)]
pub struct PartitionStrategy {
    shared: Arc<Shared>,
}

#[derive(Debug)]
pub(crate) struct Shared {
    state: Mutex<State>,
    registry: Arc<dyn MetricRegistry>,
}

#[derive(Debug)]
struct State {
    partitions: Vec<Partition>,
    limit: usize,
    /// Always equal to the sum of the partitions' busy counts.
    busy: usize,
}

impl PartitionStrategy {
    /// Tolerance when checking that partition shares add up to no more than 1.
    const PERCENT_TOLERANCE: f64 = 1e-6;

    /// Create a strategy with the given partitions, in matching order, and an initial total limit.
    ///
    /// Fails if there are no partitions, a partition has no matcher or an invalid share, two
    /// partitions share a name, or the shares add up to more than 1.
    pub fn new(partitions: Vec<Partition>, limit: usize) -> Result<Self> {
        Self::with_registry(partitions, limit, Arc::new(EmptyMetricRegistry))
    }

    /// Like [new()](Self::new), reporting limits and usage to `registry`.
    pub fn with_registry(
        partitions: Vec<Partition>,
        limit: usize,
        registry: Arc<dyn MetricRegistry>,
    ) -> Result<Self> {
        if partitions.is_empty() {
            return Err(Error::NoPartitions);
        }

        let mut total = 0.0;
        for (i, partition) in partitions.iter().enumerate() {
            let percent = partition.percent();
            if !(percent > 0.0 && percent <= 1.0) {
                return Err(Error::InvalidPercent {
                    name: partition.name().to_owned(),
                    percent,
                });
            }
            if !partition.has_matcher() {
                return Err(Error::MissingMatcher {
                    name: partition.name().to_owned(),
                });
            }
            if partitions[..i].iter().any(|p| p.name() == partition.name()) {
                return Err(Error::DuplicatePartition {
                    name: partition.name().to_owned(),
                });
            }
            total += percent;
        }
        if total > 1.0 + Self::PERCENT_TOLERANCE {
            return Err(Error::PercentOverflow { total });
        }

        let strategy = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    partitions,
                    limit: 1,
                    busy: 0,
                }),
                registry,
            }),
        };
        strategy.set_limit(limit);

        Ok(strategy)
    }

    /// Change the total limit, recomputing each partition's share. Values below 1 are clamped
    /// to 1.
    ///
    /// Tokens already issued are unaffected. A partition left over its new, lower limit rejects
    /// new requests until enough tokens are released.
    pub fn set_limit(&self, limit: usize) {
        let limit = limit.max(1);

        let mut state = self.shared.lock();
        let old_limit = state.limit;
        state.limit = limit;

        for partition in state.partitions.iter_mut() {
            partition.update_limit(limit);
            self.shared.registry.record_gauge(
                metrics::PARTITION_LIMIT,
                partition.limit() as f64,
                Some(partition.name()),
            );
        }
        self.shared
            .registry
            .record_gauge(metrics::LIMIT, limit as f64, None);

        if old_limit != limit {
            tracing::debug!(old_limit, new_limit = limit, "partition strategy: limit changed");
        }
    }

    /// The total limit.
    pub fn limit(&self) -> usize {
        self.shared.lock().limit
    }

    /// The number of tokens currently held across all partitions.
    pub fn busy_count(&self) -> usize {
        self.shared.lock().busy
    }

    /// The limit of the partition at `index`.
    pub fn bin_limit(&self, index: usize) -> Result<usize> {
        self.shared.lock().partition(index).map(Partition::limit)
    }

    /// The number of tokens currently held by the partition at `index`.
    pub fn bin_busy_count(&self, index: usize) -> Result<usize> {
        self.shared.lock().partition(index).map(Partition::busy_count)
    }

    /// The number of partitions.
    pub fn len(&self) -> usize {
        self.shared.lock().partitions.len()
    }

    /// Always false: a strategy has at least one partition.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The index of the first partition matching `ctx`.
    pub fn classify(&self, ctx: &RequestContext) -> Result<usize> {
        self.shared.lock().classify(ctx)
    }

    /// Try to immediately acquire a [Token] for the request described by `ctx`.
    ///
    /// Returns `None` if the request matches no partition, or if both its partition and the
    /// strategy as a whole are at their limits.
    pub fn try_acquire(&self, ctx: &RequestContext) -> Option<Token> {
        let mut guard = self.shared.lock();
        let state = &mut *guard;

        let index = match state.classify(ctx) {
            Ok(index) => index,
            Err(_) => {
                tracing::trace!(
                    classification = ctx.classification(),
                    "partition strategy: no matching partition"
                );
                return None;
            }
        };

        let partition = &mut state.partitions[index];
        if partition.is_limit_exceeded() && state.busy >= state.limit {
            tracing::trace!(
                partition = partition.name(),
                busy = state.busy,
                limit = state.limit,
                "partition strategy: rejected"
            );
            self.shared
                .registry
                .increment_counter(metrics::PARTITION_REJECTED, Some(partition.name()));
            return None;
        }

        partition.acquire();
        state.busy += 1;
        self.shared.registry.record_gauge(
            metrics::PARTITION_BUSY,
            partition.busy_count() as f64,
            Some(partition.name()),
        );

        Some(Token::new(Arc::downgrade(&self.shared), index))
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock still holds consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Give back one unit of concurrency held by the partition at `index`.
    pub(crate) fn release(&self, index: usize) {
        let mut guard = self.lock();
        let state = &mut *guard;

        if let Some(partition) = state.partitions.get_mut(index) {
            partition.release();
            state.busy = state.busy.saturating_sub(1);

            self.registry.record_gauge(
                metrics::PARTITION_BUSY,
                partition.busy_count() as f64,
                Some(partition.name()),
            );
        }
    }
}

impl State {
    fn partition(&self, index: usize) -> Result<&Partition> {
        self.partitions
            .get(index)
            .ok_or(Error::PartitionIndexOutOfRange {
                index,
                len: self.partitions.len(),
            })
    }

    fn classify(&self, ctx: &RequestContext) -> Result<usize> {
        self.partitions
            .iter()
            .position(|partition| partition.matches(ctx))
            .ok_or(Error::NoMatchingPartition)
    }
}

impl fmt::Display for PartitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();

        write!(f, "PartitionStrategy{{partitions=[")?;
        for (i, partition) in state.partitions.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{partition}")?;
        }
        write!(f, "], limit={}, busy={}}}", state.limit, state.busy)
    }
}
