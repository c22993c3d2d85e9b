use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use crate::SampleWindow;

use super::{
    defaults::{DEFAULT_INCREASE_MIN_UTILISATION, DEFAULT_MAX_LIMIT, DEFAULT_MIN_LIMIT},
    utilisation, LimitAlgorithm,
};

/// Loss-based congestion avoidance.
///
/// Additive-increase, multiplicative decrease.
///
/// Adds available currency when:
/// 1. no load-based errors are observed, and
/// 2. the utilisation of the current limit is high.
///
/// Reduces available concurrency by a factor when load-based errors are detected, or when the
/// average latency in a window exceeds a timeout.
#[derive(Debug)]
pub struct Aimd {
    min_limit: usize,
    max_limit: usize,
    decrease_factor: f64,
    increase_by: usize,
    min_utilisation_threshold: f64,
    timeout: Duration,

    limit: AtomicUsize,
}

impl Aimd {
    const DEFAULT_DECREASE_FACTOR: f64 = 0.9;
    const DEFAULT_INCREASE: usize = 1;
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Start from `initial_limit`, which must be at least 1.
    pub fn new_with_initial_limit(initial_limit: usize) -> Self {
        assert!(initial_limit > 0);

        Self {
            min_limit: DEFAULT_MIN_LIMIT,
            max_limit: DEFAULT_MAX_LIMIT,
            decrease_factor: Self::DEFAULT_DECREASE_FACTOR,
            increase_by: Self::DEFAULT_INCREASE,
            min_utilisation_threshold: DEFAULT_INCREASE_MIN_UTILISATION,
            timeout: Self::DEFAULT_TIMEOUT,

            limit: AtomicUsize::new(initial_limit),
        }
    }

    /// Multiply the limit by this on overload, in `[0.5, 1)`.
    pub fn decrease_factor(self, factor: f64) -> Self {
        assert!((0.5..1.0).contains(&factor));
        Self {
            decrease_factor: factor,
            ..self
        }
    }

    /// Add this to the limit when well utilised.
    pub fn increase_by(self, increase: usize) -> Self {
        assert!(increase > 0);
        Self {
            increase_by: increase,
            ..self
        }
    }

    /// Never raise the limit above `max`.
    pub fn with_max_limit(self, max: usize) -> Self {
        assert!(max > 0);
        Self {
            max_limit: max,
            ..self
        }
    }

    /// A threshold below which the limit won't be increased. 0.5 = 50%.
    pub fn with_min_utilisation_threshold(self, min_util: f64) -> Self {
        assert!(min_util > 0. && min_util < 1.);
        Self {
            min_utilisation_threshold: min_util,
            ..self
        }
    }

    /// Windows with an average latency above this are treated as overloaded.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        assert!(timeout > Duration::ZERO);
        Self { timeout, ..self }
    }
}

impl LimitAlgorithm for Aimd {
    fn estimated_limit(&self) -> usize {
        self.limit.load(Ordering::Acquire)
    }

    fn update(&self, window: &SampleWindow) -> usize {
        let overloaded = window.did_drop() || window.average_rtt() > self.timeout;

        let next_limit = |limit: usize| {
            let limit = if overloaded {
                multiplicative_decrease(limit, self.decrease_factor)
            } else if utilisation(window.max_in_flight(), limit) > self.min_utilisation_threshold {
                limit + self.increase_by
            } else {
                limit
            };

            limit.clamp(self.min_limit, self.max_limit)
        };

        let old_limit = self
            .limit
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |limit| {
                Some(next_limit(limit))
            })
            .expect("we always return Some(limit)");

        // The value this call stored, even if another update has landed since.
        let new_limit = next_limit(old_limit);
        if new_limit != old_limit {
            tracing::debug!(old_limit, new_limit, overloaded, "aimd: limit changed");
        }
        new_limit
    }
}

pub(super) fn multiplicative_decrease(limit: usize, decrease_factor: f64) -> usize {
    let limit = limit as f64 * decrease_factor;

    // Floor instead of round, so the limit reduces even with small numbers.
    // E.g. round(2 * 0.9) = 2, but floor(2 * 0.9) = 1
    limit.floor() as usize
}
