use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, PoisonError,
    },
    time::Duration,
};

use conv::ConvUtil;

use crate::SampleWindow;

use super::{
    defaults::{
        DEFAULT_INCREASE_MIN_UTILISATION, DEFAULT_MAX_LIMIT, DEFAULT_MIN_LIMIT, MIN_SAMPLE_LATENCY,
    },
    utilisation, LimitAlgorithm,
};

/// Loss- and delay-based congestion avoidance.
///
/// Additive increase, additive decrease.
///
/// Estimates queuing delay by comparing the average latency of a window with the minimum observed
/// latency to estimate the number of jobs being queued.
///
/// Can fairly distribute concurrency between independent clients as long as there is enough server
/// capacity to handle the requests. That is: as long as the server isn't overloaded and failing to
/// handle requests as a result.
///
/// Inspired by TCP Vegas.
///
/// - [TCP Vegas: End to End Congestion Avoidance on a Global
///   Internet](https://www.cs.princeton.edu/courses/archive/fall06/cos561/papers/vegas.pdf)
/// - [Understanding TCP Vegas: Theory and
///   Practice](https://www.cs.princeton.edu/research/techreps/TR-628-00)
pub struct Vegas {
    min_limit: usize,
    max_limit: usize,

    /// Lower queueing threshold, as a function of the current limit.
    alpha: Box<dyn (Fn(usize) -> usize) + Send + Sync>,
    /// Upper queueing threshold, as a function of the current limit.
    beta: Box<dyn (Fn(usize) -> usize) + Send + Sync>,

    limit: AtomicUsize,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    min_latency: Duration,
}

impl Vegas {
    /// Start from `initial_limit`, which must be at least 1.
    pub fn new_with_initial_limit(initial_limit: usize) -> Self {
        assert!(initial_limit > 0);

        Self {
            limit: AtomicUsize::new(initial_limit),
            min_limit: DEFAULT_MIN_LIMIT,
            max_limit: DEFAULT_MAX_LIMIT,

            alpha: Box::new(|limit| 3 * log10(limit)),
            beta: Box::new(|limit| 6 * log10(limit)),

            inner: Mutex::new(Inner {
                min_latency: Duration::MAX,
            }),
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
}

fn log10(limit: usize) -> usize {
    limit.max(1).ilog10().max(1) as usize
}

impl LimitAlgorithm for Vegas {
    fn estimated_limit(&self) -> usize {
        self.limit.load(Ordering::Acquire)
    }

    /// Vegas algorithm, generally applied once every RTT:
    ///
    /// ```text
    /// MIN_D = estimated min. latency with no queueing
    /// D(t)  = observed latency at time t
    /// L(t)  = concurrency limit at time t
    /// F(t)  = jobs in flight at time t
    ///
    /// queue_size = L(t) * (1 − MIN_D / D(T)) [>= 0]
    ///
    /// alpha = low queueing threshold
    /// beta  = high queueing threshold
    ///
    /// L(t+1) = L(t) + 1 if queue_size < alpha and F(t) > 0.8 * L(t)
    ///               - 1 if queue_size > beta or jobs were dropped
    /// ```
    ///
    /// Example estimated queue sizes when `L(t)` = 10 and `MIN_D` = 10ms, for several changes in
    /// latency:
    ///
    /// ```text
    ///  10x => queue_size = 10 * (1 - 0.01 / 0.1)   =   9 (90%)
    ///   2x => queue_size = 10 * (1 - 0.01 / 0.02)  =   5 (50%)
    /// 1.5x => queue_size = 10 * (1 - 0.01 / 0.015) =   3 (30%)
    ///   1x => queue_size = 10 * (1 - 0.01 / 0.01)  =   0 (0%)
    /// 0.5x => queue_size = 10 * (1 - 0.01 / 0.005) = -10 (0%)
    /// ```
    fn update(&self, window: &SampleWindow) -> usize {
        let latency = window.average_rtt();
        let did_drop = window.did_drop();

        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !did_drop {
            if latency < MIN_SAMPLE_LATENCY {
                return self.estimated_limit();
            }
            if window.min_rtt() < inner.min_latency {
                inner.min_latency = window.min_rtt();
                return self.estimated_limit();
            }
        }

        let next_limit = |limit: usize| {
            let increment = log10(limit);

            let limit = if did_drop {
                limit.saturating_sub(increment)
            } else {
                let dt = latency.as_secs_f64();
                let min_d = inner.min_latency.as_secs_f64();

                let estimated_queued_jobs = (limit as f64 * (1.0 - (min_d / dt)))
                    .max(0.0)
                    .ceil()
                    .approx_as::<usize>()
                    .unwrap_or(usize::MAX);

                if estimated_queued_jobs > (self.beta)(limit) {
                    // Limit too big
                    limit.saturating_sub(increment)
                } else if estimated_queued_jobs < (self.alpha)(limit)
                    && utilisation(window.max_in_flight(), limit) > DEFAULT_INCREASE_MIN_UTILISATION
                {
                    // Limit too small
                    limit + increment
                } else {
                    // Perfect porridge
                    limit
                }
            };

            limit.clamp(self.min_limit, self.max_limit)
        };

        let old_limit = self
            .limit
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |limit| {
                Some(next_limit(limit))
            })
            .expect("we always return Some(limit)");

        let new_limit = next_limit(old_limit);
        if new_limit != old_limit {
            tracing::debug!(old_limit, new_limit, did_drop, "vegas: limit changed");
        }
        new_limit
    }
}

impl std::fmt::Debug for Vegas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vegas")
            .field("min_limit", &self.min_limit)
            .field("max_limit", &self.max_limit)
            .field("limit", &self.limit)
            .field("inner", &self.inner)
            .finish()
    }
}
