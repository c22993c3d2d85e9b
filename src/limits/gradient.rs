use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex, PoisonError,
};

use crate::{moving_avg, SampleWindow};

use super::{
    aimd::multiplicative_decrease,
    defaults::{
        DEFAULT_INCREASE_MIN_UTILISATION, DEFAULT_MAX_LIMIT, DEFAULT_MIN_LIMIT, MIN_SAMPLE_LATENCY,
    },
    utilisation, LimitAlgorithm,
};

/// Delay-based congestion avoidance.
///
/// Additive-increase, multiplicative decrease based on change in average latency.
///
/// Considers the difference between the average latency of a window and a long-term, smoothed
/// latency. Changes in these values are considered an indicator of a change in load on the system.
/// Dropped samples cause a multiplicative decrease.
///
/// Inspired by TCP congestion control algorithms using delay gradients.
///
/// - [Revisiting TCP Congestion Control Using Delay Gradients](https://hal.science/hal-01597987/)
#[derive(Debug)]
pub struct Gradient {
    min_limit: usize,
    max_limit: usize,

    limit: AtomicUsize,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    long_window_latency: moving_avg::ExpSmoothed,
    limit: f64,
}

impl Gradient {
    const DEFAULT_INCREASE: f64 = 4.;
    const DEFAULT_INCREASE_MIN_GRADIENT: f64 = 0.9;
    const DEFAULT_DROP_DECREASE_FACTOR: f64 = 0.9;

    const DEFAULT_LONG_WINDOW_SAMPLES: u16 = 500;

    const DEFAULT_TOLERANCE: f64 = 2.;
    const DEFAULT_SMOOTHING: f64 = 0.2;

    /// Start from `initial_limit`, which must be at least 1.
    pub fn new_with_initial_limit(initial_limit: usize) -> Self {
        assert!(initial_limit > 0);

        Self {
            min_limit: DEFAULT_MIN_LIMIT,
            max_limit: DEFAULT_MAX_LIMIT,

            limit: AtomicUsize::new(initial_limit),
            inner: Mutex::new(Inner {
                long_window_latency: moving_avg::ExpSmoothed::new_with_window_size(
                    Self::DEFAULT_LONG_WINDOW_SAMPLES,
                ),
                limit: initial_limit as f64,
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

impl LimitAlgorithm for Gradient {
    fn estimated_limit(&self) -> usize {
        self.limit.load(Ordering::Acquire)
    }

    fn update(&self, window: &SampleWindow) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let old_limit = inner.limit;

        let new_limit = if window.did_drop() {
            multiplicative_decrease(self.estimated_limit(), Self::DEFAULT_DROP_DECREASE_FACTOR)
                as f64
        } else {
            let latency = window.average_rtt();
            if latency < MIN_SAMPLE_LATENCY {
                return self.estimated_limit();
            }

            // Update long window
            let long = inner.long_window_latency.sample(latency);

            let ratio = long.as_secs_f64() / latency.as_secs_f64();

            // Speed up return to baseline after long period of increased load.
            if ratio > 2.0 {
                inner.long_window_latency.set(long.mul_f64(0.95));
            }

            // Only apply downwards gradient (when latency has increased).
            // Limit to >= 0.5 to prevent aggressive load shedding.
            // Tolerate a given amount of latency difference.
            let gradient = (Self::DEFAULT_TOLERANCE * ratio).clamp(0.5, 1.0);

            let utilisation = utilisation(window.max_in_flight(), self.estimated_limit());

            // Only apply an increase if we're using enough to justify it
            // and we're not trying to reduce the limit by much.
            let increase = if utilisation > DEFAULT_INCREASE_MIN_UTILISATION
                && gradient > Self::DEFAULT_INCREASE_MIN_GRADIENT
            {
                Self::DEFAULT_INCREASE
            } else {
                0.0
            };

            // Apply gradient, and allow an additive increase.
            let new_limit = old_limit * gradient + increase;
            old_limit * (1.0 - Self::DEFAULT_SMOOTHING) + new_limit * Self::DEFAULT_SMOOTHING
        };

        let new_limit = new_limit.clamp(self.min_limit as f64, self.max_limit as f64);

        inner.limit = new_limit;
        let rounded_limit = new_limit as usize;
        let previous = self.limit.swap(rounded_limit, Ordering::AcqRel);
        if previous != rounded_limit {
            tracing::debug!(
                old_limit = previous,
                new_limit = rounded_limit,
                "gradient: limit changed"
            );
        }

        rounded_limit
    }
}
