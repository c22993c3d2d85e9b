//! Algorithms for controlling concurrency limits.

mod aimd;
mod defaults;
mod gradient;
mod settable;
mod vegas;
mod windowed;

use std::{fmt::Debug, time::Duration};

use crate::{limiter::Outcome, SampleWindow};

pub use aimd::Aimd;
pub use gradient::Gradient;
pub use settable::Settable;
pub use vegas::Vegas;
pub use windowed::Windowed;

/// An algorithm for estimating a concurrency limit.
///
/// Implementations must be safe to read with [`estimated_limit()`](Self::estimated_limit) while
/// another thread is calling [`update()`](Self::update).
pub trait LimitAlgorithm: Debug + Send + Sync {
    /// The current estimated limit. Always at least 1.
    fn estimated_limit(&self) -> usize;

    /// Compute and store a new limit from the samples observed in `window`.
    ///
    /// Returns the new limit.
    fn update(&self, window: &SampleWindow) -> usize;
}

/// The result of a single job, including the [Outcome] (loss) and latency (delay).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub(crate) latency: Duration,
    /// Jobs in flight when the sample was taken.
    pub(crate) in_flight: usize,
    pub(crate) outcome: Outcome,
}

impl Sample {
    /// A job which took `latency`, with `in_flight` jobs running.
    pub fn new(latency: Duration, in_flight: usize, outcome: Outcome) -> Self {
        Self {
            latency,
            in_flight,
            outcome,
        }
    }

    /// Add this sample to a window.
    pub(crate) fn add_to(&self, window: SampleWindow) -> SampleWindow {
        match self.outcome {
            Outcome::Success => window.add_sample(self.latency, self.in_flight),
            Outcome::Overload => window.add_dropped_sample(self.in_flight),
        }
    }
}

pub(crate) fn utilisation(in_flight: usize, limit: usize) -> f64 {
    in_flight as f64 / limit.max(1) as f64
}
