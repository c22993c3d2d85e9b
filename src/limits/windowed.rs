use std::{
    ops::RangeInclusive,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use tokio::time::Instant;

use crate::SampleWindow;

use super::{defaults::MIN_SAMPLE_LATENCY, LimitAlgorithm, Sample};

/// A wrapper around a [LimitAlgorithm] which aggregates samples within a [SampleWindow],
/// periodically updating the limit.
///
/// The window duration is dynamic, based on latencies seen in the previous window. A fresh window
/// is started after every update.
#[derive(Debug)]
pub struct Windowed<L> {
    window_bounds: RangeInclusive<Duration>,
    min_samples: usize,

    /// Samples below this threshold will be discarded and not contribute to the current window.
    ///
    /// Useful for discarding samples which are not representative of the system we're trying to
    /// observe. For example, if an error occurs locally on the client machine, it doesn't tell us
    /// anything about the state of the server we're trying to communicate with.
    min_latency_threshold: Duration,

    inner: L,

    window: Mutex<Window>,
}

#[derive(Debug)]
struct Window {
    start: Instant,
    duration: Duration,

    samples: SampleWindow,
}

impl<L: LimitAlgorithm> Windowed<L> {
    const DEFAULT_MIN_SAMPLES: usize = 10;

    /// Wrap `inner`, closing windows after 10 samples and between 1µs and 1s.
    pub fn new(inner: L) -> Self {
        let min_window = Duration::from_micros(1);
        Self {
            window_bounds: RangeInclusive::new(min_window, Duration::from_secs(1)),
            min_samples: Self::DEFAULT_MIN_SAMPLES,
            min_latency_threshold: MIN_SAMPLE_LATENCY,

            inner,

            window: Mutex::new(Window {
                duration: min_window,
                start: Instant::now(),

                samples: SampleWindow::new(),
            }),
        }
    }

    /// At least this many samples need to be aggregated before updating the limit.
    pub fn with_min_samples(mut self, samples: usize) -> Self {
        assert!(samples > 0, "at least one sample required per window");
        self.min_samples = samples;
        self
    }

    /// Minimum time to wait before attempting to update the limit.
    pub fn with_min_window(mut self, min: Duration) -> Self {
        self.window_bounds = min..=*self.window_bounds.end();
        self.window
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .duration = min;
        self
    }

    /// Maximum time to wait before attempting to update the limit.
    ///
    /// Will wait for longer if not enough samples have been aggregated. See
    /// [with_min_samples()](Self::with_min_samples()).
    pub fn with_max_window(mut self, max: Duration) -> Self {
        self.window_bounds = *self.window_bounds.start()..=max;
        self
    }

    /// The wrapped algorithm.
    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Add a single job's sample to the current window, updating the limit if the window is
    /// complete.
    ///
    /// Returns the current limit.
    pub fn record(&self, sample: &Sample) -> usize {
        if sample.latency < self.min_latency_threshold {
            return self.inner.estimated_limit();
        }

        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);

        window.samples = sample.add_to(window.samples);

        if window.samples.total_count() >= self.min_samples
            && window.start.elapsed() >= window.duration
        {
            let samples = window.reset(&self.window_bounds);

            self.inner.update(&samples)
        } else {
            self.inner.estimated_limit()
        }
    }
}

impl<L: LimitAlgorithm> LimitAlgorithm for Windowed<L> {
    fn estimated_limit(&self) -> usize {
        self.inner.estimated_limit()
    }

    fn update(&self, window: &SampleWindow) -> usize {
        self.inner.update(window)
    }
}

impl Window {
    /// Start a fresh window, returning the samples from the closed one.
    fn reset(&mut self, bounds: &RangeInclusive<Duration>) -> SampleWindow {
        let closed = std::mem::take(&mut self.samples);

        self.start = Instant::now();

        // Use a window duration of 2 * RTT (RTT ~= min latency).
        self.duration = closed.min_rtt().clamp(*bounds.start(), *bounds.end()) * 2;

        closed
    }
}
