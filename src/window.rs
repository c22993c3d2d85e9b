//! Outcomes observed between two limit updates.

use std::time::Duration;

use conv::ConvUtil;

/// An immutable snapshot of the samples seen since the last limit update.
///
/// Adding a sample produces a new window, the original is left untouched. Windows are not rolling:
/// a fresh one is started after each update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleWindow {
    min_rtt: Duration,
    max_rtt: Duration,
    rtt_sum: Duration,
    sample_count: usize,
    dropped_count: usize,
    max_in_flight: usize,
}

impl SampleWindow {
    /// An empty window.
    pub fn new() -> Self {
        Self {
            min_rtt: Duration::MAX,
            max_rtt: Duration::ZERO,
            rtt_sum: Duration::ZERO,
            sample_count: 0,
            dropped_count: 0,
            max_in_flight: 0,
        }
    }

    /// Add a successful sample with round trip time `rtt`, observed while `in_flight` jobs were
    /// running.
    #[must_use]
    pub fn add_sample(self, rtt: Duration, in_flight: usize) -> Self {
        Self {
            min_rtt: self.min_rtt.min(rtt),
            max_rtt: self.max_rtt.max(rtt),
            rtt_sum: self.rtt_sum.saturating_add(rtt),
            sample_count: self.sample_count + 1,
            max_in_flight: self.max_in_flight.max(in_flight),
            ..self
        }
    }

    /// Add a sample which was dropped or rejected. RTT statistics are unaffected.
    #[must_use]
    pub fn add_dropped_sample(self, in_flight: usize) -> Self {
        Self {
            dropped_count: self.dropped_count + 1,
            max_in_flight: self.max_in_flight.max(in_flight),
            ..self
        }
    }

    /// Smallest RTT of the successful samples, or zero if there are none.
    pub fn min_rtt(&self) -> Duration {
        if self.sample_count == 0 {
            Duration::ZERO
        } else {
            self.min_rtt
        }
    }

    /// Largest RTT of the successful samples.
    pub fn max_rtt(&self) -> Duration {
        self.max_rtt
    }

    /// Mean RTT of the successful samples, or zero if there are none.
    pub fn average_rtt(&self) -> Duration {
        match self.sample_count.approx_as::<u32>() {
            Ok(0) => Duration::ZERO,
            Ok(count) => self.rtt_sum / count,
            Err(_) => self.rtt_sum.div_f64(self.sample_count as f64),
        }
    }

    /// Number of successful samples.
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Number of dropped samples.
    pub fn dropped_count(&self) -> usize {
        self.dropped_count
    }

    /// Successful and dropped samples together.
    pub fn total_count(&self) -> usize {
        self.sample_count + self.dropped_count
    }

    /// Highest number of jobs in flight seen while this window was open.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Whether any sample in this window was dropped.
    pub fn did_drop(&self) -> bool {
        self.dropped_count > 0
    }
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new()
    }
}
