//! Moving averages.

use std::time::Duration;

/// An [exponential moving average](https://en.wikipedia.org/wiki/Exponential_smoothing).
#[derive(Debug)]
pub struct ExpSmoothed {
    /// Smoothing factor `α`. Weighting for the newest duration in the window.
    ///
    /// 0 < `a` < 1
    smoothing_factor: f64,

    value: Duration,

    // For initial warmup period
    initial_sum: Duration,
    initial_count: u16,
}

impl ExpSmoothed {
    /// > Exponential smoothing puts substantial weight on past observations, so the initial value
    /// > of demand will have an unreasonably large effect on early forecasts. This problem can be
    /// > overcome by allowing the process to evolve for a reasonable number of periods (10 or more)
    /// > and using the average of the demand during those periods as the initial forecast.
    /// >
    /// > [Source](https://en.wikipedia.org/wiki/Exponential_smoothing#Choosing_the_initial_smoothed_value)
    const INITIAL_WARMUP_SAMPLES: u16 = 10;

    pub fn new_with_window_size(k: u16) -> Self {
        Self {
            smoothing_factor: Self::smoothing_for_window(k),
            value: Duration::ZERO,
            initial_sum: Duration::ZERO,
            initial_count: 0,
        }
    }

    pub fn sample(&mut self, sample: Duration) -> Duration {
        if self.initial_count < Self::INITIAL_WARMUP_SAMPLES {
            self.initial_sum += sample;
            self.initial_count += 1;

            self.value = self.initial_sum / self.initial_count.into();
        } else if sample >= self.value {
            self.value += (sample - self.value).mul_f64(self.smoothing_factor);
        } else {
            self.value -= (self.value - sample).mul_f64(self.smoothing_factor);
        }
        self.value
    }

    pub fn set(&mut self, value: Duration) {
        self.value = value;
    }

    fn smoothing_for_window(k: u16) -> f64 {
        assert!(k > 0, "window size must be > 0");
        assert!(k < u16::MAX, "window size mustn't overflow");

        2.0 / (f64::from(k + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warmup_is_a_simple_average() {
        let mut avg = ExpSmoothed::new_with_window_size(9);

        avg.sample(Duration::from_millis(10));
        let value = avg.sample(Duration::from_millis(20));

        assert_eq!(value, Duration::from_millis(15));
    }

    #[test]
    fn smooths_in_both_directions() {
        let mut avg = ExpSmoothed::new_with_window_size(9);
        for _ in 0..10 {
            avg.sample(Duration::from_millis(100));
        }

        // α = 2 / (9 + 1) = 0.2
        assert_eq!(
            avg.sample(Duration::from_millis(200)),
            Duration::from_millis(120)
        );
        assert_eq!(
            avg.sample(Duration::from_millis(20)),
            Duration::from_millis(100)
        );
    }
}
