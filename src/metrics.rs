//! Reporting of limits and usage to a metrics backend.
//!
//! Reporting is optional: [EmptyMetricRegistry] is used unless a registry is provided.

use std::fmt::Debug;

/// Total limit of a strategy.
pub const LIMIT: &str = "limit";
/// Limit of a single partition.
pub const PARTITION_LIMIT: &str = "limit.partition";
/// Busy count of a single partition.
pub const PARTITION_BUSY: &str = "busy.partition";
/// Rejected acquisitions for a single partition.
pub const PARTITION_REJECTED: &str = "rejected.partition";

/// A sink for gauges and counters.
///
/// `partition` is set for per-partition metrics.
pub trait MetricRegistry: Debug + Send + Sync {
    /// Set a gauge to `value`.
    fn record_gauge(&self, _id: &'static str, _value: f64, _partition: Option<&str>) {}

    /// Increment a counter by one.
    fn increment_counter(&self, _id: &'static str, _partition: Option<&str>) {}
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyMetricRegistry;

impl MetricRegistry for EmptyMetricRegistry {}

/// Forwards to the global [`metrics`](::metrics) recorder, labelling per-partition metrics with
/// `partition`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsFacade;

impl MetricRegistry for MetricsFacade {
    fn record_gauge(&self, id: &'static str, value: f64, partition: Option<&str>) {
        match partition {
            Some(partition) => {
                ::metrics::gauge!(id, "partition" => partition.to_owned()).set(value);
            }
            None => ::metrics::gauge!(id).set(value),
        }
    }

    fn increment_counter(&self, id: &'static str, partition: Option<&str>) {
        match partition {
            Some(partition) => {
                ::metrics::counter!(id, "partition" => partition.to_owned()).increment(1);
            }
            None => ::metrics::counter!(id).increment(1),
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::Mutex;

    use super::MetricRegistry;

    /// Remembers everything it was given.
    #[derive(Debug, Default)]
    pub struct RecordingRegistry {
        pub gauges: Mutex<Vec<(&'static str, f64, Option<String>)>>,
        pub counters: Mutex<Vec<(&'static str, Option<String>)>>,
    }

    impl RecordingRegistry {
        pub fn last_gauge(&self, id: &str, partition: Option<&str>) -> Option<f64> {
            self.gauges
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(i, _, p)| *i == id && p.as_deref() == partition)
                .map(|(_, v, _)| *v)
        }

        pub fn count(&self, id: &str, partition: Option<&str>) -> usize {
            self.counters
                .lock()
                .unwrap()
                .iter()
                .filter(|(i, p)| *i == id && p.as_deref() == partition)
                .count()
        }
    }

    impl MetricRegistry for RecordingRegistry {
        fn record_gauge(&self, id: &'static str, value: f64, partition: Option<&str>) {
            self.gauges
                .lock()
                .unwrap()
                .push((id, value, partition.map(str::to_owned)));
        }

        fn increment_counter(&self, id: &'static str, partition: Option<&str>) {
            self.counters
                .lock()
                .unwrap()
                .push((id, partition.map(str::to_owned)));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use ::metrics::{
        Counter, CounterFn, Gauge, GaugeFn, Histogram, Key, KeyName, Metadata, Recorder,
        SharedString, Unit,
    };

    use crate::{Partition, PartitionStrategy, RequestContext, StringMatcher};

    use super::*;

    /// Metric name and `partition` label.
    type Series = (String, Option<String>);

    /// Keeps the latest value of every series.
    #[derive(Debug, Default)]
    struct CapturingRecorder {
        values: Arc<Mutex<HashMap<Series, f64>>>,
    }

    struct Handle {
        series: Series,
        values: Arc<Mutex<HashMap<Series, f64>>>,
    }

    impl CapturingRecorder {
        fn handle(&self, key: &Key) -> Arc<Handle> {
            let partition = key
                .labels()
                .find(|label| label.key() == "partition")
                .map(|label| label.value().to_owned());
            Arc::new(Handle {
                series: (key.name().to_owned(), partition),
                values: Arc::clone(&self.values),
            })
        }

        fn value(&self, name: &str, partition: Option<&str>) -> Option<f64> {
            self.values
                .lock()
                .unwrap()
                .get(&(name.to_owned(), partition.map(str::to_owned)))
                .copied()
        }
    }

    impl Recorder for CapturingRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
            Counter::from_arc(self.handle(key))
        }

        fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
            Gauge::from_arc(self.handle(key))
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    impl CounterFn for Handle {
        fn increment(&self, value: u64) {
            *self.values.lock().unwrap().entry(self.series.clone()).or_default() += value as f64;
        }

        fn absolute(&self, value: u64) {
            self.values
                .lock()
                .unwrap()
                .insert(self.series.clone(), value as f64);
        }
    }

    impl GaugeFn for Handle {
        fn increment(&self, value: f64) {
            *self.values.lock().unwrap().entry(self.series.clone()).or_default() += value;
        }

        fn decrement(&self, value: f64) {
            *self.values.lock().unwrap().entry(self.series.clone()).or_default() -= value;
        }

        fn set(&self, value: f64) {
            self.values
                .lock()
                .unwrap()
                .insert(self.series.clone(), value);
        }
    }

    #[test]
    fn facade_forwards_to_recorder() {
        let recorder = CapturingRecorder::default();

        ::metrics::with_local_recorder(&recorder, || {
            let strategy = PartitionStrategy::with_registry(
                vec![
                    Partition::new("batch", 0.3).with_matcher(StringMatcher::new("batch")),
                    Partition::new("live", 0.7).with_matcher(StringMatcher::new("live")),
                ],
                1,
                Arc::new(MetricsFacade),
            )
            .unwrap();
            let batch = RequestContext::with_classification("batch");

            let token = strategy.try_acquire(&batch).unwrap();
            assert_eq!(recorder.value(PARTITION_BUSY, Some("batch")), Some(1.0));

            assert!(strategy.try_acquire(&batch).is_none());
            assert!(strategy.try_acquire(&batch).is_none());

            drop(token);
            assert_eq!(recorder.value(PARTITION_BUSY, Some("batch")), Some(0.0));
        });

        assert_eq!(recorder.value(LIMIT, None), Some(1.0));
        assert_eq!(recorder.value(PARTITION_LIMIT, Some("batch")), Some(1.0));
        assert_eq!(recorder.value(PARTITION_LIMIT, Some("live")), Some(1.0));
        assert_eq!(recorder.value(PARTITION_REJECTED, Some("batch")), Some(2.0));
        assert_eq!(recorder.value(PARTITION_REJECTED, Some("live")), None);
    }
}
