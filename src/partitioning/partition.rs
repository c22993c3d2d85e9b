use std::{fmt, sync::Arc};

use conv::ConvUtil;

use super::matchers::Matcher;

/// A named class of traffic, guaranteed a share of the total concurrency limit.
///
/// Requests are assigned to a partition by its [Matcher].
pub struct Partition {
    name: String,
    percent: f64,
    matcher: Option<Arc<dyn Matcher>>,

    limit: usize,
    busy: usize,
}

impl Partition {
    /// A partition using `percent` (in `(0, 1]`) of the total limit.
    ///
    /// A [matcher](Self::with_matcher) must be set before the partition can be used in a
    /// [PartitionStrategy](super::PartitionStrategy).
    pub fn new(name: impl Into<String>, percent: f64) -> Self {
        Self {
            name: name.into(),
            percent,
            matcher: None,

            limit: 1,
            busy: 0,
        }
    }

    /// Assign requests accepted by `matcher` to this partition.
    pub fn with_matcher(mut self, matcher: impl Matcher + 'static) -> Self {
        self.matcher = Some(Arc::new(matcher));
        self
    }

    /// Identifier of this partition, unique within a strategy.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Share of the total limit, in `(0, 1]`.
    pub fn percent(&self) -> f64 {
        self.percent
    }

    /// This partition's share of the current total limit. At least 1.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of tokens currently held for this partition.
    pub fn busy_count(&self) -> usize {
        self.busy
    }

    /// Whether this partition holds at least its share of tokens.
    pub fn is_limit_exceeded(&self) -> bool {
        self.busy >= self.limit
    }

    pub(crate) fn has_matcher(&self) -> bool {
        self.matcher.is_some()
    }

    pub(crate) fn matches(&self, ctx: &super::RequestContext) -> bool {
        self.matcher
            .as_ref()
            .is_some_and(|matcher| matcher.matches(ctx))
    }

    pub(crate) fn acquire(&mut self) {
        self.busy += 1;
    }

    pub(crate) fn release(&mut self) {
        self.busy = self.busy.saturating_sub(1);
    }

    /// Recompute this partition's limit as its share of `total_limit`, rounding half up.
    pub(crate) fn update_limit(&mut self, total_limit: usize) {
        self.limit = (self.percent * total_limit as f64)
            .round()
            .approx_as::<usize>()
            .unwrap_or(total_limit)
            .max(1);
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PredicatePartition{{name={}, percent={:.6}, limit={}, busy={}}}",
            self.name, self.percent, self.limit, self.busy
        )
    }
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition")
            .field("name", &self.name)
            .field("percent", &self.percent)
            .field("has_matcher", &self.has_matcher())
            .field("limit", &self.limit)
            .field("busy", &self.busy)
            .finish()
    }
}
