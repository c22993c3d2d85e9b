//! Errors raised while building or inspecting a [PartitionStrategy](crate::PartitionStrategy).

/// Shorthand for results produced by this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong in the admission engine.
///
/// Admission itself never fails: a request that can't be admitted is simply rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A strategy needs at least one partition.
    #[error("at least one partition is required")]
    NoPartitions,

    /// A partition share must be within `(0, 1]`.
    #[error("partition `{name}` has percent {percent}, expected a value in (0, 1]")]
    InvalidPercent {
        /// Partition name.
        name: String,
        /// The rejected share.
        percent: f64,
    },

    /// Every partition needs a matcher to classify requests.
    #[error("partition `{name}` has no matcher")]
    MissingMatcher {
        /// Partition name.
        name: String,
    },

    /// Partition names identify partitions within a strategy, so must be unique.
    #[error("partition name `{name}` is used more than once")]
    DuplicatePartition {
        /// The repeated name.
        name: String,
    },

    /// Partition shares must not add up to more than the whole limit.
    #[error("partition percents sum to {total}, which exceeds 1.0")]
    PercentOverflow {
        /// Sum of all partition shares.
        total: f64,
    },

    /// A partition index outside of the strategy's partition list.
    #[error("partition index {index} is out of range for {len} partitions")]
    PartitionIndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of partitions.
        len: usize,
    },

    /// A request which none of the partitions' matchers accepted.
    #[error("request did not match any partition")]
    NoMatchingPartition,
}

impl Error {
    /// Whether this error was caused by an invalid strategy configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::NoPartitions
                | Error::InvalidPercent { .. }
                | Error::MissingMatcher { .. }
                | Error::DuplicatePartition { .. }
                | Error::PercentOverflow { .. }
        )
    }
}
