//! Adaptive concurrency limits, shared between partitioned classes of traffic.
//!
//! A [PartitionStrategy] divides a total concurrency limit between [Partition]s and issues
//! [Token]s. A [limit algorithm](limits::LimitAlgorithm) estimates the total limit from the
//! latency and loss observed in [SampleWindow]s. [PartitionedLimiter] connects the two.

#![deny(missing_docs)]

#[cfg(doctest)]
use doc_comment::doctest;
#[cfg(doctest)]
doctest!("../README.md");

mod error;
mod limiter;
pub mod limits;
pub mod metrics;
mod moving_avg;
mod partitioning;
mod token;
mod window;

pub use error::{Error, Result};
pub use limiter::{Outcome, PartitionedLimiter};
pub use partitioning::{
    AttributeValue, Matcher, Partition, PartitionStrategy, RequestContext, StringMatcher,
    CLASSIFICATION_KEY,
};
pub use token::Token;
pub use window::SampleWindow;
