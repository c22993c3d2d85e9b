use std::{sync::Weak, time::Duration};

use tokio::time::Instant;

use crate::partitioning::Shared;

/// A unit of concurrency, required to run a job.
///
/// Release the token once the job is complete, either explicitly with
/// [release()](Self::release) or by dropping it. Only the first release has any effect.
#[derive(Debug)]
pub struct Token {
    partition: Option<PartitionRef>,
    start: Instant,
}

/// A non-owning handle on the partition this token was issued for.
#[derive(Debug)]
struct PartitionRef {
    shared: Weak<Shared>,
    index: usize,
}

impl Token {
    pub(crate) fn new(shared: Weak<Shared>, index: usize) -> Self {
        Self {
            partition: Some(PartitionRef { shared, index }),
            start: Instant::now(),
        }
    }

    /// Whether this token still holds a unit of concurrency.
    pub fn is_acquired(&self) -> bool {
        self.partition.is_some()
    }

    /// Index of the partition this token was issued for.
    pub fn partition_index(&self) -> Option<usize> {
        self.partition.as_ref().map(|partition| partition.index)
    }

    /// Time since this token was issued.
    pub fn latency(&self) -> Duration {
        self.start.elapsed()
    }

    /// Give the unit of concurrency back to the partition it was taken from.
    ///
    /// Does nothing if already released, or if the strategy no longer exists.
    pub fn release(&mut self) {
        if let Some(partition) = self.partition.take() {
            if let Some(shared) = partition.shared.upgrade() {
                shared.release(partition.index);
            }
        }
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        self.release();
    }
}
