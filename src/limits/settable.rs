use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::SampleWindow;

use super::LimitAlgorithm;

/// A limit which is only changed by hand.
///
/// Feedback from [`update()`](LimitAlgorithm::update) is ignored.
#[derive(Debug)]
pub struct Settable {
    limit: AtomicUsize,
}

impl Settable {
    /// Create a limit, clamped to at least 1.
    pub fn new(limit: usize) -> Self {
        Self {
            limit: AtomicUsize::new(limit.max(1)),
        }
    }

    /// Replace the limit. Values below 1 are clamped to 1.
    pub fn set_limit(&self, limit: usize) {
        self.limit.store(limit.max(1), Ordering::Release);
    }
}

impl LimitAlgorithm for Settable {
    fn estimated_limit(&self) -> usize {
        self.limit.load(Ordering::Acquire)
    }

    fn update(&self, _window: &SampleWindow) -> usize {
        self.estimated_limit()
    }
}

impl fmt::Display for Settable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SettableLimit{{limit={}}}", self.estimated_limit())
    }
}
