use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Time of the last receive call that did not error.
///
/// Written by the receive loop, read by health checks. The lock only guards
/// the copy of the timestamp.
#[derive(Debug, Default)]
pub struct HealthTracker {
    last_success: Mutex<Option<Instant>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.record_success_at(Instant::now());
    }

    pub fn record_success_at(&self, now: Instant) {
        *self.last_success.lock().unwrap_or_else(PoisonError::into_inner) = Some(now);
    }

    pub fn last_success(&self) -> Option<Instant> {
        *self.last_success.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `None` until the first successful poll. Recomputed against the clock on
    /// every call.
    pub fn elapsed_since_last_success(&self) -> Option<Duration> {
        self.last_success().map(|last| last.elapsed())
    }
}
