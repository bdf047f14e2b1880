//! Coalescing of bursts of load requests
//!
//! Adjusting filters can queue several loads while the worker is busy. Only
//! the newest one matters, so older ones are dropped without a reply.

use tracing::debug;

/// Holds the newest of a burst of values
#[derive(Debug)]
pub struct Debouncer<T> {
    pending: Option<T>,
    superseded: u64,
}

impl<T> Debouncer<T> {
    pub fn new() -> Self {
        Self {
            pending: None,
            superseded: 0,
        }
    }

    /// Queue `value`, returning the value it replaced
    pub fn push(&mut self, value: T) -> Option<T> {
        let previous = self.pending.replace(value);
        if previous.is_some() {
            self.superseded += 1;
            debug!(total = self.superseded, "superseded queued value");
        }
        previous
    }

    /// Take the queued value, leaving nothing pending
    pub fn take(&mut self) -> Option<T> {
        self.pending.take()
    }

    /// Check if a value is waiting
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Number of values dropped so far
    pub fn superseded(&self) -> u64 {
        self.superseded
    }
}

impl<T> Default for Debouncer<T> {
    fn default() -> Self {
        Self::new()
    }
}
