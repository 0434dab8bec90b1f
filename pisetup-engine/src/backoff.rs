//! Exponential backoff for re-advertising after an exhausted session

use std::time::Duration;

/// Doubling delay with a cap. Applied between an exhausted peer session and
/// the next advertising window so an uncooperative peer cannot drive the
/// engine in a hot loop.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap, next: base }
    }

    /// The delay to apply now; doubles the delay for the following call.
    pub fn next(&mut self) -> Duration {
        let current = self.next;
        self.next = (self.next * 2).min(self.cap);
        current
    }

    pub fn reset(&mut self) {
        self.next = self.base;
    }
}
