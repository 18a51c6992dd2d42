use std::time::Duration;

use tokio::time::Instant;

/// Leading-edge rate limiter for transcript snapshots.
///
/// The first call is always let through; after that a call passes only once
/// `interval` has elapsed since the last one that passed. Time is supplied by
/// the caller so the decision is reproducible in tests.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    /// Returns true and records `now` if an emission is due.
    pub fn ready(&mut self, now: Instant) -> bool {
        let due = match self.last_emit {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if due {
            self.last_emit = Some(now);
        }
        due
    }
}
