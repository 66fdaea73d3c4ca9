//! Standby status scheduling and the acknowledged WAL position.

use std::time::Duration;

use tokio::time::Instant;

use super::lsn::Lsn;

/// Shortest accepted status interval; a zero interval would never let the
/// loop wait on the feed.
pub const MIN_STATUS_INTERVAL: Duration = Duration::from_secs(1);

/// Decides when the next standby status update is due.
#[derive(Debug, Clone)]
pub struct KeepaliveTimer {
    interval: Duration,
    next_deadline: Instant,
}

impl KeepaliveTimer {
    /// `interval` is raised to [`MIN_STATUS_INTERVAL`] if shorter.
    pub fn new(interval: Duration, now: Instant) -> Self {
        let interval = interval.max(MIN_STATUS_INTERVAL);
        Self {
            interval,
            next_deadline: now + interval,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_deadline
    }

    /// Schedule the next update one interval from `now`.
    pub fn rearm(&mut self, now: Instant) {
        self.next_deadline = now + self.interval;
    }

    /// Make an update due immediately (the server asked for a reply).
    pub fn collapse(&mut self, now: Instant) {
        self.next_deadline = self.next_deadline.min(now);
    }

    pub fn deadline(&self) -> Instant {
        self.next_deadline
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// The highest WAL position seen so far. Never moves backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalPosition {
    current: Lsn,
}

impl WalPosition {
    pub fn new(start: Lsn) -> Self {
        Self { current: start }
    }

    /// Raise the position to `lsn` if it is ahead. Returns whether it moved.
    pub fn observe(&mut self, lsn: Lsn) -> bool {
        if lsn > self.current {
            self.current = lsn;
            true
        } else {
            false
        }
    }

    pub fn current(&self) -> Lsn {
        self.current
    }
}
