//! Re-armable single-shot idle timer
//!
//! At most one deadline is ever pending: arming replaces any earlier one
//! and cancelling clears it without firing. The session loop awaits
//! [`IdleWatchdog::expires`] alongside its command channel and turns an
//! expired deadline into exactly one stop transmission.

use std::future;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// Idle timer that forces a stop when no qualifying input renews it
#[derive(Debug)]
pub struct IdleWatchdog {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl IdleWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// Schedules (or reschedules) the single pending deadline
    pub fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.timeout);
    }

    /// Clears the pending deadline without firing it
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolves once the given deadline passes; pends forever for `None`
    ///
    /// Takes the deadline by value so the caller's select loop can keep
    /// mutating the watchdog in its other branches.
    pub async fn expires(deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => future::pending().await,
        }
    }
}
