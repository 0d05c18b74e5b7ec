//! Discovery collection window
//!
//! Nodes on one segment answer a FIND almost together. The window waits
//! up to the full query timeout for the first answer, then closes a short
//! settle period after the most recent one.

use std::collections::BTreeSet;
use std::net::SocketAddrV4;
use std::time::{Duration, Instant};

/// Root addresses found by one discovery round
pub type DiskSet = BTreeSet<SocketAddrV4>;

/// Deadline tracker for one discovery round
#[derive(Debug, Clone, Copy)]
pub struct CollectionWindow {
    deadline: Instant,
    settle: Duration,
}

impl CollectionWindow {
    /// Window opened at `start`, waiting `initial` for the first reply
    pub fn new(start: Instant, initial: Duration, settle: Duration) -> Self {
        Self {
            deadline: start + initial,
            settle,
        }
    }

    /// Record a reply at `at`; the window now closes `settle` after it
    pub fn record_reply(&mut self, at: Instant) {
        self.deadline = at + self.settle;
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Whether a reply arriving at `at` still counts
    pub fn is_open(&self, at: Instant) -> bool {
        at < self.deadline
    }
}
