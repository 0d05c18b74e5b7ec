//! Outstanding-Request Ledger
//!
//! Device requests that have been sent to the node and are waiting for a
//! valid completion, kept in the order their deadlines were armed.

use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::device::DeviceRequest;

/// Where retransmitted datagrams go
pub trait WireSink {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()>;
}

/// A request in flight
#[derive(Debug, Clone)]
pub struct Outstanding {
    pub request: DeviceRequest,
    pub seq: u16,
    /// Exact bytes sent, reused verbatim on resubmission
    pub wire: Bytes,
    deadline: Instant,
}

impl Outstanding {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// Insertion-ordered collection of outstanding requests
pub struct Ledger {
    entries: VecDeque<Outstanding>,
    retry_after: Duration,
}

impl Ledger {
    pub fn new(retry_after: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            retry_after,
        }
    }

    /// Record a freshly sent request; its deadline is `now + retry_after`
    pub fn insert(&mut self, request: DeviceRequest, seq: u16, wire: Bytes, now: Instant) {
        let deadline = now + self.retry_after;
        self.entries.push_back(Outstanding {
            request,
            seq,
            wire,
            deadline,
        });
    }

    /// Put a removed entry back at the newest position with a fresh deadline
    pub fn reinsert(&mut self, mut entry: Outstanding, now: Instant) {
        entry.deadline = now + self.retry_after;
        self.entries.push_back(entry);
    }

    /// Remove the entry with sequence number `seq`
    pub fn remove(&mut self, seq: u16) -> Option<Outstanding> {
        let index = self.entries.iter().position(|entry| entry.seq == seq)?;
        self.entries.remove(index)
    }

    /// Retransmit every entry whose deadline has passed
    ///
    /// Scans from the oldest entry and stops at the first one still in the
    /// future. Each resubmitted entry gets a new deadline and moves to the
    /// back, keeping its sequence number. Returns how many were resent.
    pub fn resubmit_expired<S: WireSink>(&mut self, now: Instant, sink: &mut S) -> io::Result<usize> {
        let deadline = now + self.retry_after;
        let mut resent = 0;

        // Bounded by the starting length so a zero retry interval cannot spin
        for _ in 0..self.entries.len() {
            match self.entries.front() {
                Some(entry) if entry.deadline <= now => sink.send(&entry.wire)?,
                _ => break,
            }
            let Some(mut entry) = self.entries.pop_front() else { break };

            tracing::debug!("Resubmitted seq={} ({:?} @ {})", entry.seq, entry.request.kind, entry.request.offset);

            entry.deadline = deadline;
            self.entries.push_back(entry);
            resent += 1;
        }

        Ok(resent)
    }

    /// Deadline of the oldest entry
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.front().map(|entry| entry.deadline)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Outstanding> {
        self.entries.iter()
    }
}
