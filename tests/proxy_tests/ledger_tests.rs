//! Tests for the Outstanding-Request Ledger
//!
//! These tests verify:
//! - Removal by sequence number
//! - Resubmission order and deadline handling
//! - Reinsertion after a rejected response
//! - Propagation of send failures

use std::io;
use std::time::{Duration, Instant};

use bytes::Bytes;
use sanblk::device::DeviceRequest;
use sanblk::proxy::{Ledger, WireSink};

// =============================================================================
// Helper Functions
// =============================================================================

const RETRY: Duration = Duration::from_millis(1000);

/// Sink that records every datagram it is handed
#[derive(Default)]
struct Recorder {
    sent: Vec<Vec<u8>>,
}

impl WireSink for Recorder {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.sent.push(datagram.to_vec());
        Ok(())
    }
}

struct Broken;

impl WireSink for Broken {
    fn send(&mut self, _datagram: &[u8]) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "network down"))
    }
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn read(offset: u64) -> DeviceRequest {
    DeviceRequest::read([offset as u8; 8], offset, 512)
}

fn wire(tag: u8) -> Bytes {
    Bytes::from(vec![tag; 28])
}

fn seqs(ledger: &Ledger) -> Vec<u16> {
    ledger.iter().map(|entry| entry.seq).collect()
}

/// Ledger holding seq 1, 2, 3 with deadlines t0+1000, t0+1010, t0+1020
fn three_entries(t0: Instant) -> Ledger {
    let mut ledger = Ledger::new(RETRY);
    ledger.insert(read(0), 1, wire(1), t0);
    ledger.insert(read(512), 2, wire(2), t0 + ms(10));
    ledger.insert(read(1024), 3, wire(3), t0 + ms(20));
    ledger
}

// =============================================================================
// Insert/Remove Tests
// =============================================================================

#[test]
fn test_insert_keeps_order() {
    let t0 = Instant::now();
    let ledger = three_entries(t0);

    assert_eq!(ledger.len(), 3);
    assert_eq!(seqs(&ledger), vec![1, 2, 3]);
    assert_eq!(ledger.next_deadline(), Some(t0 + RETRY));
}

#[test]
fn test_remove_by_seq() {
    let t0 = Instant::now();
    let mut ledger = three_entries(t0);

    let entry = ledger.remove(2).unwrap();
    assert_eq!(entry.seq, 2);
    assert_eq!(entry.request.offset, 512);
    assert_eq!(entry.wire, wire(2));
    assert_eq!(seqs(&ledger), vec![1, 3]);

    assert!(ledger.remove(2).is_none());
    assert!(ledger.remove(99).is_none());
}

#[test]
fn test_empty_ledger() {
    let mut ledger = Ledger::new(RETRY);
    let mut sink = Recorder::default();

    assert!(ledger.is_empty());
    assert!(ledger.next_deadline().is_none());
    assert_eq!(ledger.resubmit_expired(Instant::now(), &mut sink).unwrap(), 0);
    assert!(sink.sent.is_empty());
}

// =============================================================================
// Resubmission Tests
// =============================================================================

#[test]
fn test_resubmits_expired_in_order() {
    let t0 = Instant::now();
    let mut ledger = three_entries(t0);
    let mut sink = Recorder::default();

    // Past t1 and t2, before t3
    let now = t0 + ms(1015);
    let resent = ledger.resubmit_expired(now, &mut sink).unwrap();

    assert_eq!(resent, 2);
    assert_eq!(sink.sent, vec![wire(1).to_vec(), wire(2).to_vec()]);
    assert_eq!(seqs(&ledger), vec![3, 1, 2]);
    assert_eq!(ledger.next_deadline(), Some(t0 + ms(1020)));

    let deadlines: Vec<Instant> = ledger.iter().map(|entry| entry.deadline()).collect();
    assert_eq!(deadlines, vec![t0 + ms(1020), now + RETRY, now + RETRY]);
}

#[test]
fn test_scan_before_deadlines_resends_nothing() {
    let t0 = Instant::now();
    let mut ledger = three_entries(t0);
    let mut sink = Recorder::default();

    ledger.resubmit_expired(t0 + ms(1015), &mut sink).unwrap();
    sink.sent.clear();

    // Earlier than every remaining deadline
    let resent = ledger.resubmit_expired(t0 + ms(1016), &mut sink).unwrap();
    assert_eq!(resent, 0);
    assert!(sink.sent.is_empty());
    assert_eq!(seqs(&ledger), vec![3, 1, 2]);
}

#[test]
fn test_resubmission_keeps_sequence_and_bytes() {
    let t0 = Instant::now();
    let mut ledger = Ledger::new(RETRY);
    ledger.insert(read(0), 42, wire(9), t0);
    let mut sink = Recorder::default();

    ledger.resubmit_expired(t0 + ms(1000), &mut sink).unwrap();
    ledger.resubmit_expired(t0 + ms(2000), &mut sink).unwrap();

    assert_eq!(sink.sent, vec![wire(9).to_vec(), wire(9).to_vec()]);
    assert_eq!(seqs(&ledger), vec![42]);
}

#[test]
fn test_zero_interval_visits_each_entry_once() {
    let t0 = Instant::now();
    let mut ledger = Ledger::new(Duration::ZERO);
    ledger.insert(read(0), 1, wire(1), t0);
    ledger.insert(read(512), 2, wire(2), t0);
    let mut sink = Recorder::default();

    let resent = ledger.resubmit_expired(t0, &mut sink).unwrap();
    assert_eq!(resent, 2);
    assert_eq!(seqs(&ledger), vec![1, 2]);
}

#[test]
fn test_send_failure_propagates() {
    let t0 = Instant::now();
    let mut ledger = three_entries(t0);

    let result = ledger.resubmit_expired(t0 + ms(5000), &mut Broken);
    assert!(result.is_err());
}

// =============================================================================
// Reinsert Tests
// =============================================================================

#[test]
fn test_reinsert_moves_to_back_with_fresh_deadline() {
    let t0 = Instant::now();
    let mut ledger = three_entries(t0);

    let entry = ledger.remove(1).unwrap();
    let now = t0 + ms(500);
    ledger.reinsert(entry, now);

    assert_eq!(seqs(&ledger), vec![2, 3, 1]);
    let last = ledger.iter().last().unwrap();
    assert_eq!(last.deadline(), now + RETRY);
    assert_eq!(last.wire, wire(1));
}
