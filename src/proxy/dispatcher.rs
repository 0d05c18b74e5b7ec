//! Request dispatcher
//!
//! The proxy's state machine, free of any I/O readiness concerns:
//! - reassembles device requests from the byte stream
//! - translates them into GET/PUT datagrams and records them in the ledger
//! - matches node responses to outstanding requests and queues device replies
//!
//! The event loop feeds it bytes and datagrams; tests drive it directly.

use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};

use crate::config::Config;
use crate::device::{DeviceReply, DeviceRequest, RequestKind, REQUEST_LEN};
use crate::error::Result;
use crate::protocol::{DataResponse, Get, Header, Opcode, Put, WireMessage};
use crate::sequence::Sequencer;
use super::ledger::{Ledger, WireSink};

/// Whether the device channel stays up after ingesting bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Disconnect,
}

/// What became of a datagram from the node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Too short, or no outstanding request with that sequence number
    Ignored,
    /// Matched a request but not its expected shape; kept for retry
    Requeued,
    /// Matched and validated; a reply was queued for the device
    Completed,
}

/// Translates between the device channel and the wire protocol
pub struct Dispatcher {
    sequencer: Sequencer,
    ledger: Ledger,
    /// Partially received device requests
    inbound: BytesMut,
    /// Reply bytes not yet written to the device
    replies: BytesMut,
    min_wait: Duration,
}

impl Dispatcher {
    pub fn new(sequencer: Sequencer, config: &Config) -> Self {
        Self {
            sequencer,
            ledger: Ledger::new(config.retry_interval()),
            inbound: BytesMut::with_capacity(64 * 1024),
            replies: BytesMut::with_capacity(64 * 1024),
            min_wait: config.min_poll_wait(),
        }
    }

    // =========================================================================
    // Device -> Wire
    // =========================================================================

    /// Append bytes read from the device and dispatch every complete request
    ///
    /// A write whose payload has not fully arrived stays buffered until a
    /// later call completes it. Validation failures are fatal.
    pub fn ingest<S: WireSink>(&mut self, bytes: &[u8], sink: &mut S, now: Instant) -> Result<Flow> {
        self.inbound.extend_from_slice(bytes);

        while self.inbound.len() >= REQUEST_LEN {
            let request = DeviceRequest::parse(&self.inbound[..REQUEST_LEN])?;

            if request.kind == RequestKind::Disconnect {
                self.inbound.advance(REQUEST_LEN);
                tracing::info!("Device requested disconnect");
                return Ok(Flow::Disconnect);
            }

            let frame_len = request.frame_len();
            if self.inbound.len() < frame_len {
                break;
            }

            let seq = self.sequencer.next_seq();
            let wire = match request.kind {
                RequestKind::Write => {
                    let payload = self.inbound[REQUEST_LEN..frame_len].to_vec();
                    Put::new(request.sector(), payload)?.encode(seq)
                }
                _ => Get::new(request.sector(), request.length_exponent()?).encode(seq),
            };
            self.inbound.advance(frame_len);

            sink.send(&wire)?;
            tracing::trace!(
                "Dispatched seq={} {:?} offset={} len={}",
                seq,
                request.kind,
                request.offset,
                request.len
            );
            self.ledger.insert(request, seq, wire, now);
        }

        Ok(Flow::Continue)
    }

    // =========================================================================
    // Wire -> Device
    // =========================================================================

    /// Match a datagram from the node against the ledger
    ///
    /// A read completes only on a GET_RESPONSE of exactly the requested
    /// size; a write completes on any PUT_RESPONSE. A matching sequence
    /// with the wrong shape is a known node quirk: the entry goes back into
    /// the ledger and is resubmitted later.
    pub fn complete(&mut self, datagram: &[u8], now: Instant) -> Completion {
        let header = match Header::parse(datagram) {
            Ok(header) => header,
            Err(_) => return Completion::Ignored,
        };
        let entry = match self.ledger.remove(header.seq) {
            Some(entry) => entry,
            None => return Completion::Ignored,
        };

        let request = entry.request;
        let payload = match request.kind {
            RequestKind::Read if header.is(Opcode::GetResponse) => {
                DataResponse::payload_of(datagram, request.len as usize)
            }
            RequestKind::Write if header.is(Opcode::PutResponse) => Some(&[][..]),
            _ => None,
        };

        let Some(payload) = payload else {
            tracing::debug!(
                "Unexpected response to seq={} (opcode 0x{:02x}, {} bytes), retrying",
                entry.seq,
                header.opcode,
                datagram.len()
            );
            self.ledger.reinsert(entry, now);
            return Completion::Requeued;
        };

        DeviceReply::ok(request.handle).put(&mut self.replies);
        self.replies.extend_from_slice(payload);
        tracing::trace!("Completed seq={} {:?}", entry.seq, request.kind);
        Completion::Completed
    }

    // =========================================================================
    // Timers
    // =========================================================================

    /// Resend everything past its deadline
    pub fn resubmit<S: WireSink>(&mut self, sink: &mut S, now: Instant) -> Result<usize> {
        Ok(self.ledger.resubmit_expired(now, sink)?)
    }

    /// How long the loop may sleep: until the oldest deadline, but never
    /// less than the poll floor; `None` when nothing is outstanding
    pub fn next_wakeup(&self, now: Instant) -> Option<Duration> {
        self.ledger
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now).max(self.min_wait))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Reply bytes waiting to be written to the device
    pub fn replies(&self) -> &[u8] {
        &self.replies
    }

    pub fn replies_mut(&mut self) -> &mut BytesMut {
        &mut self.replies
    }

    /// Bytes of incomplete requests held back
    pub fn buffered(&self) -> usize {
        self.inbound.len()
    }
}
