//! Synchronous Transaction Client
//!
//! Send one request, then block until the matching response arrives or the
//! deadline passes. Used for discovery, metadata queries, resolution and
//! single-shot reads and writes.

use std::fs;
use std::io;
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::path::Path;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::config::Config;
use crate::error::{Result, SanError};
use crate::protocol::{
    DataResponse, DiskInfo, Find, FindResponse, Get, Header, Identify, LengthExponent, Opcode,
    PartitionInfo, Put, PutResponse, Resolve, ResolveResponse, WireMessage, SECTOR_SHIFT,
    SECTOR_SIZE,
};
use crate::sequence::Sequencer;
use super::discovery::{CollectionWindow, DiskSet};
use super::socket::open_socket;

/// Largest datagram the client will receive
pub const MAX_DATAGRAM: usize = 65536;

/// What a response must look like to be accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expected {
    pub opcode: Opcode,
    pub seq: u16,
    /// Exact on-wire length
    pub len: usize,
}

impl Expected {
    pub fn new(opcode: Opcode, seq: u16, len: usize) -> Self {
        Self { opcode, seq, len }
    }

    /// Length, opcode and sequence must all match
    pub fn matches(&self, frame: &[u8]) -> bool {
        match Header::parse(frame) {
            Ok(header) => {
                frame.len() == self.len && header.is(self.opcode) && header.seq == self.seq
            }
            Err(_) => false,
        }
    }
}

/// A matching datagram, borrowed from the client's receive buffer
#[derive(Debug)]
pub struct Reply<'a> {
    pub frame: &'a [u8],
    pub from: SocketAddr,
}

/// Where a partition lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionAddress {
    /// Node that answered the resolution broadcast
    pub root: SocketAddr,
    /// Node serving the partition's data
    pub serving: SocketAddrV4,
}

/// Blocking request/response client over one UDP socket
pub struct Client {
    socket: UdpSocket,
    sequencer: Sequencer,
    config: Config,
    buf: Box<[u8]>,
}

impl Client {
    /// Open the protocol socket and use the process-wide sequencer
    pub fn open(config: Config) -> Result<Self> {
        let socket = open_socket(&config)?;
        Ok(Self::with_socket(socket, Sequencer::process(), config))
    }

    /// Build a client around an existing socket
    pub fn with_socket(socket: UdpSocket, sequencer: Sequencer, config: Config) -> Self {
        Self {
            socket,
            sequencer,
            config,
            buf: vec![0u8; MAX_DATAGRAM].into_boxed_slice(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Give up the socket and sequencer, e.g. to hand them to the proxy
    pub fn into_parts(self) -> (UdpSocket, Sequencer) {
        (self.socket, self.sequencer)
    }

    // =========================================================================
    // Transaction Primitive
    // =========================================================================

    /// Encode `message` under a fresh sequence number and send it once
    pub fn send<M: WireMessage>(&self, dest: SocketAddrV4, message: &M) -> Result<u16> {
        let seq = self.sequencer.next_seq();
        let bytes = message.encode(seq);
        self.socket.send_to(&bytes, dest)?;
        tracing::trace!("Sent {:?} seq={} to {}", M::OPCODE, seq, dest);
        Ok(seq)
    }

    /// Wait until `deadline` for a datagram matching `expected`
    ///
    /// Anything else is dropped without extending the deadline.
    pub fn wait_for(&mut self, expected: Expected, deadline: Instant) -> Result<Option<Reply<'_>>> {
        loop {
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(d) if !d.is_zero() => d,
                _ => return Ok(None),
            };
            self.socket.set_read_timeout(Some(remaining))?;

            let (n, from) = match self.socket.recv_from(&mut self.buf) {
                Ok(received) => received,
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            if expected.matches(&self.buf[..n]) {
                return Ok(Some(Reply {
                    frame: &self.buf[..n],
                    from,
                }));
            }
        }
    }

    /// Send `request` and decode the first matching `R`
    fn transact<M, R>(&mut self, dest: SocketAddrV4, request: &M, timeout: Duration) -> Result<Option<(R, SocketAddr)>>
    where
        M: WireMessage,
        R: WireMessage,
    {
        let seq = self.send(dest, request)?;
        let expected = Expected::new(R::OPCODE, seq, R::FIXED_LEN);
        match self.wait_for(expected, Instant::now() + timeout)? {
            Some(reply) => {
                let from = reply.from;
                let (_, response) = R::decode(reply.frame)?;
                Ok(Some((response, from)))
            }
            None => Ok(None),
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Broadcast FIND and collect every node that answers
    pub fn discover(&mut self) -> Result<DiskSet> {
        let seq = self.send(self.config.broadcast_addr, &Find)?;
        let expected = Expected::new(Opcode::FindResponse, seq, FindResponse::FIXED_LEN);
        let mut window = CollectionWindow::new(
            Instant::now(),
            self.config.query_timeout(),
            self.config.discovery_settle(),
        );

        let mut disks = DiskSet::new();
        while let Some(reply) = self.wait_for(expected, window.deadline())? {
            let (_, found) = FindResponse::decode(reply.frame)?;
            window.record_reply(Instant::now());
            disks.insert(self.config.node_addr(found.addr));
        }

        tracing::debug!("Discovery found {} disk(s)", disks.len());
        Ok(disks)
    }

    /// Disk metadata from a root address
    pub fn query_disk(&mut self, root: SocketAddrV4) -> Result<Option<DiskInfo>> {
        let timeout = self.config.query_timeout();
        let get = Get::new(0, LengthExponent::SECTOR);
        Ok(self.transact::<_, DiskInfo>(root, &get, timeout)?.map(|(info, _)| info))
    }

    /// Metadata of the partition served at `addr`
    pub fn query_partition(&mut self, addr: SocketAddrV4) -> Result<Option<PartitionInfo>> {
        let timeout = self.config.query_timeout();
        Ok(self.transact::<_, PartitionInfo>(addr, &Identify, timeout)?.map(|(info, _)| info))
    }

    /// Metadata of partition `index` (1-based) as listed by a root address
    pub fn query_root_partition(&mut self, root: SocketAddrV4, index: u32) -> Result<Option<PartitionInfo>> {
        let timeout = self.config.query_timeout();
        let get = Get::new(index, LengthExponent::SECTOR);
        Ok(self.transact::<_, PartitionInfo>(root, &get, timeout)?.map(|(info, _)| info))
    }

    /// Broadcast RESOLVE for a partition identifier
    pub fn resolve(&mut self, id: &str) -> Result<Option<PartitionAddress>> {
        let timeout = self.config.query_timeout();
        let broadcast = self.config.broadcast_addr;
        let resolve = Resolve::new(id)?;
        let answer = self.transact::<_, ResolveResponse>(broadcast, &resolve, timeout)?;

        Ok(answer.map(|(response, from)| PartitionAddress {
            root: from,
            serving: self.config.node_addr(response.addr),
        }))
    }

    /// Read the sector containing byte `offset`
    pub fn read(&mut self, addr: SocketAddrV4, offset: u64) -> Result<Option<Vec<u8>>> {
        let get = Get::new(sector_of(offset)?, LengthExponent::SECTOR);
        let seq = self.send(addr, &get)?;
        let expected = Expected::new(Opcode::GetResponse, seq, DataResponse::wire_len_for(SECTOR_SIZE));
        let deadline = Instant::now() + self.config.io_timeout();

        Ok(self
            .wait_for(expected, deadline)?
            .and_then(|reply| DataResponse::payload_of(reply.frame, SECTOR_SIZE).map(<[u8]>::to_vec)))
    }

    /// Write `data` at byte `offset`; true once the node acknowledges
    ///
    /// `data` must be a power of two between 512 and 32768 bytes.
    pub fn write(&mut self, addr: SocketAddrV4, offset: u64, data: &[u8]) -> Result<bool> {
        let put = Put::new(sector_of(offset)?, Bytes::copy_from_slice(data))?;
        let timeout = self.config.io_timeout();
        Ok(self.transact::<_, PutResponse>(addr, &put, timeout)?.is_some())
    }
}

/// Sector holding byte `offset`
pub fn sector_of(offset: u64) -> Result<u32> {
    u32::try_from(offset >> SECTOR_SHIFT).map_err(|_| SanError::InvalidOffset(offset))
}

/// Load a write payload from disk, checking it is a valid transfer size
pub fn load_write_payload(path: &Path) -> Result<Vec<u8>> {
    let data = fs::read(path)?;
    LengthExponent::for_len(data.len() as u64)?;
    Ok(data)
}
