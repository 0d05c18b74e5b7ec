//! Command definitions
//!
//! Opcodes, the common header, and the requests a client sends.

use std::net::Ipv4Addr;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, SanError};
use super::codec::{self, WireMessage, HEADER_LEN};

/// Wire opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Get = 0x00,
    Put = 0x01,
    PutResponse = 0x04,
    Find = 0x0d,
    FindResponse = 0x0e,
    Resolve = 0x0f,
    ResolveResponse = 0x10,
    GetResponse = 0x11,
    Identify = 0x13,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Opcode::Get),
            0x01 => Some(Opcode::Put),
            0x04 => Some(Opcode::PutResponse),
            0x0d => Some(Opcode::Find),
            0x0e => Some(Opcode::FindResponse),
            0x0f => Some(Opcode::Resolve),
            0x10 => Some(Opcode::ResolveResponse),
            0x11 => Some(Opcode::GetResponse),
            0x13 => Some(Opcode::Identify),
            _ => None,
        }
    }
}

// =============================================================================
// Header
// =============================================================================

/// Common 4 byte message header
///
/// The opcode is kept raw so that datagrams carrying unknown opcodes can
/// still be correlated and discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub opcode: u8,
    pub length_exponent: u8,
    pub seq: u16,
}

impl Header {
    pub fn new(opcode: Opcode, length_exponent: u8, seq: u16) -> Self {
        Self {
            opcode: opcode as u8,
            length_exponent,
            seq,
        }
    }

    /// Parse the header at the start of a datagram
    pub fn parse(frame: &[u8]) -> Result<Self> {
        codec::check_len(frame, HEADER_LEN)?;
        Ok(Self {
            opcode: frame[0],
            length_exponent: frame[1],
            seq: u16::from_be_bytes([frame[2], frame[3]]),
        })
    }

    pub fn put(&self, buf: &mut BytesMut) {
        buf.put_u8(self.opcode);
        buf.put_u8(self.length_exponent);
        buf.put_u16(self.seq);
    }

    pub fn is(&self, opcode: Opcode) -> bool {
        self.opcode == opcode as u8
    }
}

// =============================================================================
// Length Exponent
// =============================================================================

/// Power-of-two payload size, 2^9 (512) through 2^15 (32768) bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LengthExponent(u8);

impl LengthExponent {
    pub const MIN: u8 = 9;
    pub const MAX: u8 = 15;

    /// One sector
    pub const SECTOR: LengthExponent = LengthExponent(Self::MIN);

    pub fn new(exponent: u8) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&exponent) {
            Ok(Self(exponent))
        } else {
            Err(SanError::InvalidExponent(exponent))
        }
    }

    /// Exponent for a payload length, which must be a power of two in range
    pub fn for_len(len: u64) -> Result<Self> {
        let min = 1u64 << Self::MIN;
        let max = 1u64 << Self::MAX;
        if len < min || len > max || !len.is_power_of_two() {
            return Err(SanError::InvalidLength(len));
        }
        Ok(Self(len.trailing_zeros() as u8))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Payload size in bytes
    pub fn bytes(self) -> usize {
        1 << self.0
    }
}

// =============================================================================
// Block-addressed fields
// =============================================================================

/// Fields shared by every block-addressed message (GET shape)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    pub addr: Ipv4Addr,
    pub sector: u32,
    pub info: u8,
}

impl BlockRef {
    pub const ADDR: std::ops::Range<usize> = 16..20;
    pub const SECTOR: std::ops::Range<usize> = 22..26;
    pub const INFO: usize = 27;
    /// Header plus block fields
    pub const LEN: usize = 28;

    pub fn sector(sector: u32) -> Self {
        Self {
            addr: Ipv4Addr::UNSPECIFIED,
            sector,
            info: 0,
        }
    }

    pub(crate) fn put(&self, buf: &mut BytesMut) {
        buf.put_bytes(0, 12);
        buf.put_slice(&self.addr.octets());
        buf.put_bytes(0, 2);
        buf.put_u32(self.sector);
        buf.put_u8(0);
        buf.put_u8(self.info);
    }

    pub(crate) fn parse(frame: &[u8]) -> Self {
        let sector = &frame[Self::SECTOR];
        Self {
            addr: codec::get_ipv4(&frame[Self::ADDR]),
            sector: u32::from_be_bytes([sector[0], sector[1], sector[2], sector[3]]),
            info: frame[Self::INFO],
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Broadcast discovery probe (header only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Find;

impl WireMessage for Find {
    const OPCODE: Opcode = Opcode::Find;
    const FIXED_LEN: usize = HEADER_LEN;

    fn put_fields(&self, _buf: &mut BytesMut) {}

    fn parse_fields(_header: &Header, _frame: &[u8]) -> Result<Self> {
        Ok(Find)
    }
}

/// Partition metadata query, answered with a partition GET_RESPONSE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Identify;

impl WireMessage for Identify {
    const OPCODE: Opcode = Opcode::Identify;
    const FIXED_LEN: usize = HEADER_LEN + 24;

    fn put_fields(&self, buf: &mut BytesMut) {
        buf.put_bytes(0, 24);
    }

    fn parse_fields(_header: &Header, _frame: &[u8]) -> Result<Self> {
        Ok(Identify)
    }
}

/// Broadcast lookup of a partition identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolve {
    id: String,
}

impl Resolve {
    pub const ID: std::ops::Range<usize> = 4..68;

    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.len() > Self::ID.len() {
            return Err(SanError::IdentifierTooLong(id.len()));
        }
        Ok(Self { id })
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl WireMessage for Resolve {
    const OPCODE: Opcode = Opcode::Resolve;
    const FIXED_LEN: usize = 68;

    fn put_fields(&self, buf: &mut BytesMut) {
        codec::put_padded(buf, self.id.as_bytes(), Self::ID.len());
    }

    fn parse_fields(_header: &Header, frame: &[u8]) -> Result<Self> {
        Ok(Self {
            id: codec::nul_terminated(&frame[Self::ID]),
        })
    }
}

/// Read 2^exponent bytes starting at a sector (also used for metadata)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Get {
    pub block: BlockRef,
    pub length_exponent: LengthExponent,
}

impl Get {
    pub fn new(sector: u32, length_exponent: LengthExponent) -> Self {
        Self {
            block: BlockRef::sector(sector),
            length_exponent,
        }
    }
}

impl WireMessage for Get {
    const OPCODE: Opcode = Opcode::Get;
    const FIXED_LEN: usize = BlockRef::LEN;

    fn length_exponent(&self) -> u8 {
        self.length_exponent.get()
    }

    fn put_fields(&self, buf: &mut BytesMut) {
        self.block.put(buf);
    }

    fn parse_fields(header: &Header, frame: &[u8]) -> Result<Self> {
        Ok(Self {
            block: BlockRef::parse(frame),
            length_exponent: LengthExponent::new(header.length_exponent)?,
        })
    }
}

/// Write a 2^exponent byte payload starting at a sector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Put {
    pub block: BlockRef,
    length_exponent: LengthExponent,
    payload: Bytes,
}

impl Put {
    pub fn new(sector: u32, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        let length_exponent = LengthExponent::for_len(payload.len() as u64)?;
        Ok(Self {
            block: BlockRef::sector(sector),
            length_exponent,
            payload,
        })
    }
}

impl WireMessage for Put {
    const OPCODE: Opcode = Opcode::Put;
    const FIXED_LEN: usize = BlockRef::LEN;

    fn length_exponent(&self) -> u8 {
        self.length_exponent.get()
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn put_fields(&self, buf: &mut BytesMut) {
        self.block.put(buf);
    }

    fn parse_fields(header: &Header, frame: &[u8]) -> Result<Self> {
        let length_exponent = LengthExponent::new(header.length_exponent)?;
        let end = Self::FIXED_LEN + length_exponent.bytes();
        codec::check_len(frame, end)?;
        Ok(Self {
            block: BlockRef::parse(frame),
            length_exponent,
            payload: Bytes::copy_from_slice(&frame[Self::FIXED_LEN..end]),
        })
    }
}
