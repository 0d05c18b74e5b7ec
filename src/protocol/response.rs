//! Response definitions
//!
//! Messages a node sends back. GET_RESPONSE has three layouts; which one
//! applies depends on the request being answered, so each is its own type.

use std::net::Ipv4Addr;
use std::ops::Range;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Result;
use super::codec::{self, WireMessage};
use super::command::{BlockRef, Header, LengthExponent, Opcode};

/// Answer to FIND carrying the node's address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindResponse {
    pub addr: Ipv4Addr,
}

impl FindResponse {
    const ADDR: Range<usize> = 16..20;
}

impl WireMessage for FindResponse {
    const OPCODE: Opcode = Opcode::FindResponse;
    const FIXED_LEN: usize = 20;

    fn put_fields(&self, buf: &mut BytesMut) {
        buf.put_bytes(0, 12);
        buf.put_slice(&self.addr.octets());
    }

    fn parse_fields(_header: &Header, frame: &[u8]) -> Result<Self> {
        Ok(Self {
            addr: codec::get_ipv4(&frame[Self::ADDR]),
        })
    }
}

/// Answer to RESOLVE carrying the address serving the partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveResponse {
    pub addr: Ipv4Addr,
}

impl ResolveResponse {
    const ADDR: Range<usize> = 80..84;
}

impl WireMessage for ResolveResponse {
    const OPCODE: Opcode = Opcode::ResolveResponse;
    const FIXED_LEN: usize = 104;

    fn put_fields(&self, buf: &mut BytesMut) {
        buf.put_bytes(0, 76);
        buf.put_slice(&self.addr.octets());
        buf.put_bytes(0, 20);
    }

    fn parse_fields(_header: &Header, frame: &[u8]) -> Result<Self> {
        Ok(Self {
            addr: codec::get_ipv4(&frame[Self::ADDR]),
        })
    }
}

// =============================================================================
// GET_RESPONSE: disk metadata
// =============================================================================

/// Disk metadata, the answer to GET of sector 0 on a root address
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiskInfo {
    pub version: String,
    pub label: String,
    pub total_size: u64,
    pub free_size: u64,
    pub partitions: u8,
}

impl DiskInfo {
    const VERSION: Range<usize> = 28..44;
    const SECTORS_TOTAL: Range<usize> = 52..58;
    const SECTORS_FREE: Range<usize> = 58..64;
    const PARTITIONS: usize = 69;
    const LABEL: Range<usize> = 74..130;
}

impl WireMessage for DiskInfo {
    const OPCODE: Opcode = Opcode::GetResponse;
    const FIXED_LEN: usize = BlockRef::LEN + 512;

    fn length_exponent(&self) -> u8 {
        LengthExponent::SECTOR.get()
    }

    fn put_fields(&self, buf: &mut BytesMut) {
        BlockRef::sector(0).put(buf);
        codec::put_padded(buf, self.version.as_bytes(), Self::VERSION.len());
        buf.put_bytes(0, 2 + 3 + 3);
        codec::put_u48(buf, self.total_size >> codec::SECTOR_SHIFT);
        codec::put_u48(buf, self.free_size >> codec::SECTOR_SHIFT);
        buf.put_bytes(0, 5);
        buf.put_u8(self.partitions);
        buf.put_bytes(0, 4);
        codec::put_padded(buf, self.label.as_bytes(), Self::LABEL.len());
        buf.put_bytes(0, 410);
    }

    fn parse_fields(_header: &Header, frame: &[u8]) -> Result<Self> {
        Ok(Self {
            version: codec::nul_terminated(&frame[Self::VERSION]),
            label: codec::nul_terminated(&frame[Self::LABEL]),
            total_size: codec::sectors_to_bytes(codec::get_u48(&frame[Self::SECTORS_TOTAL])),
            free_size: codec::sectors_to_bytes(codec::get_u48(&frame[Self::SECTORS_FREE])),
            partitions: frame[Self::PARTITIONS],
        })
    }
}

// =============================================================================
// GET_RESPONSE: partition metadata
// =============================================================================

/// Partition metadata, the answer to IDENTIFY or GET of sector N on a root
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartitionInfo {
    pub id: String,
    pub label: String,
    pub size: u64,
}

impl PartitionInfo {
    const LABEL: Range<usize> = 34..62;
    const SECTORS: Range<usize> = 162..168;
    const ID: Range<usize> = 206..270;
}

impl WireMessage for PartitionInfo {
    const OPCODE: Opcode = Opcode::GetResponse;
    const FIXED_LEN: usize = BlockRef::LEN + 512;

    fn length_exponent(&self) -> u8 {
        LengthExponent::SECTOR.get()
    }

    fn put_fields(&self, buf: &mut BytesMut) {
        BlockRef::sector(0).put(buf);
        buf.put_bytes(0, 6);
        codec::put_padded(buf, self.label.as_bytes(), Self::LABEL.len());
        buf.put_bytes(0, 100);
        codec::put_u48(buf, self.size >> codec::SECTOR_SHIFT);
        buf.put_bytes(0, 38);
        codec::put_padded(buf, self.id.as_bytes(), Self::ID.len());
        buf.put_bytes(0, 270);
    }

    fn parse_fields(_header: &Header, frame: &[u8]) -> Result<Self> {
        Ok(Self {
            id: codec::nul_terminated(&frame[Self::ID]),
            label: codec::nul_terminated(&frame[Self::LABEL]),
            size: codec::sectors_to_bytes(codec::get_u48(&frame[Self::SECTORS])),
        })
    }
}

// =============================================================================
// GET_RESPONSE: data
// =============================================================================

/// Sector data returned for a block GET
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataResponse {
    pub block: BlockRef,
    length_exponent: LengthExponent,
    payload: Bytes,
}

impl DataResponse {
    pub fn new(sector: u32, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        let length_exponent = LengthExponent::for_len(payload.len() as u64)?;
        Ok(Self {
            block: BlockRef::sector(sector),
            length_exponent,
            payload,
        })
    }

    /// On-wire length of a data response carrying `len` bytes
    pub fn wire_len_for(len: usize) -> usize {
        Self::FIXED_LEN + len
    }

    /// Payload of a data response without copying, if the frame is exactly
    /// as long as a `len` byte answer
    pub fn payload_of(frame: &[u8], len: usize) -> Option<&[u8]> {
        if frame.len() != Self::wire_len_for(len) {
            return None;
        }
        Some(&frame[Self::FIXED_LEN..])
    }
}

impl WireMessage for DataResponse {
    const OPCODE: Opcode = Opcode::GetResponse;
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

// =============================================================================
// PUT_RESPONSE
// =============================================================================

/// Write acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutResponse {
    pub block: BlockRef,
}

impl WireMessage for PutResponse {
    const OPCODE: Opcode = Opcode::PutResponse;
    const FIXED_LEN: usize = BlockRef::LEN;

    fn put_fields(&self, buf: &mut BytesMut) {
        self.block.put(buf);
    }

    fn parse_fields(_header: &Header, frame: &[u8]) -> Result<Self> {
        Ok(Self {
            block: BlockRef::parse(frame),
        })
    }
}
