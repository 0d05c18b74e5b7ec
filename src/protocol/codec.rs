//! Protocol codec
//!
//! Encoding and decoding of fixed-layout messages.
//!
//! Every message is a header followed by a fixed block of fields (with
//! reserved gaps) and, for PUT and data responses, a power-of-two payload.
//! Each message type knows its own layout through [`WireMessage`]; the
//! provided `encode`/`decode` methods handle the header and length checks.

use std::net::Ipv4Addr;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, SanError};
use super::command::{Header, Opcode};

/// Header size: cmd (1) + length exponent (1) + sequence (2)
pub const HEADER_LEN: usize = 4;

/// Bytes per sector
pub const SECTOR_SIZE: usize = 512;

/// Sector to byte conversion shift
pub const SECTOR_SHIFT: u32 = 9;

// =============================================================================
// Message Trait
// =============================================================================

/// A message with a fixed on-wire layout
pub trait WireMessage: Sized {
    /// Opcode carried in the header
    const OPCODE: Opcode;

    /// Length of header plus fixed fields, excluding any payload
    const FIXED_LEN: usize;

    /// Header length exponent (0 for messages without a sized payload)
    fn length_exponent(&self) -> u8 {
        0
    }

    /// Trailing payload, empty for most messages
    fn payload(&self) -> &[u8] {
        &[]
    }

    /// Write the fields following the header; exactly `FIXED_LEN - HEADER_LEN` bytes
    fn put_fields(&self, buf: &mut BytesMut);

    /// Read fields out of a frame already checked to be at least `FIXED_LEN` long
    fn parse_fields(header: &Header, frame: &[u8]) -> Result<Self>;

    /// Total on-wire length of this message
    fn wire_len(&self) -> usize {
        Self::FIXED_LEN + self.payload().len()
    }

    /// Encode with the given sequence number
    fn encode(&self, seq: u16) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        Header::new(Self::OPCODE, self.length_exponent(), seq).put(&mut buf);
        self.put_fields(&mut buf);
        debug_assert_eq!(buf.len(), Self::FIXED_LEN);
        buf.put_slice(self.payload());
        buf.freeze()
    }

    /// Decode a frame, rejecting it if shorter than the layout or if the
    /// opcode does not match
    fn decode(frame: &[u8]) -> Result<(Header, Self)> {
        check_len(frame, Self::FIXED_LEN)?;
        let header = Header::parse(frame)?;
        if !header.is(Self::OPCODE) {
            return Err(SanError::UnexpectedOpcode {
                expected: Self::OPCODE as u8,
                found: header.opcode,
            });
        }
        let message = Self::parse_fields(&header, frame)?;
        Ok((header, message))
    }
}

// =============================================================================
// Field Helpers
// =============================================================================

pub(crate) fn check_len(frame: &[u8], expected: usize) -> Result<()> {
    if frame.len() < expected {
        return Err(SanError::Truncated {
            expected,
            actual: frame.len(),
        });
    }
    Ok(())
}

/// Fold 6 big-endian bytes into a u64
pub fn get_u48(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .take(6)
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Write the low 48 bits of `value` big-endian
pub fn put_u48(buf: &mut BytesMut, value: u64) {
    buf.put_slice(&value.to_be_bytes()[2..]);
}

pub fn sectors_to_bytes(sectors: u64) -> u64 {
    sectors << SECTOR_SHIFT
}

pub(crate) fn get_ipv4(bytes: &[u8]) -> Ipv4Addr {
    Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3])
}

/// Copy `value` into a `width` byte field, truncating or NUL padding
pub(crate) fn put_padded(buf: &mut BytesMut, value: &[u8], width: usize) {
    let n = value.len().min(width);
    buf.put_slice(&value[..n]);
    buf.put_bytes(0, width - n);
}

/// String up to the first NUL (or the whole field)
pub(crate) fn nul_terminated(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
