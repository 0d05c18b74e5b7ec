//! Device Channel Module
//!
//! Frames exchanged with the kernel block-device binding over a byte stream.
//!
//! ## Request (28 bytes, big-endian), optionally followed by `Len` bytes
//! of write payload
//! ```text
//! ┌───────────┬──────────┬────────────┬────────────┬─────────┐
//! │ Magic (4) │ Type (4) │ Handle (8) │ Offset (8) │ Len (4) │
//! └───────────┴──────────┴────────────┴────────────┴─────────┘
//! ```
//!
//! ## Reply (16 bytes), followed by `Len` bytes of data for reads
//! ```text
//! ┌───────────┬───────────┬────────────┐
//! │ Magic (4) │ Error (4) │ Handle (8) │
//! └───────────┴───────────┴────────────┘
//! ```

#[cfg(target_os = "linux")]
pub mod nbd;

use bytes::{BufMut, BytesMut};

use crate::error::{Result, SanError};
use crate::protocol::{LengthExponent, SECTOR_SHIFT, SECTOR_SIZE};

/// Magic number opening every request
pub const REQUEST_MAGIC: u32 = 0x2560_9513;

/// Magic number opening every reply
pub const REPLY_MAGIC: u32 = 0x6744_6698;

/// Request header size
pub const REQUEST_LEN: usize = 28;

/// Reply header size
pub const REPLY_LEN: usize = 16;

/// Opaque caller handle echoed back in the reply
pub type Handle = [u8; 8];

/// Operation requested by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RequestKind {
    Read = 0,
    Write = 1,
    Disconnect = 2,
}

impl RequestKind {
    /// Decode the type field; its upper 16 bits carry command flags
    pub fn from_u32(value: u32) -> Option<Self> {
        match value & 0xffff {
            0 => Some(RequestKind::Read),
            1 => Some(RequestKind::Write),
            2 => Some(RequestKind::Disconnect),
            _ => None,
        }
    }
}

// =============================================================================
// Request
// =============================================================================

/// A validated device request header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRequest {
    pub kind: RequestKind,
    pub handle: Handle,
    pub offset: u64,
    pub len: u32,
}

impl DeviceRequest {
    pub fn read(handle: Handle, offset: u64, len: u32) -> Self {
        Self { kind: RequestKind::Read, handle, offset, len }
    }

    pub fn write(handle: Handle, offset: u64, len: u32) -> Self {
        Self { kind: RequestKind::Write, handle, offset, len }
    }

    pub fn disconnect(handle: Handle) -> Self {
        Self { kind: RequestKind::Disconnect, handle, offset: 0, len: 0 }
    }

    /// Parse and validate the header at the start of `frame`
    ///
    /// Every failure here means the binding is broken, not the network.
    pub fn parse(frame: &[u8]) -> Result<Self> {
        if frame.len() < REQUEST_LEN {
            return Err(SanError::Truncated {
                expected: REQUEST_LEN,
                actual: frame.len(),
            });
        }

        let magic = be_u32(&frame[0..4]);
        if magic != REQUEST_MAGIC {
            return Err(SanError::BadMagic(magic));
        }

        let raw_kind = be_u32(&frame[4..8]);
        let kind = RequestKind::from_u32(raw_kind)
            .ok_or_else(|| SanError::DeviceProtocol(format!("unknown operation 0x{:08x}", raw_kind)))?;

        let mut handle = [0u8; 8];
        handle.copy_from_slice(&frame[8..16]);

        let mut offset = [0u8; 8];
        offset.copy_from_slice(&frame[16..24]);
        let offset = u64::from_be_bytes(offset);
        let len = be_u32(&frame[24..28]);

        let request = Self { kind, handle, offset, len };
        if kind != RequestKind::Disconnect {
            request.validate()?;
        }
        Ok(request)
    }

    /// Offset must be sector aligned and addressable with 32 bit sectors;
    /// length must be a power of two in 512..=32768
    pub fn validate(&self) -> Result<()> {
        if self.offset % SECTOR_SIZE as u64 != 0 || (self.offset >> SECTOR_SHIFT) >= u64::from(u32::MAX) {
            return Err(SanError::InvalidOffset(self.offset));
        }
        LengthExponent::for_len(u64::from(self.len))?;
        Ok(())
    }

    /// Encode the header (the binding's side of the channel)
    pub fn encode(&self) -> [u8; REQUEST_LEN] {
        let mut out = [0u8; REQUEST_LEN];
        out[0..4].copy_from_slice(&REQUEST_MAGIC.to_be_bytes());
        out[4..8].copy_from_slice(&(self.kind as u32).to_be_bytes());
        out[8..16].copy_from_slice(&self.handle);
        out[16..24].copy_from_slice(&self.offset.to_be_bytes());
        out[24..28].copy_from_slice(&self.len.to_be_bytes());
        out
    }

    pub fn sector(&self) -> u32 {
        (self.offset >> SECTOR_SHIFT) as u32
    }

    pub fn length_exponent(&self) -> Result<LengthExponent> {
        LengthExponent::for_len(u64::from(self.len))
    }

    /// Payload bytes that follow the header on the stream
    pub fn payload_len(&self) -> usize {
        match self.kind {
            RequestKind::Write => self.len as usize,
            _ => 0,
        }
    }

    /// Header plus payload
    pub fn frame_len(&self) -> usize {
        REQUEST_LEN + self.payload_len()
    }
}

// =============================================================================
// Reply
// =============================================================================

/// Reply header written back to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceReply {
    pub error: u32,
    pub handle: Handle,
}

impl DeviceReply {
    pub fn ok(handle: Handle) -> Self {
        Self { error: 0, handle }
    }

    pub fn put(&self, buf: &mut BytesMut) {
        buf.put_u32(REPLY_MAGIC);
        buf.put_u32(self.error);
        buf.put_slice(&self.handle);
    }

    /// Parse a reply header (the binding's side of the channel)
    pub fn parse(frame: &[u8]) -> Result<Self> {
        if frame.len() < REPLY_LEN {
            return Err(SanError::Truncated {
                expected: REPLY_LEN,
                actual: frame.len(),
            });
        }
        let magic = be_u32(&frame[0..4]);
        if magic != REPLY_MAGIC {
            return Err(SanError::BadMagic(magic));
        }
        let mut handle = [0u8; 8];
        handle.copy_from_slice(&frame[8..16]);
        Ok(Self {
            error: be_u32(&frame[4..8]),
            handle,
        })
    }
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
