//! Protocol Module
//!
//! Fixed-layout messages of the storage node wire protocol.
//!
//! ## Header (every message)
//! ```text
//! ┌──────────┬──────────┬─────────────────────┐
//! │ Cmd (1)  │ Exp (1)  │  Seq (2, BE, 15 bit) │
//! └──────────┴──────────┴─────────────────────┘
//! ```
//! `Exp` is the payload length exponent: payload = 2^Exp bytes, 9..=15.
//!
//! ### Block-addressed shape (GET, PUT, PUT_RESPONSE, GET_RESPONSE)
//! ```text
//! ┌────────┬──────────┬──────────┬──────┬────────────┬──────┬──────┐
//! │ Hdr(4) │ rsvd(12) │ IPv4 (4) │ r(2) │ Sector (4) │ r(1) │ Info │
//! └────────┴──────────┴──────────┴──────┴────────────┴──────┴──────┘
//! ```
//! PUT and data-carrying GET_RESPONSE append 2^Exp payload bytes. The
//! metadata variants of GET_RESPONSE append a 512 byte disk or partition
//! record.
//!
//! ### Opcodes
//! - 0x00: GET               - 0x01: PUT
//! - 0x04: PUT_RESPONSE      - 0x0d: FIND
//! - 0x0e: FIND_RESPONSE     - 0x0f: RESOLVE
//! - 0x10: RESOLVE_RESPONSE  - 0x11: GET_RESPONSE
//! - 0x13: IDENTIFY
//!
//! Reserved regions are zero-filled on send and never inspected on receive.

mod command;
mod response;
mod codec;

pub use command::{Opcode, Header, LengthExponent, BlockRef, Find, Identify, Resolve, Get, Put};
pub use response::{FindResponse, ResolveResponse, DiskInfo, PartitionInfo, DataResponse, PutResponse};
pub use codec::{WireMessage, get_u48, put_u48, sectors_to_bytes, HEADER_LEN, SECTOR_SHIFT, SECTOR_SIZE};
