//! # sanblk
//!
//! Client for a UDP storage-area-network protocol, with:
//! - Broadcast discovery of storage nodes and partition resolution
//! - Disk and partition metadata queries
//! - Single-sector reads and power-of-two writes
//! - A block-device proxy serving `/dev/nbdX` from a remote partition
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       sanblk CLI                             │
//! │          (listall / resolve / read / write / attach)         │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//!                ▼                              ▼
//!   ┌─────────────────────────┐    ┌─────────────────────────┐
//!   │         Client          │    │          Proxy          │
//!   │ (one request at a time) │    │  (mio, many in flight)  │
//!   └────────────┬────────────┘    └──────┬───────────┬──────┘
//!                │                        │           │
//!                ▼                        ▼           ▼
//!   ┌─────────────────────────────────────────┐ ┌───────────┐
//!   │   Protocol codec + Sequence allocator    │ │  Device   │
//!   │          (UDP, port 20001)               │ │ (NBD I/O) │
//!   └─────────────────────────────────────────┘ └───────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod sequence;
pub mod network;
pub mod device;
pub mod proxy;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{SanError, Result};
pub use config::Config;
pub use network::Client;
pub use sequence::Sequencer;
#[cfg(unix)]
pub use proxy::Proxy;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of sanblk
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
