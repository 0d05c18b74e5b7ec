//! Network Module
//!
//! UDP socket setup and the blocking request/response client.
//!
//! ## Architecture
//! - One socket per process, bound to the protocol port
//! - `Client` owns it for blocking transactions (discovery, queries,
//!   resolution, single-shot I/O)
//! - The socket can then be handed to the block-device proxy, which never
//!   shares it with a client

mod socket;
mod discovery;
mod client;

pub use socket::open_socket;
pub use discovery::{CollectionWindow, DiskSet};
pub use client::{load_write_payload, sector_of, Client, Expected, PartitionAddress, Reply, MAX_DATAGRAM};
