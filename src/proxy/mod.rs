//! Block-Device Proxy Module
//!
//! Serves a kernel block device from a remote partition.
//!
//! ## Architecture
//! ```text
//!  device channel ──► Dispatcher::ingest ──► GET / PUT ──► node
//!        ▲                    │
//!        │                    ▼
//!     replies ◄── Dispatcher::complete ◄── Ledger ◄── responses
//! ```
//! - Requests are forwarded as soon as they are complete; any number may be
//!   in flight
//! - Each one stays in the `Ledger` until a valid response arrives and is
//!   resent unchanged every retry interval until then
//! - Replies are queued and written whenever the device accepts bytes, so
//!   a slow reader never stalls the socket

mod ledger;
mod dispatcher;
#[cfg(unix)]
mod event_loop;

pub use ledger::{Ledger, Outstanding, WireSink};
pub use dispatcher::{Completion, Dispatcher, Flow};
#[cfg(unix)]
pub use event_loop::Proxy;
