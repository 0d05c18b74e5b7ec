//! Configuration for sanblk
//!
//! Centralized configuration with the protocol's default timings.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

/// Well-known UDP port every node listens on
pub const DEFAULT_PORT: u16 = 20001;

/// Main configuration for a client or proxy instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Socket Configuration
    // -------------------------------------------------------------------------
    /// Port nodes are addressed on
    pub port: u16,

    /// Local address the UDP socket binds to
    pub bind_addr: SocketAddrV4,

    /// Destination for discovery and resolution broadcasts
    pub broadcast_addr: SocketAddrV4,

    /// Network interface to bind the socket to (Linux only)
    pub interface: Option<String>,

    /// Requested send/receive buffer size in bytes
    pub socket_buffer_size: usize,

    // -------------------------------------------------------------------------
    // Transaction Timing
    // -------------------------------------------------------------------------
    /// Deadline for discovery, metadata queries and resolution (milliseconds)
    pub query_timeout_ms: u64,

    /// Deadline for single-shot reads and writes (milliseconds)
    pub io_timeout_ms: u64,

    /// Discovery window after each reply (milliseconds)
    pub discovery_settle_ms: u64,

    // -------------------------------------------------------------------------
    // Proxy Timing
    // -------------------------------------------------------------------------
    /// Resubmission cadence for outstanding requests (milliseconds)
    pub retry_interval_ms: u64,

    /// Floor on the proxy's poll timeout (milliseconds)
    pub min_poll_wait_ms: u64,

    // -------------------------------------------------------------------------
    // Block Device Binding
    // -------------------------------------------------------------------------
    /// Block size exponent announced to the kernel (12 = 4096 bytes)
    pub nbd_block_size_power: u8,

    /// Request size cap written to the device's sysfs queue settings
    pub max_sectors_kb: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_addr: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT),
            broadcast_addr: SocketAddrV4::new(Ipv4Addr::BROADCAST, DEFAULT_PORT),
            interface: None,
            socket_buffer_size: 8 * 1024 * 1024, // 8 MB
            query_timeout_ms: 1000,
            io_timeout_ms: 10_000,
            discovery_settle_ms: 100,
            retry_interval_ms: 1000,
            min_poll_wait_ms: 100,
            nbd_block_size_power: 12,
            max_sectors_kb: 8,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn discovery_settle(&self) -> Duration {
        Duration::from_millis(self.discovery_settle_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn min_poll_wait(&self) -> Duration {
        Duration::from_millis(self.min_poll_wait_ms)
    }

    /// Address of a node given its IPv4 address
    pub fn node_addr(&self, ip: Ipv4Addr) -> SocketAddrV4 {
        SocketAddrV4::new(ip, self.port)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the node port (also applied to the bind and broadcast addresses)
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self.config.bind_addr.set_port(port);
        self.config.broadcast_addr.set_port(port);
        self
    }

    /// Set the local bind address
    pub fn bind_addr(mut self, addr: SocketAddrV4) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Set the broadcast destination
    pub fn broadcast_addr(mut self, addr: SocketAddrV4) -> Self {
        self.config.broadcast_addr = addr;
        self
    }

    /// Bind the socket to a named network interface
    pub fn interface(mut self, name: impl Into<String>) -> Self {
        self.config.interface = Some(name.into());
        self
    }

    /// Set the socket buffer size (in bytes)
    pub fn socket_buffer_size(mut self, size: usize) -> Self {
        self.config.socket_buffer_size = size;
        self
    }

    /// Set the query timeout (in milliseconds)
    pub fn query_timeout_ms(mut self, ms: u64) -> Self {
        self.config.query_timeout_ms = ms;
        self
    }

    /// Set the read/write timeout (in milliseconds)
    pub fn io_timeout_ms(mut self, ms: u64) -> Self {
        self.config.io_timeout_ms = ms;
        self
    }

    /// Set the discovery settle window (in milliseconds)
    pub fn discovery_settle_ms(mut self, ms: u64) -> Self {
        self.config.discovery_settle_ms = ms;
        self
    }

    /// Set the resubmission interval (in milliseconds)
    pub fn retry_interval_ms(mut self, ms: u64) -> Self {
        self.config.retry_interval_ms = ms;
        self
    }

    /// Set the minimum poll wait (in milliseconds)
    pub fn min_poll_wait_ms(mut self, ms: u64) -> Self {
        self.config.min_poll_wait_ms = ms;
        self
    }

    /// Set the block size exponent for the kernel binding
    pub fn nbd_block_size_power(mut self, power: u8) -> Self {
        self.config.nbd_block_size_power = power;
        self
    }

    /// Set the kernel request size cap (in KB)
    pub fn max_sectors_kb(mut self, kb: u32) -> Self {
        self.config.max_sectors_kb = kb;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
