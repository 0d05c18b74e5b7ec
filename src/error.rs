//! Error types for sanblk
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using SanError
pub type Result<T> = std::result::Result<T, SanError>;

/// Unified error type for sanblk operations
#[derive(Debug, Error)]
pub enum SanError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Wire Codec Errors
    // -------------------------------------------------------------------------
    #[error("Truncated message: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Unexpected opcode: expected 0x{expected:02x}, got 0x{found:02x}")]
    UnexpectedOpcode { expected: u8, found: u8 },

    #[error("Invalid length exponent: {0} (must be between 9 and 15)")]
    InvalidExponent(u8),

    #[error("Partition identifier too long: {0} bytes (max 64)")]
    IdentifierTooLong(usize),

    // -------------------------------------------------------------------------
    // Device Channel Errors
    // -------------------------------------------------------------------------
    #[error("Wrong request magic: 0x{0:08x}")]
    BadMagic(u32),

    #[error("Offset must be a 512b sector between 0 and 2TB: {0}")]
    InvalidOffset(u64),

    #[error("Size must be a power of two between 512 and 32768: {0}")]
    InvalidLength(u64),

    #[error("Device protocol error: {0}")]
    DeviceProtocol(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
