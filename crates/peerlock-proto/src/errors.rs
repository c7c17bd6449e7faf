//! Protocol error types.

use thiserror::Error;

/// Result alias for wire-format operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Not enough bytes for the fixed header or declared payload
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Bytes required
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Header magic does not identify a peerlock frame
    #[error("invalid magic: {0:#010x}")]
    InvalidMagic(u32),

    /// Header version is not understood by this build
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Opcode does not map to a known message
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    /// Declared payload exceeds the hard limit
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Declared payload size
        size: usize,
        /// Maximum accepted payload size
        max: usize,
    },

    /// Header payload size disagrees with the attached payload
    #[error("payload size mismatch: header says {declared}, frame carries {actual}")]
    PayloadSizeMismatch {
        /// Size recorded in the header
        declared: usize,
        /// Size of the payload bytes
        actual: usize,
    },

    /// CBOR serialization failed
    #[error("cbor encode failed: {0}")]
    CborEncode(String),

    /// CBOR deserialization failed
    #[error("cbor decode failed: {0}")]
    CborDecode(String),
}
