//! Wire format for the peerlock protocol.
//!
//! Frames consist of a fixed 12-byte header (zero-copy binary) followed by a
//! variable-length CBOR payload. The header carries only what a reader needs
//! to delimit and dispatch a frame: magic, version, opcode and payload size.
//! The payload carries the protocol message itself.
//!
//! # Security
//!
//! All header parsing uses compile-time verified layouts via `zerocopy`. We
//! enforce a 1 MiB payload limit so a corrupt length field cannot make a
//! reader allocate unbounded memory. Decoding arbitrary bytes never panics.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod address;
pub mod errors;
pub mod frame;
pub mod header;
pub mod opcodes;
pub mod payloads;

pub use address::{AddressParseError, PeerAddress};
pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use opcodes::Opcode;
pub use payloads::Payload;

/// Process-wide unique node identifier.
pub type NodeId = u64;

/// Logical request timestamp.
pub type Timestamp = u64;
