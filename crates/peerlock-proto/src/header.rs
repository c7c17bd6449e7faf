//! Fixed-size frame header.
//!
//! ```text
//!  0               4       5       6               8               12
//!  ├───────────────┼───────┼───────┼───────────────┼───────────────┤
//!  │ magic "PLK1"  │  ver  │ opcode│   reserved    │ payload size  │
//!  └───────────────┴───────┴───────┴───────────────┴───────────────┘
//! ```
//!
//! All multi-byte fields are big-endian.

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::big_endian::{U16, U32},
};

use crate::{
    Opcode,
    errors::{ProtocolError, Result},
};

/// Frame header preceding every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct FrameHeader {
    magic: U32,
    version: u8,
    opcode: u8,
    reserved: U16,
    payload_size: U32,
}

impl FrameHeader {
    /// Encoded header size in bytes.
    pub const SIZE: usize = 12;

    /// "PLK1"
    pub const MAGIC: u32 = 0x504C_4B31;

    /// Current wire version.
    pub const VERSION: u8 = 1;

    /// Largest payload a reader will accept.
    pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

    /// Create a header for `opcode` with an empty payload.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            magic: U32::new(Self::MAGIC),
            version: Self::VERSION,
            opcode: opcode.to_u8(),
            reserved: U16::new(0),
            payload_size: U32::new(0),
        }
    }

    /// Parse and validate a header from the start of `bytes`.
    ///
    /// Trailing bytes after the header are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let (header, _rest) = Self::ref_from_prefix(bytes).map_err(|_| {
            ProtocolError::FrameTooShort { expected: Self::SIZE, actual: bytes.len() }
        })?;
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> Result<()> {
        if self.magic.get() != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic(self.magic.get()));
        }
        if self.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(self.version));
        }
        let size = self.payload_size();
        if size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge { size, max: Self::MAX_PAYLOAD_SIZE });
        }
        Ok(())
    }

    /// Serialize to a fixed byte array.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }

    /// Raw opcode byte.
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Opcode, if known.
    pub fn opcode_enum(&self) -> Option<Opcode> {
        Opcode::from_u8(self.opcode)
    }

    /// Protocol version.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Payload length in bytes.
    pub fn payload_size(&self) -> usize {
        self.payload_size.get() as usize
    }

    /// Set the payload length.
    pub fn set_payload_size(&mut self, size: u32) {
        self.payload_size = U32::new(size);
    }
}
