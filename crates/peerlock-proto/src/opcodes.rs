//! Message opcodes.
//!
//! Membership traffic lives in `0x0_`, mutual-exclusion traffic in `0x1_`.

/// Frame opcode identifying the payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Announce a node to an existing peer
    Join = 0x01,
    /// Reciprocal registration, carrying the sender's known peers
    JoinAck = 0x02,
    /// Liveness ping
    Heartbeat = 0x03,
    /// Request for the critical section
    Request = 0x10,
    /// Answer to a request
    Response = 0x11,
}

impl Opcode {
    /// Parse from the raw header byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Join),
            0x02 => Some(Self::JoinAck),
            0x03 => Some(Self::Heartbeat),
            0x10 => Some(Self::Request),
            0x11 => Some(Self::Response),
            _ => None,
        }
    }

    /// Raw header byte.
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}
