//! Typed frame payloads.
//!
//! The opcode in the header selects which struct the CBOR payload decodes
//! into, so payload structs carry no type tag of their own.

pub mod membership;
pub mod mutex;

use serde::{Serialize, de::DeserializeOwned};

pub use self::{
    membership::{Heartbeat, Join, JoinAck, PeerInfo},
    mutex::{Request, Response},
};
use crate::{Frame, FrameHeader, NodeId, Opcode, ProtocolError, Result};

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Announce a node
    Join(Join),
    /// Reciprocal registration
    JoinAck(JoinAck),
    /// Liveness ping
    Heartbeat(Heartbeat),
    /// Critical-section request
    Request(Request),
    /// Answer to a request
    Response(Response),
}

impl Payload {
    /// Opcode for this payload.
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Join(_) => Opcode::Join,
            Self::JoinAck(_) => Opcode::JoinAck,
            Self::Heartbeat(_) => Opcode::Heartbeat,
            Self::Request(_) => Opcode::Request,
            Self::Response(_) => Opcode::Response,
        }
    }

    /// Id of the node that sent this payload.
    pub fn sender(&self) -> NodeId {
        match self {
            Self::Join(m) => m.id,
            Self::JoinAck(m) => m.id,
            Self::Heartbeat(m) => m.id,
            Self::Request(m) => m.id,
            Self::Response(m) => m.id,
        }
    }

    /// Encode into a frame.
    pub fn into_frame(self) -> Result<Frame> {
        let body = match &self {
            Self::Join(m) => to_cbor(m)?,
            Self::JoinAck(m) => to_cbor(m)?,
            Self::Heartbeat(m) => to_cbor(m)?,
            Self::Request(m) => to_cbor(m)?,
            Self::Response(m) => to_cbor(m)?,
        };

        if body.len() > FrameHeader::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: body.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE,
            });
        }

        Ok(Frame::new(FrameHeader::new(self.opcode()), body))
    }

    /// Decode the payload of `frame` according to its opcode.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or_else(|| ProtocolError::UnknownOpcode(frame.header.opcode()))?;
        let bytes = frame.payload.as_ref();

        let payload = match opcode {
            Opcode::Join => Self::Join(from_cbor(bytes)?),
            Opcode::JoinAck => Self::JoinAck(from_cbor(bytes)?),
            Opcode::Heartbeat => Self::Heartbeat(from_cbor(bytes)?),
            Opcode::Request => Self::Request(from_cbor(bytes)?),
            Opcode::Response => Self::Response(from_cbor(bytes)?),
        };
        Ok(payload)
    }
}

fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;
    Ok(buf)
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PeerAddress;

    fn through_wire(payload: Payload) -> Payload {
        let frame = payload.into_frame().unwrap();
        let mut buf = Vec::new();
        frame.encode(&mut buf).unwrap();
        let decoded = Frame::decode(&buf).unwrap();
        Payload::from_frame(&decoded).unwrap()
    }

    #[test]
    fn join_ack_carries_peer_list() {
        let ack = Payload::JoinAck(JoinAck {
            id: 1,
            address: PeerAddress::new("alpha", 7000),
            peers: vec![
                PeerInfo { id: 2, address: PeerAddress::new("beta", 7000) },
                PeerInfo { id: 3, address: PeerAddress::new("gamma", 7001) },
            ],
        });

        assert_eq!(through_wire(ack.clone()), ack);
    }

    #[test]
    fn response_keeps_grant_and_timestamp() {
        let response = Payload::Response(Response { id: 2, granted: true, timestamp: 41 });
        let decoded = through_wire(response);

        assert_eq!(decoded.opcode(), Opcode::Response);
        assert_eq!(decoded.sender(), 2);
        assert_eq!(decoded, Payload::Response(Response { id: 2, granted: true, timestamp: 41 }));
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let mut header = FrameHeader::new(Opcode::Heartbeat);
        let mut raw = header.to_bytes();
        raw[5] = 0x7f;
        header = *FrameHeader::from_bytes(&raw).unwrap();

        let frame = Frame::new(header, Vec::new());
        assert_eq!(Payload::from_frame(&frame), Err(ProtocolError::UnknownOpcode(0x7f)));
    }

    #[test]
    fn mismatched_body_is_a_decode_error() {
        let heartbeat = Payload::Heartbeat(Heartbeat { id: 5 }).into_frame().unwrap();
        let frame = Frame::new(FrameHeader::new(Opcode::Join), heartbeat.payload);

        assert!(matches!(Payload::from_frame(&frame), Err(ProtocolError::CborDecode(_))));
    }
}
