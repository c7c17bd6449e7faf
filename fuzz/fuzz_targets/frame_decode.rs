//! Frame and payload decoding must reject garbage without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use peerlock_proto::{Frame, FrameHeader, Payload};

fuzz_target!(|data: &[u8]| {
    let _ = FrameHeader::from_bytes(data);

    if let Ok(frame) = Frame::decode(data) {
        let mut encoded = Vec::new();
        if frame.encode(&mut encoded).is_ok() {
            assert_eq!(encoded.as_slice(), data);
        }

        if let Ok(payload) = Payload::from_frame(&frame) {
            // Whatever decodes must encode again.
            assert!(payload.into_frame().is_ok());
        }
    }
});
