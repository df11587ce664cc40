//! Fuzz target for InboundFrame::decode
//!
//! Relay frames are untrusted text. Decoding must never panic: every
//! malformed input returns an error, and every accepted message frame
//! encodes back to a frame that decodes to the same value.

#![no_main]

use courier_proto::InboundFrame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|text: &str| {
    if let Ok(frame @ InboundFrame::Message(_)) = InboundFrame::decode(text) {
        let encoded = frame.encode().expect("message frames always encode");
        assert_eq!(InboundFrame::decode(&encoded).ok(), Some(frame));
    }
});
