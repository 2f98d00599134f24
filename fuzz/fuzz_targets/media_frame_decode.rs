//! Fuzz target for `MediaFrame::decode`.
//!
//! Arbitrary byte sequences through the wire decoder for media frames. The
//! decoder must never panic: it only ever splits a counter prefix off the
//! front of a byte slice, so the only failure mode is a truncated input.

#![no_main]

use libfuzzer_sys::fuzz_target;
use marmot_proto::MediaFrame;

fuzz_target!(|data: &[u8]| {
    match MediaFrame::decode(data) {
        Ok(frame) => {
            // Whatever decoded must re-encode to the same bytes we started
            // from restricted to counter + ciphertext, with no truncation.
            let re_encoded = frame.to_bytes();
            assert_eq!(re_encoded, data);
        }
        Err(_) => {
            // Truncated input (fewer than 4 bytes) is the only decode
            // failure mode; anything else would be a bug.
            assert!(data.len() < 4);
        }
    }
});
