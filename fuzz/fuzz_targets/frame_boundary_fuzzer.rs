//! Fuzz target for `MediaFrame` counter boundary conditions.
//!
//! Exercises the generation/intra-generation split at the edges a real
//! stream will actually hit: the high-byte rollover between generation 0
//! and 1, the all-ones and all-zeros counters, and arbitrary counters paired
//! with arbitrary ciphertext lengths.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use marmot_proto::MediaFrame;

#[derive(Debug, Arbitrary)]
struct Input {
    counter: u32,
    ciphertext: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let frame = MediaFrame::new(input.counter, input.ciphertext.clone());

    // Generation is always the high byte; intra-generation counter is
    // always the low 24 bits. These must never panic and must recombine to
    // the original counter.
    let generation = frame.generation();
    let intra = frame.intra_generation_counter();
    assert_eq!(u32::from(generation) << 24 | intra, input.counter);
    assert!(intra <= 0x00FF_FFFF);

    let wire = frame.to_bytes();
    let decoded = MediaFrame::decode(&wire).expect("well-formed frame always decodes");
    assert_eq!(decoded, frame);
    assert_eq!(decoded.ciphertext.len(), input.ciphertext.len());
});
