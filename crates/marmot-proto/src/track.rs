//! MoQ track path construction.
//!
//! Track names are plain UTF-8 strings; this module is the single place that
//! formats them so the layout in the design stays in one spot. Construction
//! here never touches cryptography — `group_root` is the group's stable
//! 32-byte MLS group identifier, hex-encoded upstream by
//! `marmot_core::mls::MlsGroup::derive_group_root` (not a per-epoch secret,
//! so it stays constant across commits).

/// Stable transport path prefix for a group: `marmot/<hex>`.
#[must_use]
pub fn group_root(group_root_hex: &str) -> String {
    format!("marmot/{group_root_hex}")
}

/// Per-member text (control) track: `<G>/wrappers/<pubkey>`.
#[must_use]
pub fn wrappers_track(root: &str, pubkey_hex: &str) -> String {
    format!("{root}/wrappers/{pubkey_hex}")
}

/// Per-member audio track: `<G>/audio/<pubkey>/<trackLabel>`.
#[must_use]
pub fn audio_track(root: &str, pubkey_hex: &str, track_label: &str) -> String {
    format!("{root}/audio/{pubkey_hex}/{track_label}")
}

/// A MoQ position: the group-paging index and the object index within it.
///
/// This pair is attached to every delivered frame and is what the media AAD
/// (`marmot_crypto::aad`) binds against; it is not itself cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackPosition {
    /// MoQ group-paging index.
    pub group_seq: u64,
    /// Index of the frame within `group_seq`.
    pub frame_idx: u64,
}

impl TrackPosition {
    /// Whether this position opens a new generation's keyframe (`frame_idx == 0`).
    #[must_use]
    pub fn is_keyframe(&self) -> bool {
        self.frame_idx == 0
    }
}
