//! Associated-data layout for media frame AEAD.
//!
//! `0x01 || utf8(group_root) || utf8(track_label) || u64(epoch) ||
//! u64(group_seq) || u64(frame_idx) || u8(keyframe?)`
//!
//! The leading `0x01` is an AAD format version; changing any field below
//! changes the byte layout and therefore breaks authentication against old
//! frames, which is the point — it is how replay across tracks, groups, or
//! epochs is made to fail the AEAD tag instead of silently decrypting.

use crate::track::TrackPosition;

/// AAD format version. Bump if the layout below changes.
pub const AAD_VERSION: u8 = 0x01;

/// Build the AAD for one media frame.
#[must_use]
pub fn build_media_aad(
    group_root: &str,
    track_label: &str,
    epoch: u64,
    position: TrackPosition,
) -> Vec<u8> {
    let mut aad = Vec::with_capacity(
        1 + group_root.len() + track_label.len() + 8 + 8 + 8 + 1,
    );

    aad.push(AAD_VERSION);
    aad.extend_from_slice(group_root.as_bytes());
    aad.extend_from_slice(track_label.as_bytes());
    aad.extend_from_slice(&epoch.to_be_bytes());
    aad.extend_from_slice(&position.group_seq.to_be_bytes());
    aad.extend_from_slice(&position.frame_idx.to_be_bytes());
    aad.push(u8::from(position.is_keyframe()));

    aad
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn differs_on_track_or_epoch() {
        let position = TrackPosition { group_seq: 1, frame_idx: 0 };
        let a = build_media_aad("marmot/deadbeef", "mic", 3, position);
        let b = build_media_aad("marmot/deadbeef", "mic", 4, position);
        let c = build_media_aad("marmot/deadbeef", "camera", 3, position);
        let d = build_media_aad("marmot/cafebabe", "mic", 3, position);

        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn keyframe_flag_is_last_byte() {
        let key = build_media_aad(
            "marmot/aa",
            "mic",
            0,
            TrackPosition { group_seq: 0, frame_idx: 0 },
        );
        let non_key = build_media_aad(
            "marmot/aa",
            "mic",
            0,
            TrackPosition { group_seq: 0, frame_idx: 1 },
        );
        assert_eq!(*key.last().unwrap(), 1);
        assert_eq!(*non_key.last().unwrap(), 0);
    }

    #[test]
    fn starts_with_version_byte() {
        let aad =
            build_media_aad("marmot/aa", "mic", 0, TrackPosition { group_seq: 0, frame_idx: 0 });
        assert_eq!(aad[0], AAD_VERSION);
    }
}
