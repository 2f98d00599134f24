//! Wire layout for audio frames carried on a MoQ audio track.
//!
//! `u32 big-endian frame_counter || AEAD(K_g, nonce, plaintext, AAD)`. This
//! module only handles the outer framing (splitting/joining the counter and
//! the AEAD output); the AEAD itself lives in `marmot-crypto`.

use bytes::{BufMut, Bytes};

use crate::error::{ProtocolError, Result};

/// Size of the frame counter prefix.
pub const COUNTER_SIZE: usize = 4;

/// An encoded media frame: a 32-bit counter followed by AEAD ciphertext+tag.
///
/// # Invariants
///
/// - `ciphertext` is opaque here; it already includes the AEAD authentication
///   tag. This type does not decrypt or verify anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFrame {
    /// Per-track 32-bit frame counter. High byte selects the key generation.
    pub counter: u32,

    /// AEAD ciphertext, tag included.
    pub ciphertext: Bytes,
}

impl MediaFrame {
    /// Build a frame from its parts.
    #[must_use]
    pub fn new(counter: u32, ciphertext: impl Into<Bytes>) -> Self {
        Self { counter, ciphertext: ciphertext.into() }
    }

    /// Generation selected by this frame's counter (high byte of `counter`).
    #[must_use]
    pub fn generation(&self) -> u8 {
        (self.counter >> 24) as u8
    }

    /// 24-bit intra-generation counter (low three bytes of `counter`).
    #[must_use]
    pub fn intra_generation_counter(&self) -> u32 {
        self.counter & 0x00FF_FFFF
    }

    /// Encode as `[counter: 4 bytes BE][ciphertext]`.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u32(self.counter);
        dst.put_slice(&self.ciphertext);
    }

    /// Encode to a freshly allocated buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(COUNTER_SIZE + self.ciphertext.len());
        self.encode(&mut buf);
        buf
    }

    /// Decode `[counter: 4 bytes BE][ciphertext]`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FrameTruncated`] if `bytes` is shorter than
    /// [`COUNTER_SIZE`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < COUNTER_SIZE {
            return Err(ProtocolError::FrameTruncated { expected: COUNTER_SIZE, actual: bytes.len() });
        }

        let mut counter_bytes = [0u8; COUNTER_SIZE];
        counter_bytes.copy_from_slice(&bytes[..COUNTER_SIZE]);
        let counter = u32::from_be_bytes(counter_bytes);

        Ok(Self { counter, ciphertext: Bytes::copy_from_slice(&bytes[COUNTER_SIZE..]) })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn round_trip() {
        let frame = MediaFrame::new(0x0102_0304, vec![9u8; 20]);
        let wire = frame.to_bytes();
        let decoded = MediaFrame::decode(&wire).expect("decodes");
        assert_eq!(frame, decoded);
    }

    #[test]
    fn generation_is_high_byte() {
        let frame = MediaFrame::new(0x0200_0005, Vec::new());
        assert_eq!(frame.generation(), 2);
        assert_eq!(frame.intra_generation_counter(), 5);
    }

    #[test]
    fn rejects_truncated_frame() {
        let err = MediaFrame::decode(&[0, 1]).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTruncated { expected: 4, actual: 2 }));
    }

    proptest! {
        #[test]
        fn round_trip_arbitrary(counter in any::<u32>(), ciphertext in proptest::collection::vec(any::<u8>(), 0..256)) {
            let frame = MediaFrame::new(counter, ciphertext);
            let wire = frame.to_bytes();
            let decoded = MediaFrame::decode(&wire).expect("decodes");
            prop_assert_eq!(frame, decoded);
        }
    }
}
