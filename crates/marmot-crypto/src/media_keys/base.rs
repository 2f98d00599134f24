//! Media base key and the per-generation ratchet derived from it.
//!
//! The base key itself comes from the MLS exporter
//! (`MlsGroup::export_secret`), which this crate never calls directly: the
//! exporter takes a group reference that only `marmot-core` holds. This
//! module owns the label and context layout so both sides of that call
//! agree on it, plus everything downstream of the 32-byte base key.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

/// MLS exporter label for the media base key:
/// `MLS-Exporter("moq-media-base-v1", sender_leaf || track_label || be_u64(epoch), 32)`.
pub const MEDIA_BASE_KEY_LABEL: &str = "moq-media-base-v1";

/// Build the exporter context for a given sender, track and epoch.
///
/// Layout: `be_u32(sender_leaf) || track_label.as_bytes() || be_u64(epoch)`.
#[must_use]
pub fn media_base_key_context(sender_leaf: u32, track_label: &str, epoch: u64) -> Vec<u8> {
    let mut context = Vec::with_capacity(4 + track_label.len() + 8);
    context.extend_from_slice(&sender_leaf.to_be_bytes());
    context.extend_from_slice(track_label.as_bytes());
    context.extend_from_slice(&epoch.to_be_bytes());
    context
}

/// A generation's derived AEAD key and nonce salt.
///
/// `K_g = HKDF-Expand(base, "k" || g, 32)`, `N_salt_g = HKDF-Expand(base, "n"
/// || g, 12)`. Zeroized on drop; callers should let these fall out of scope
/// as soon as a frame is encrypted or decrypted.
#[derive(ZeroizeOnDrop)]
pub struct GenerationKeys {
    pub(crate) key: [u8; 32],
    pub(crate) nonce_salt: [u8; 12],
}

impl GenerationKeys {
    /// Derive `K_g` and `N_salt_g` for `generation` from a 32-byte media base
    /// key. `base` is already the output of the MLS exporter, so this is a
    /// bare HKDF-Expand with no extract step: the base key itself is the PRK.
    #[must_use]
    pub fn derive(base: &[u8; 32], generation: u8) -> Self {
        let hk = Hkdf::<Sha256>::from_prk(base)
            .unwrap_or_else(|_| Hkdf::<Sha256>::new(None, base));

        let mut key = [0u8; 32];
        let mut nonce_salt = [0u8; 12];
        // `expand` only fails when the requested length exceeds 255 *
        // hash_len, which 32 and 12 bytes never do.
        let _ = hk.expand(&[b'k', generation], &mut key);
        let _ = hk.expand(&[b'n', generation], &mut nonce_salt);

        Self { key, nonce_salt }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_layout_is_sender_track_epoch() {
        let context = media_base_key_context(3, "mic", 7);
        assert_eq!(&context[0..4], &3u32.to_be_bytes());
        assert_eq!(&context[4..7], b"mic");
        assert_eq!(&context[7..15], &7u64.to_be_bytes());
    }

    #[test]
    fn derivation_is_deterministic() {
        let base = [9u8; 32];
        let a = GenerationKeys::derive(&base, 2);
        let b = GenerationKeys::derive(&base, 2);
        assert_eq!(a.key, b.key);
        assert_eq!(a.nonce_salt, b.nonce_salt);
    }

    #[test]
    fn different_generations_produce_different_keys() {
        let base = [9u8; 32];
        let gen0 = GenerationKeys::derive(&base, 0);
        let gen1 = GenerationKeys::derive(&base, 1);
        assert_ne!(gen0.key, gen1.key);
        assert_ne!(gen0.nonce_salt, gen1.nonce_salt);
    }

    #[test]
    fn different_bases_produce_different_keys() {
        let gen_a = GenerationKeys::derive(&[1u8; 32], 0);
        let gen_b = GenerationKeys::derive(&[2u8; 32], 0);
        assert_ne!(gen_a.key, gen_b.key);
    }
}
