//! Media key schedule and AEAD framing.
//!
//! Pure, deterministic functions plus one stateful type
//! ([`media_keys::MediaKeySchedule`]) wrapping them: everything in here is a
//! function of its explicit inputs, never of ambient clocks or randomness,
//! so tests drive it with fixed vectors and callers supply their own notion
//! of "now".
//!
//! # Key hierarchy
//!
//! Per (sender leaf, track, epoch), a 32-byte base key comes from the MLS
//! exporter (owned by `marmot-core`, which is the only crate that talks to
//! the MLS library). From that base key, this crate derives one AEAD key and
//! nonce salt per generation, and frames/unframes ciphertext with them.
//!
//! ```text
//! MLS Exporter("moq-media-base-v1", sender || track || epoch, 32)
//!        │
//!        ▼
//! base key (32 bytes)
//!        │
//!        ▼
//! HKDF-Expand("k" || g) / ("n" || g)  →  K_g, N_salt_g   (per generation g)
//!        │
//!        ▼
//! ChaCha20-Poly1305(K_g, N_salt_g XOR counter, plaintext, AAD)
//! ```
//!
//! # Security
//!
//! Forward secrecy: an MLS commit rotates the epoch and, with it, every
//! derived base key; generation keys for a retired epoch are held only long
//! enough to absorb reorder, then purged.
//!
//! Nonce safety: the 96-bit nonce is a deterministic function of generation
//! and a 24-bit intra-generation counter, never chosen at random, so reuse
//! is prevented structurally by refusing to re-issue a counter within an
//! epoch rather than by entropy.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod media_keys;

pub use media_keys::{
    GenerationKeys, MEDIA_BASE_KEY_LABEL, MediaCryptoError, MediaKeySchedule, build_nonce,
    decrypt_audio_frame, encrypt_audio_frame, media_base_key_context,
};
