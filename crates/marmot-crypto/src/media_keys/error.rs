//! Errors from media key derivation and AEAD framing.

use thiserror::Error;

/// Errors from deriving generation keys or framing an audio packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaCryptoError {
    /// AEAD authentication failed on decrypt: tampered ciphertext, wrong key,
    /// or a generation/epoch that has aged out of the retention cache.
    #[error("media frame authentication failed")]
    DecryptionFailed,

    /// The underlying AEAD rejected an encryption request (malformed input
    /// lengths; the primitive itself has no other failure mode).
    #[error("media frame encryption failed")]
    EncryptionFailed,

    /// No key material is cached for this generation; either it was never
    /// derived or it aged out of the retention window.
    #[error("no cached key material for generation {0}")]
    UnknownGeneration(u8),

    /// The epoch referenced by an inbound frame is neither the current nor
    /// the immediately preceding (still-retained) epoch.
    #[error("epoch {requested} is not current ({current}) or retained")]
    StaleEpoch {
        /// Epoch carried by the frame.
        requested: u64,
        /// Schedule's current epoch.
        current: u64,
    },

    /// The caller attempted to encrypt with an intra-generation counter that
    /// was already issued for this generation, which would reuse a nonce.
    #[error("counter {counter} already issued for generation {generation}")]
    CounterReuse {
        /// The generation the counter belongs to.
        generation: u8,
        /// The reused counter value.
        counter: u32,
    },
}
