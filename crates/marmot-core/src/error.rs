//! Error types for identity and MLS group operations.
//!
//! Two enums, one per seam: [`IdentityError`] for secp256k1 key handling,
//! [`MlsError`] for everything the MLS group state machine can fail on.
//! `MlsError` classifies failures into fatal and transient so that callers
//! (the bootstrap handshake, the per-group controller) know which ones are
//! worth retrying.

use thiserror::Error;

/// Errors from secp256k1 key material and Schnorr signing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// The supplied bytes are not a valid secp256k1 secret key.
    #[error("invalid secp256k1 secret key")]
    InvalidSecretKey,

    /// The supplied bytes are not a valid x-only public key.
    #[error("invalid secp256k1 x-only public key")]
    InvalidPublicKey,

    /// Schnorr signature verification failed.
    #[error("schnorr signature verification failed")]
    InvalidSignature,
}

/// Errors from MLS group operations.
///
/// Fatal variants indicate a broken or malicious peer, a corrupted local
/// credential, or removal from the group: retrying will not help. Transient
/// variants indicate the message arrived out of causal order and may
/// succeed once the missing state (a proposal, an earlier commit) arrives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MlsError {
    /// A credential's identity bytes don't decode to a valid member key.
    #[error("malformed credential: {0}")]
    MalformedCredential(String),

    /// An MLS library operation failed (key schedule, tree math, AEAD).
    #[error("mls crypto operation failed: {0}")]
    Crypto(String),

    /// A wire message failed to (de)serialize.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// This client has been removed from the group by a commit.
    #[error("removed from group: {0}")]
    RemovedFromGroup(String),

    /// The member referenced by an operation is not on the current roster.
    #[error("member not found in group: {0}")]
    MemberNotFound(String),

    /// A wrapper could not be processed right now.
    ///
    /// `transient` distinguishes "try again once more state has arrived"
    /// (out-of-order ciphertext, a commit referencing an unseen proposal)
    /// from a permanent rejection (signature invalid, stale epoch on a
    /// welcome).
    #[error("unprocessable wrapper: {reason}")]
    Unprocessable {
        /// Human-readable reason, surfaced in logs and `AppEvent::Error`.
        reason: String,
        /// Whether a retry after further progress might succeed.
        transient: bool,
    },

    /// Identity key handling failed while binding a credential.
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

impl MlsError {
    /// Whether this error may succeed on retry once more state has arrived.
    ///
    /// Mirrors the fatal/transient split the handshake and controller use to
    /// decide whether to surface an error to the user or wait quietly.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unprocessable { transient: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unprocessable_transient_flag_round_trips() {
        let transient =
            MlsError::Unprocessable { reason: "future epoch".to_string(), transient: true };
        assert!(transient.is_transient());

        let fatal =
            MlsError::Unprocessable { reason: "bad signature".to_string(), transient: false };
        assert!(!fatal.is_transient());
    }

    #[test]
    fn other_variants_are_never_transient() {
        assert!(!MlsError::MalformedCredential("x".to_string()).is_transient());
        assert!(!MlsError::RemovedFromGroup("x".to_string()).is_transient());
        assert!(!MlsError::MemberNotFound("x".to_string()).is_transient());
    }
}
