//! Long-term secp256k1 identity: the key a client uses to sign events on the
//! signalling relay, and the same 32 bytes it binds into its MLS credential.
//!
//! Using one keypair for both roles means "who signed this relay event" and
//! "who owns this MLS leaf" are provably the same principal, without a
//! separate cross-signing step. See [`crate::mls::group::credential_for`].

use secp256k1::{Keypair, Message, Secp256k1, XOnlyPublicKey, rand::rngs::OsRng};

use crate::error::IdentityError;

/// A secp256k1 keypair used for BIP-340 Schnorr signing.
///
/// `Identity` is deliberately not `Clone`: the secret key should have exactly
/// one owner for the lifetime of a process.
pub struct Identity {
    keypair: Keypair,
}

impl Identity {
    /// Generate a fresh identity from OS entropy.
    #[must_use]
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let keypair = Keypair::new(&secp, &mut OsRng);
        Self { keypair }
    }

    /// Reconstruct an identity from a 32-byte secret, e.g. loaded from a
    /// session's persisted config. Idempotent: the same bytes always produce
    /// the same public key.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, IdentityError> {
        let secp = Secp256k1::new();
        let keypair =
            Keypair::from_seckey_slice(&secp, bytes).map_err(|_| IdentityError::InvalidSecretKey)?;
        Ok(Self { keypair })
    }

    /// This identity's x-only public key: the 32 bytes used as both the
    /// relay's `pubkey` field and the MLS credential identity.
    #[must_use]
    pub fn public_key(&self) -> [u8; 32] {
        let (xonly, _parity) = self.keypair.x_only_public_key();
        xonly.serialize()
    }

    /// Sign a 32-byte digest (e.g. a relay event id) with BIP-340 Schnorr.
    #[must_use]
    pub fn sign(&self, digest: [u8; 32]) -> [u8; 64] {
        let secp = Secp256k1::new();
        let message = Message::from_digest(digest);
        let sig = secp.sign_schnorr(&message, &self.keypair);
        sig.serialize()
    }
}

/// Verify a BIP-340 Schnorr signature against an x-only public key.
pub fn verify(pubkey: &[u8; 32], digest: [u8; 32], sig: &[u8; 64]) -> Result<(), IdentityError> {
    let secp = Secp256k1::verification_only();
    let xonly = XOnlyPublicKey::from_slice(pubkey).map_err(|_| IdentityError::InvalidPublicKey)?;
    let message = Message::from_digest(digest);
    let signature =
        secp256k1::schnorr::Signature::from_slice(sig).map_err(|_| IdentityError::InvalidSignature)?;
    secp.verify_schnorr(&signature, &message, &xonly).map_err(|_| IdentityError::InvalidSignature)
}
