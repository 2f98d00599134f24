//! Signalling-relay wire types: signed events and bootstrap envelopes.
//!
//! The bootstrap handshake (see `marmot-client`) never touches a network
//! socket directly — it exchanges [`SignedEvent`]s through whatever relay
//! client the host provides. This module only defines the shapes and the
//! canonical hash used to compute an event's id; signing and verification
//! live with the identity that owns the key (`marmot-core`), not here.
//!
//! # Security
//!
//! - Event ids are a hash over a fixed, order-sensitive tuple of fields
//!   (pubkey, created_at, kind, tags, content). Two events with the same id
//!   are therefore guaranteed to have identical content, which is what makes
//!   relay-side deduplication by id safe.
//! - This module performs no signature verification. A `SignedEvent` with a
//!   garbage `sig` field deserializes just fine; callers MUST verify before
//!   trusting `pubkey` as the author.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ProtocolError, Result};

/// A signed event on the signalling relay.
///
/// Shape mirrors a Nostr-style signed event: a reserved `kind`, a tag list
/// used for relay-side filtering without touching `content`, and a JSON
/// `content` body carrying the actual [`HandshakeEnvelope`].
///
/// # Invariants
///
/// - `id` MUST equal [`SignedEvent::compute_id`] over the other fields; this
///   is enforced by [`SignedEvent::new`] and checked by
///   [`SignedEvent::verify_id`].
/// - `sig` is a 64-byte Schnorr (BIP-340) signature over `id`; verifying it is
///   the caller's responsibility (see `marmot_core::identity`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEvent {
    /// Event id: sha256 over the canonical serialization of the fields below.
    pub id: [u8; 32],

    /// x-only secp256k1 public key of the signer.
    pub pubkey: [u8; 32],

    /// Unix seconds at creation time.
    pub created_at: u64,

    /// Reserved event kind for marmot bootstrap envelopes.
    pub kind: u16,

    /// Tags used for relay-side filtering, e.g. `["t", session_hex]`.
    pub tags: Vec<Vec<String>>,

    /// JSON-encoded [`HandshakeEnvelope`].
    pub content: String,

    /// Schnorr signature over `id`. Zeroed until signed.
    pub sig: [u8; 64],
}

/// Reserved event kind for marmot bootstrap handshake envelopes.
pub const HANDSHAKE_EVENT_KIND: u16 = 445;

/// Tag name used to scope events to a single bootstrap session.
pub const SESSION_TAG: &str = "t";

impl SignedEvent {
    /// Build an unsigned event (`sig` all-zero) with a freshly computed id.
    ///
    /// Callers sign `id` with the identity's secret key and call
    /// [`SignedEvent::with_signature`] to attach the result.
    #[must_use]
    pub fn new(
        pubkey: [u8; 32],
        created_at: u64,
        kind: u16,
        tags: Vec<Vec<String>>,
        content: String,
    ) -> Self {
        let id = Self::compute_id(&pubkey, created_at, kind, &tags, &content);
        Self { id, pubkey, created_at, kind, tags, content, sig: [0u8; 64] }
    }

    /// Attach a signature, returning the now-signed event.
    #[must_use]
    pub fn with_signature(mut self, sig: [u8; 64]) -> Self {
        self.sig = sig;
        self
    }

    /// Canonical event id: sha256 over a fixed JSON array, NIP-01 style:
    /// `[0, pubkey_hex, created_at, kind, tags, content]`.
    ///
    /// Using a fixed array (rather than serializing the struct directly)
    /// keeps the hash stable even if field order in [`SignedEvent`] changes.
    #[must_use]
    pub fn compute_id(
        pubkey: &[u8; 32],
        created_at: u64,
        kind: u16,
        tags: &[Vec<String>],
        content: &str,
    ) -> [u8; 32] {
        let array = serde_json::json!([0, hex::encode(pubkey), created_at, kind, tags, content]);
        let canonical = array.to_string();

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hasher.finalize().into()
    }

    /// Bytes that the signature is computed over (the event id itself).
    #[must_use]
    pub fn signing_data(&self) -> [u8; 32] {
        self.id
    }

    /// Recompute the id from the event's own fields and compare.
    ///
    /// Catches tampering with any field other than `sig`: a forged event
    /// with altered `content` but an unchanged `id` is rejected here, before
    /// signature verification is even attempted.
    #[must_use]
    pub fn verify_id(&self) -> bool {
        let expected =
            Self::compute_id(&self.pubkey, self.created_at, self.kind, &self.tags, &self.content);
        expected == self.id
    }

    /// Value of the session tag (`t`), if present.
    #[must_use]
    pub fn session_tag(&self) -> Option<&str> {
        self.tags.iter().find(|t| t.first().map(String::as_str) == Some(SESSION_TAG)).and_then(
            |t| t.get(1)).map(String::as_str)
    }

    /// Decode `content` as a [`HandshakeEnvelope`].
    pub fn envelope(&self) -> Result<HandshakeEnvelope> {
        serde_json::from_str(&self.content).map_err(|e| ProtocolError::Json(e.to_string()))
    }
}

/// Which side of the bootstrap handshake sent an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeRole {
    /// The side that will call `create_group`.
    Creator,
    /// The side that will call `accept_welcome`.
    Invitee,
}

/// The JSON body carried inside a [`SignedEvent::content`].
///
/// `session`/`from_role`/`created_at` are duplicated from the envelope
/// itself (rather than only the outer event) so that the envelope is
/// meaningful even if extracted from its transport wrapper, e.g. in tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeEnvelope {
    /// Bootstrap channel id shared by both sides of the handshake.
    pub session: [u8; 16],

    /// Which role sent this envelope.
    pub from_role: HandshakeRole,

    /// Unix seconds at creation time.
    pub created_at: u64,

    /// The envelope body.
    #[serde(flatten)]
    pub body: EnvelopeBody,
}

/// Handshake envelope bodies, tagged by `type` in the wire JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "kebab-case")]
pub enum EnvelopeBody {
    /// Creator asks the invitee for a key package.
    RequestKeyPackage,

    /// Invitee offers a key package.
    KeyPackage {
        /// Serialized MLS `KeyPackage` bundle (opaque to the relay).
        bundle: Vec<u8>,
        /// x-only public key of the invitee.
        pubkey: [u8; 32],
    },

    /// Invitee heartbeat asking for (re-)delivery of the welcome.
    RequestWelcome,

    /// Creator delivers the welcome.
    Welcome {
        /// Serialized MLS `Welcome` message.
        welcome: Vec<u8>,
        /// The MLS group identifier the welcome joins.
        group_id: [u8; 32],
    },
}

impl EnvelopeBody {
    /// Short, stable name for logging and tag filtering.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::RequestKeyPackage => "request-key-package",
            Self::KeyPackage { .. } => "key-package",
            Self::RequestWelcome => "request-welcome",
            Self::Welcome { .. } => "welcome",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_detects_tampering() {
        let event = SignedEvent::new(
            [7u8; 32],
            1_000,
            HANDSHAKE_EVENT_KIND,
            vec![vec!["t".to_string(), "abcd".to_string()]],
            "{}".to_string(),
        );
        assert!(event.verify_id());

        let mut tampered = event.clone();
        tampered.content = "{\"evil\":true}".to_string();
        assert!(!tampered.verify_id());
    }

    #[test]
    fn session_tag_roundtrip() {
        let event = SignedEvent::new(
            [1u8; 32],
            0,
            HANDSHAKE_EVENT_KIND,
            vec![vec!["t".to_string(), "session-abc".to_string()]],
            "{}".to_string(),
        );
        assert_eq!(event.session_tag(), Some("session-abc"));
    }

    #[test]
    fn envelope_json_round_trip() {
        let envelope = HandshakeEnvelope {
            session: [9u8; 16],
            from_role: HandshakeRole::Invitee,
            created_at: 42,
            body: EnvelopeBody::KeyPackage { bundle: vec![1, 2, 3], pubkey: [2u8; 32] },
        };

        let json = serde_json::to_string(&envelope).expect("serializes");
        let decoded: HandshakeEnvelope = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(decoded, envelope);
        assert_eq!(decoded.body.type_name(), "key-package");
    }

    #[test]
    fn same_fields_produce_same_id() {
        let a = SignedEvent::new(
            [3u8; 32],
            10,
            HANDSHAKE_EVENT_KIND,
            vec![],
            "{\"x\":1}".to_string(),
        );
        let b = SignedEvent::new(
            [3u8; 32],
            10,
            HANDSHAKE_EVENT_KIND,
            vec![],
            "{\"x\":1}".to_string(),
        );
        assert_eq!(a.id, b.id);
    }
}
