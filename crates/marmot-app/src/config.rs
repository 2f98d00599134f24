//! Host-engine session configuration: the
//! record a host builds once, up front, to start a [`crate::Controller`].

use marmot_core::mls::MemberPubkey;
use serde::{Deserialize, Serialize};

/// Which side of the bootstrap handshake this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Forms the group and admits the first invitee.
    Creator,
    /// Joins an existing (possibly not-yet-created) group via a Welcome.
    Invitee,
}

/// Session bootstrap input, loaded by the host from CLI flags, a file, or
/// environment variables — the engine performs no file or env I/O of its
/// own and never reaches for persisted MLS state.
///
/// `group_id` is informational only until a handshake or resume path fills
/// it in; the engine treats the presence of MLS group material, not this
/// field, as the source of truth for whether a session has joined a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Which side of the bootstrap handshake this session plays.
    pub role: Role,
    /// Base URL of the signalling relay.
    pub signalling_url: String,
    /// Base URL of the MoQ relay.
    pub moq_url: String,
    /// Bootstrap channel id shared out of band by both sides.
    pub session_id: [u8; 16],
    /// This identity's 32-byte secp256k1 secret.
    pub secret: [u8; 32],
    /// The MLS group id, once known. Absent before the handshake completes.
    pub group_id: Option<[u8; 32]>,
    /// Pubkeys expected to hold admin rights once the roster is known.
    pub admin_pubkeys: Vec<MemberPubkey>,
    /// Pubkeys expected to be present on the roster once known.
    pub peer_pubkeys: Vec<MemberPubkey>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let config = SessionConfig {
            role: Role::Creator,
            signalling_url: "https://relay.example".to_string(),
            moq_url: "https://moq.example".to_string(),
            session_id: [1u8; 16],
            secret: [2u8; 32],
            group_id: None,
            admin_pubkeys: vec![[3u8; 32]],
            peer_pubkeys: vec![[4u8; 32]],
        };
        let json = serde_json::to_string(&config).expect("serializes");
        let decoded: SessionConfig = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(decoded, config);
    }
}
