//! MLS (Messaging Layer Security, RFC 9420) group state for end-to-end
//! encrypted group messaging and media key derivation.
//!
//! # Components
//!
//! - [`group`]: the client-side MLS group state machine ([`MlsGroup`])
//! - [`provider`]: `OpenMLS` provider integration over [`crate::env::Environment`]

pub mod group;
pub mod provider;

pub use group::{GroupId, Invitee, Member, MemberPubkey, MlsAction, MlsGroup, Outcome, PendingJoinState};
pub use provider::MlsProvider;
