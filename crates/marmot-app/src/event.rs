//! Events the controller emits for the host to render.
//!
//! Arrive wrapped as [`crate::ControllerAction::Emit`] in the `Vec` returned
//! from [`crate::Controller::handle_operation`]/[`crate::Controller::handle_input`],
//! or via [`crate::Driver::emit`] when run under [`crate::Runtime`]. Either
//! way, the host never needs to peek at engine internals to build a UI.

use marmot_core::{handshake::Phase, mls::MemberPubkey};

use crate::error::{EngineError, RecoveryHint};

/// A roster entry as surfaced to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterMember {
    /// The member's public key.
    pub pubkey: MemberPubkey,
    /// Whether the member holds admin rights.
    pub is_admin: bool,
}

/// Events the controller emits for the host to render.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// Free-text status line, e.g. for a connection banner.
    Status(String),

    /// The publish track became ready (or stopped being ready).
    Ready(bool),

    /// A message was decrypted (or locally echoed).
    Message {
        /// The message's author.
        author: MemberPubkey,
        /// Decrypted plaintext.
        content: Vec<u8>,
        /// Unix seconds at receipt/send time.
        ts: u64,
        /// Whether this client authored the message.
        local: bool,
    },

    /// A commit was merged; `total` is the running count of merges observed
    /// by this session (not the MLS epoch number itself).
    Commit {
        /// Running count of merged commits this session.
        total: u64,
    },

    /// The full current roster, emitted after every commit merge.
    Roster(Vec<RosterMember>),

    /// A member was added and is now tracked (newly subscribed).
    MemberJoined(RosterMember),

    /// A member's admin flag changed.
    MemberUpdated(RosterMember),

    /// A member left the roster (removed, or left voluntarily).
    MemberLeft(MemberPubkey),

    /// The engine began admitting `pubkey`, with the requested admin flag.
    InviteGenerated {
        /// The invitee's public key.
        pubkey: MemberPubkey,
        /// Whether they are being admitted as an admin.
        is_admin: bool,
    },

    /// Something failed; `fatal` distinguishes a stopped engine from a
    /// transient condition that will auto-resolve.
    Error {
        /// Human-readable description.
        message: String,
        /// Whether the engine is now stopped pending `Shutdown`.
        fatal: bool,
        /// What the host should do about it.
        recovery: RecoveryHint,
    },

    /// The bootstrap handshake's phase changed.
    Handshake {
        /// The new phase.
        phase: Phase,
    },
}

impl ControllerEvent {
    /// Build an [`ControllerEvent::Error`] from an [`EngineError`], reusing
    /// its classification for the `fatal` flag and recovery hint.
    #[must_use]
    pub fn from_error(err: &EngineError) -> Self {
        Self::Error { message: err.to_string(), fatal: err.is_fatal(), recovery: err.recovery() }
    }
}
