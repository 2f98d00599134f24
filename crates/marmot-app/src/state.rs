//! Observable snapshot of engine state, read-only from the host's side.
//!
//! The controller owns the authoritative roster and handshake phase and
//! holds an immutable snapshot of the most recent roster for emission; this
//! module is the shape of that snapshot, not the state machine itself.

use marmot_core::handshake::Phase;

use crate::event::RosterMember;

/// A read-only view of the controller's current state, for hosts that want
/// to poll rather than (or in addition to) consuming the event stream.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    /// Current bootstrap handshake phase, if a handshake is in flight.
    pub handshake_phase: Option<Phase>,
    /// Whether the transport's publish track is ready.
    pub transport_ready: bool,
    /// The group's current epoch, if a group has been joined or created.
    pub epoch: Option<u64>,
    /// The most recently observed roster.
    pub roster: Vec<RosterMember>,
}

impl EngineSnapshot {
    /// An empty snapshot, as seen before any bootstrap operation runs.
    #[must_use]
    pub fn new() -> Self {
        Self { handshake_phase: None, transport_ready: false, epoch: None, roster: Vec::new() }
    }
}

impl Default for EngineSnapshot {
    fn default() -> Self {
        Self::new()
    }
}
