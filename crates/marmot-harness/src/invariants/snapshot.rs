//! Observable state snapshots for invariant checking.
//!
//! A snapshot captures, at one point in a scenario, what every simulated
//! member can see of its own session: its epoch history, its roster, and
//! the peers it has subscribed to. Test code builds one from a
//! [`crate::SimCluster`]'s controllers plus whatever `MemberJoined` events
//! it has drained; invariants never reach back into live controller state.

use std::collections::BTreeSet;

use marmot_core::mls::MemberPubkey;
use serde::Serialize;

/// One member's observable view at snapshot time.
#[derive(Debug, Clone, Serialize)]
pub struct MemberView {
    /// This member's own public key.
    pub pubkey: MemberPubkey,
    /// Every epoch this member has observed, oldest first. The current
    /// epoch is its last element.
    pub epoch_history: Vec<u64>,
    /// The group root this member's session is scoped to, once a group has
    /// been joined or created.
    pub group_root: Option<String>,
    /// The most recently observed roster: (pubkey, is_admin) pairs.
    pub roster: Vec<(MemberPubkey, bool)>,
    /// Peers this member currently holds a live subscription to.
    pub subscribed_peers: BTreeSet<MemberPubkey>,
}

impl MemberView {
    /// This member's current epoch, if it has observed any.
    #[must_use]
    pub fn epoch(&self) -> Option<u64> {
        self.epoch_history.last().copied()
    }
}

/// A point-in-time view across every member of a cluster.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClusterSnapshot {
    /// One entry per simulated member.
    pub members: Vec<MemberView>,
}

impl ClusterSnapshot {
    /// A snapshot with no members, for which every invariant trivially
    /// holds.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}
