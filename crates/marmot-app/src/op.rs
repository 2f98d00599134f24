//! Operations the host posts onto the controller's single-threaded queue.
//!
//! The queue is drained sequentially, single-threaded; operations never
//! run concurrently with each other.

use marmot_core::mls::MemberPubkey;

use crate::config::SessionConfig;

/// A unit of work the host enqueues. The controller never inspects queue
/// depth or ordering beyond FIFO drain order.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Start the bootstrap handshake for this session and drive it until
    /// the group is known.
    Bootstrap(SessionConfig),

    /// Once a group id is known (via [`Operation::Bootstrap`] completing),
    /// derive the group root and open the transport bridge. Idempotent.
    ConnectTransport,

    /// Build a wrapper for `payload` at the current epoch, publish it, and
    /// emit a local echo.
    SendMessage(Vec<u8>),

    /// Creator/admin-only: start a fresh bootstrap handshake scoped to
    /// `session`, admitting whoever's key package arrives on it with the
    /// given admin flag.
    InviteMember {
        /// Bootstrap channel id shared out of band with the invitee.
        session: [u8; 16],
        /// Whether to admit the invitee as an admin.
        is_admin: bool,
    },

    /// Admin-only: remove a member from the group by a proposal + commit.
    RemoveMember(MemberPubkey),

    /// Issue a self-update commit, rotating the epoch.
    RotateEpoch,

    /// Close the transport and drop all engine state.
    Shutdown,
}
