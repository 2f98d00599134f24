//! Side effects the controller asks a [`crate::Driver`] to execute.
//!
//! The controller (C4) is sans-IO: [`crate::Controller::handle_operation`]
//! and [`crate::Controller::handle_input`] never touch a socket or a clock
//! themselves. They return a list of [`ControllerAction`]s; [`crate::Runtime`]
//! is what actually calls out to a [`crate::Driver`].

use marmot_core::mls::MemberPubkey;
use marmot_proto::envelope::SignedEvent;

use crate::event::ControllerEvent;

/// An effect the controller asks the driver to perform.
#[derive(Debug, Clone)]
pub enum ControllerAction {
    /// Sign (already done) and publish this event on the signalling relay.
    PublishEnvelope(SignedEvent),

    /// Open the transport bridge for `group_root`, publishing under
    /// `own_pubkey_hex`.
    OpenTransport {
        /// Stable `marmot/<hex>` prefix for this group's tracks.
        group_root: String,
        /// This client's own hex-encoded public key.
        own_pubkey_hex: String,
    },

    /// Publish a wrapper on this client's own text (control) track.
    PublishWrapper(Vec<u8>),

    /// Subscribe to a peer's text (control) track.
    SubscribePeer(MemberPubkey),

    /// Flush and tear down the transport.
    CloseTransport,

    /// Surface an event to the host.
    Emit(ControllerEvent),
}
