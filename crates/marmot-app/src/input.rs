//! Occurrences a [`crate::Driver`] observed and hands to the controller.
//!
//! Distinct from [`crate::Operation`]: operations are host intent, `Input`
//! is what actually arrived from the outside world (the relay, a peer's
//! track, the clock).

use marmot_proto::envelope::SignedEvent;

/// An event observed by the driver, fed into
/// [`crate::Controller::handle_input`].
#[derive(Debug, Clone)]
pub enum Input {
    /// The clock advanced; drive handshake heartbeats/timeouts and
    /// commit-merge timeouts.
    Tick,

    /// A signed event arrived on the signalling relay.
    Envelope(SignedEvent),

    /// A wrapper frame arrived on a peer's text (control) track.
    Wrapper {
        /// The publish track's owner, decoded from the track path.
        from_hex: String,
        /// Opaque wrapper bytes.
        bytes: Vec<u8>,
    },

    /// The driver's publish track transitioned to ready (accepted by the
    /// relay, or a grace timer elapsed).
    TransportReady,
}
