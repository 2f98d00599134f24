//! [`Driver`]: the I/O boundary a host implements so [`crate::Runtime`] can
//! drive a [`crate::Controller`] without the controller ever touching a
//! socket or clock itself.
//!
//! Implementations provide platform-specific I/O while the generic
//! [`crate::Runtime`] handles orchestration: the same controller and runtime
//! code runs against a production driver backed by `marmot-client`'s QUIC
//! transport and a real signalling relay client, or against
//! `marmot-harness`'s deterministic simulation driver.

use std::{future::Future, time::Duration};

use marmot_core::mls::MemberPubkey;
use marmot_proto::envelope::SignedEvent;

use crate::{event::ControllerEvent, input::Input};

/// Abstracts every side effect [`crate::Runtime`] needs to drive a
/// [`crate::Controller`]: polling for inbound events, publishing outbound
/// ones, and surfacing [`ControllerEvent`]s to the host.
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Poll for the next observed input (a relay envelope, a wrapper frame
    /// on some peer's track, or the transport becoming ready). Returns
    /// `None` if nothing is ready right now; the runtime falls back to a
    /// tick on its own cadence in that case.
    fn poll_input(&mut self) -> impl Future<Output = Result<Option<Input>, Self::Error>> + Send;

    /// Sign (already done by the controller) and publish this event on the
    /// signalling relay.
    fn publish_envelope(&mut self, event: SignedEvent) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Publish a wrapper on this client's own text (control) track.
    fn publish_wrapper(&mut self, wrapper: Vec<u8>) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Open the transport bridge for `group_root`, publishing under
    /// `own_pubkey_hex`.
    fn open_transport(
        &mut self,
        group_root: String,
        own_pubkey_hex: String,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Subscribe to a peer's text (control) track.
    fn subscribe_peer(&mut self, pubkey: MemberPubkey) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Flush and tear down the transport.
    fn close_transport(&mut self);

    /// Surface an event to the host (UI, logs, metrics — entirely the
    /// host's concern).
    fn emit(&mut self, event: ControllerEvent);

    /// Sleep for the runtime's tick cadence when no input is ready.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}
