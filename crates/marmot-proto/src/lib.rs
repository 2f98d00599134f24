//! Wire types shared between the MLS/identity core, the bootstrap handshake,
//! and the transport bridge.
//!
//! This crate is deliberately thin: it has no opinion about MLS, QUIC, or
//! signing. It defines byte layouts (media frames, AAD), the JSON shape of
//! handshake envelopes, and MoQ track-path formatting, so that every other
//! crate agrees on the wire without depending on each other's internals.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod aad;
pub mod envelope;
pub mod error;
pub mod media_frame;
pub mod track;

pub use envelope::{EnvelopeBody, HandshakeEnvelope, HandshakeRole, SignedEvent, HANDSHAKE_EVENT_KIND};
pub use error::{ProtocolError, Result};
pub use media_frame::MediaFrame;
pub use track::TrackPosition;
