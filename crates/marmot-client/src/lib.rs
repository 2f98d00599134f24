//! MoQ transport bridge (C3): maps MLS wrapper and media frames onto
//! per-member publish/subscribe tracks over a content-blind pub/sub
//! transport.
//!
//! [`transport::MoqTransport`] is the seam: the engine core never depends
//! on a concrete QUIC stack. [`quinn_transport::QuinnTransport`] (behind
//! the `transport` feature) is the production implementation; tests and
//! `marmot-harness` drive [`transport::GroupTransport`] over an in-memory
//! one instead.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod transport;

#[cfg(feature = "transport")]
pub mod quinn_transport;

pub use transport::{BackoffConfig, GroupTransport, MoqTransport, SubscribeOutcome, TransportError};

#[cfg(feature = "transport")]
pub use quinn_transport::{CAPABILITY_TOKEN_PARAM, MOQ_ALPN, QuinnTransport, SharedQuinnTransport};
