//! Identity, MLS group state, and the bootstrap handshake.
//!
//! The only crate in the workspace that imports the MLS library directly
//! ([`mls::group`]); everything above it (`marmot-client`, `marmot-app`)
//! talks to MLS state only through [`mls::MlsGroup`]'s action-returning API.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;
pub mod error;
pub mod handshake;
pub mod identity;
pub mod mls;

pub use error::{IdentityError, MlsError};
pub use handshake::{Handshake, HandshakeAction, HandshakeConfig, Phase};
pub use identity::Identity;
