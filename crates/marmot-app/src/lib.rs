//! Engine layer: sequences the bootstrap handshake, the MLS group, the
//! transport bridge, and the media key schedule behind a sans-IO controller
//! and a generic driver/runtime pair, so the same orchestration code runs in
//! production and under deterministic simulation.
//!
//! # Components
//!
//! - [`Controller`]: sans-IO state machine (handshake, group, roster, media)
//! - [`Driver`]: trait for platform-specific I/O abstraction
//! - [`Runtime`]: generic orchestration loop pairing a [`Driver`] with a [`Controller`]

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod action;
mod config;
mod controller;
mod driver;
mod error;
mod event;
mod input;
mod media;
mod op;
mod pending;
mod runtime;
mod state;

pub use action::ControllerAction;
pub use config::{Role, SessionConfig};
pub use controller::Controller;
pub use driver::Driver;
pub use error::{EngineError, ErrorKind, RecoveryHint};
pub use event::{ControllerEvent, RosterMember};
pub use input::Input;
pub use media::{MediaError, MediaRegistry};
pub use op::Operation;
pub use pending::{PendingFrame, PendingFrameQueue};
pub use runtime::{DEFAULT_TICK_INTERVAL, Runtime};
pub use state::EngineSnapshot;
