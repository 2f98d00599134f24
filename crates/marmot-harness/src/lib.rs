//! Deterministic simulation harness for end-to-end engine testing.
//!
//! Everything in here plugs into the real seams `marmot-app` already
//! defines — [`marmot_app::Driver`] and [`marmot_core::env::Environment`] —
//! rather than re-implementing protocol logic: a simulated client runs the
//! exact same `Controller`, `MlsGroup`, and `Handshake` code a production
//! binary does, just driven by an in-memory relay and transport instead of
//! real sockets.
//!
//! # Components
//!
//! - [`SimEnv`]: a seeded, reproducible [`marmot_core::env::Environment`]
//! - [`sim_transport::SimNetwork`] / [`sim_transport::InMemoryTransport`]: an
//!   in-memory MoQ pub/sub fan-out hub
//! - [`relay::SimRelay`]: an in-memory signalling relay with id-based dedup
//! - [`cluster::SimDriver`] / [`cluster::SimCluster`]: wires the above into
//!   runnable [`marmot_app::Runtime`]s for multi-party scenarios
//! - [`invariants`]: behavioral properties checked across a cluster's
//!   snapshot, independent of any one scenario's script

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cluster;
pub mod invariants;
pub mod relay;
pub mod sim_env;
pub mod sim_transport;

pub use cluster::{EventLog, SimCluster, SimDriver, SimDriverError, SimParticipant};
pub use invariants::{
    ClusterSnapshot, EpochMonotonicity, GroupRootConsistency, Invariant, InvariantRegistry,
    MemberView, RosterConsistency, SubscriptionCompleteness, Violation,
};
pub use relay::SimRelay;
pub use sim_env::SimEnv;
pub use sim_transport::{InMemoryTransport, SimNetwork};
