//! [`SimDriver`]: the [`Driver`] every simulated client runs under, and
//! [`SimCluster`]: a thin multi-participant harness wiring several
//! [`Runtime`]s to the same [`SimNetwork`] and [`SimRelay`].
//!
//! `SimDriver` never touches a real socket: the signalling relay is
//! [`SimRelay`]'s in-memory broadcast, and the transport bridge is
//! [`GroupTransport`] over [`InMemoryTransport`]. Every real `marmot-app`
//! orchestration path — bootstrap, commit merge, roster replay, media
//! keying — runs unmodified on top of it, since [`Driver`] is the only seam
//! between the engine and the outside world.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use marmot_app::{Controller, ControllerEvent, Driver, Input, Operation, Runtime};
use marmot_client::transport::{GroupTransport, MoqTransport, SubscribeOutcome, TransportError};
use marmot_core::{identity::Identity, mls::MemberPubkey};
use marmot_proto::envelope::SignedEvent;
use tokio::sync::mpsc;

use crate::{
    relay::SimRelay,
    sim_env::SimEnv,
    sim_transport::{InMemoryTransport, SimNetwork},
};

/// Errors [`SimDriver`] can surface to [`Runtime::run`]/[`Runtime::step`].
///
/// The in-memory transport only ever raises [`TransportError`]; there is no
/// separate relay failure mode since [`SimRelay`] is infallible.
#[derive(Debug, thiserror::Error)]
pub enum SimDriverError {
    /// The transport bridge rejected a publish or subscribe.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Shared buffer of [`ControllerEvent`]s a [`SimDriver`] has emitted, kept
/// alive independently of the [`Runtime`] that owns the driver so test code
/// can drain it after the driver has been moved in.
pub type EventLog = Arc<Mutex<VecDeque<ControllerEvent>>>;

/// A [`Driver`] over an in-memory [`SimNetwork`] and [`SimRelay`].
pub struct SimDriver {
    env: SimEnv,
    network: Arc<SimNetwork>,
    relay: Arc<SimRelay>,
    relay_slot: usize,
    transport: Option<Arc<GroupTransport<InMemoryTransport>>>,
    peer_subs: HashMap<String, mpsc::Receiver<Bytes>>,
    pending: VecDeque<Input>,
    events: EventLog,
}

impl SimDriver {
    /// A fresh driver subscribed to `relay` and ready to open a transport
    /// on `network` once the controller asks for one. Returns the driver
    /// and a handle onto the event log it will fill via [`Driver::emit`].
    #[must_use]
    pub fn new(env: SimEnv, network: Arc<SimNetwork>, relay: Arc<SimRelay>) -> (Self, EventLog) {
        let relay_slot = relay.subscribe();
        let events: EventLog = Arc::new(Mutex::new(VecDeque::new()));
        let driver = Self {
            env,
            network,
            relay,
            relay_slot,
            transport: None,
            peer_subs: HashMap::new(),
            pending: VecDeque::new(),
            events: events.clone(),
        };
        (driver, events)
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;

    async fn poll_input(&mut self) -> Result<Option<Input>, Self::Error> {
        if let Some(input) = self.pending.pop_front() {
            return Ok(Some(input));
        }

        if let Some(event) = self.relay.poll(self.relay_slot) {
            return Ok(Some(Input::Envelope(event)));
        }

        for (from_hex, rx) in &mut self.peer_subs {
            if let Ok(bytes) = rx.try_recv() {
                return Ok(Some(Input::Wrapper { from_hex: from_hex.clone(), bytes: bytes.to_vec() }));
            }
        }

        Ok(None)
    }

    async fn publish_envelope(&mut self, event: SignedEvent) -> Result<(), Self::Error> {
        self.relay.publish(event);
        Ok(())
    }

    async fn publish_wrapper(&mut self, wrapper: Vec<u8>) -> Result<(), Self::Error> {
        if let Some(transport) = &self.transport {
            transport.publish(Bytes::from(wrapper)).await?;
        }
        Ok(())
    }

    async fn open_transport(&mut self, group_root: String, own_pubkey_hex: String) -> Result<(), Self::Error> {
        let inner = Arc::new(InMemoryTransport::new(self.network.clone()));
        let transport = Arc::new(GroupTransport::new(inner, group_root, &own_pubkey_hex));
        // The in-memory network has no warm-up latency: a publish track is
        // live as soon as it exists.
        transport.mark_ready().await;
        self.transport = Some(transport);
        self.pending.push_back(Input::TransportReady);
        Ok(())
    }

    async fn subscribe_peer(&mut self, pubkey: MemberPubkey) -> Result<(), Self::Error> {
        let Some(transport) = &self.transport else {
            return Ok(());
        };
        let pubkey_hex = hex::encode(pubkey);
        if let SubscribeOutcome::New(rx) = transport.subscribe_peer(&pubkey_hex).await? {
            self.peer_subs.insert(pubkey_hex, rx);
        }
        Ok(())
    }

    fn close_transport(&mut self) {
        self.transport = None;
        self.peer_subs.clear();
    }

    fn emit(&mut self, event: ControllerEvent) {
        self.events.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push_back(event);
    }

    fn sleep(&self, duration: std::time::Duration) -> impl std::future::Future<Output = ()> + Send {
        self.env.sleep(duration)
    }
}

/// One simulated client: its [`Runtime`] and the event log its [`SimDriver`]
/// fills.
pub struct SimParticipant {
    /// The participant's runtime, pairing its [`SimDriver`] with its
    /// [`Controller`].
    pub runtime: Runtime<SimDriver, SimEnv>,
    /// Events emitted by this participant's driver, drained with
    /// [`SimCluster::drain_events`].
    pub events: EventLog,
}

/// A shared in-memory network and relay plus however many participants a
/// test spawns onto them.
///
/// Each participant steps independently; nothing here imposes lockstep
/// ordering across participants beyond what the real protocol does (a
/// welcome must arrive before its recipient can process a commit, etc.).
/// Tests drive convergence by repeatedly calling [`SimCluster::pump`] until
/// every participant has drained whatever is in flight.
pub struct SimCluster {
    network: Arc<SimNetwork>,
    relay: Arc<SimRelay>,
    env: SimEnv,
    participants: Vec<SimParticipant>,
}

impl SimCluster {
    /// A cluster with its own network and relay, seeded for reproducible
    /// randomness across every participant it spawns.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self { network: SimNetwork::new(), relay: SimRelay::new(), env: SimEnv::with_seed(seed), participants: Vec::new() }
    }

    /// Spawn a participant running under `identity`, returning its index.
    pub fn spawn(&mut self, identity: Identity) -> usize {
        let (driver, events) = SimDriver::new(self.env.clone(), self.network.clone(), self.relay.clone());
        let runtime = Runtime::new(driver, self.env.clone(), identity);
        self.participants.push(SimParticipant { runtime, events });
        self.participants.len() - 1
    }

    /// Submit `op` to participant `idx` and execute the resulting actions.
    ///
    /// # Errors
    ///
    /// Propagates a [`SimDriverError`] from the underlying transport.
    pub async fn submit(&mut self, idx: usize, op: Operation) -> Result<(), SimDriverError> {
        self.participants[idx].runtime.submit(op).await
    }

    /// Step participant `idx` once: poll for input (or tick) and execute
    /// the resulting actions.
    ///
    /// # Errors
    ///
    /// Propagates a [`SimDriverError`] from the underlying transport.
    pub async fn step(&mut self, idx: usize) -> Result<(), SimDriverError> {
        self.participants[idx].runtime.step().await
    }

    /// Step every participant, in order, `rounds` times. Idle participants
    /// (nothing ready) just fall through to a tick each round.
    ///
    /// # Errors
    ///
    /// Propagates the first [`SimDriverError`] encountered.
    pub async fn pump(&mut self, rounds: usize) -> Result<(), SimDriverError> {
        for _ in 0..rounds {
            for idx in 0..self.participants.len() {
                self.step(idx).await?;
            }
        }
        Ok(())
    }

    /// Read-only access to participant `idx`'s controller, e.g. for
    /// `snapshot()` or `current_epoch()` assertions.
    #[must_use]
    pub fn controller(&self, idx: usize) -> &Controller<SimEnv> {
        self.participants[idx].runtime.controller()
    }

    /// Drain every event participant `idx`'s driver has emitted so far.
    pub fn drain_events(&self, idx: usize) -> Vec<ControllerEvent> {
        let mut log = self.participants[idx].events.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        log.drain(..).collect()
    }

    /// The cluster's shared in-memory network, for tests that want to
    /// partition a participant directly.
    #[must_use]
    pub fn network(&self) -> &Arc<SimNetwork> {
        &self.network
    }

    /// The cluster's shared relay.
    #[must_use]
    pub fn relay(&self) -> &Arc<SimRelay> {
        &self.relay
    }
}
