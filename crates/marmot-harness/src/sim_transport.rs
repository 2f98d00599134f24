//! In-memory [`MoqTransport`] fan-out hub for deterministic simulation.
//!
//! A [`SimNetwork`] is the shared "relay": every [`InMemoryTransport`]
//! handed out for it publishes into, and subscribes from, the same set of
//! named tracks. Delivery is live fan-out, not a log — a subscriber only
//! ever sees frames published after its `subscribe` call, matching MoQ's
//! own pub/sub semantics and letting the harness exercise
//! `GroupTransport`'s subscribe backoff against a track nobody has
//! announced yet.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use marmot_client::transport::{MoqTransport, TransportError};
use tokio::sync::{Mutex, mpsc};

/// Default channel capacity for one subscriber's inbound queue.
const SUBSCRIBER_CAPACITY: usize = 256;

#[derive(Default)]
struct NetworkState {
    announced: HashSet<String>,
    subscribers: HashMap<String, Vec<mpsc::Sender<Bytes>>>,
}

/// Shared in-memory MoQ relay: tracks announced by a first publish, and the
/// live subscriber fan-out list for each.
#[derive(Default)]
pub struct SimNetwork {
    state: Mutex<NetworkState>,
}

impl SimNetwork {
    /// A fresh, empty network with no announced tracks.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

/// One client's handle onto a [`SimNetwork`], with an independent
/// partition flag so chaos tests can sever a single participant without
/// tearing down the whole simulation.
pub struct InMemoryTransport {
    network: Arc<SimNetwork>,
    partitioned: AtomicBool,
}

impl InMemoryTransport {
    /// A transport attached to `network`, initially connected.
    #[must_use]
    pub fn new(network: Arc<SimNetwork>) -> Self {
        Self { network, partitioned: AtomicBool::new(false) }
    }

    /// Sever (or restore) this client's view of the network: every publish
    /// and subscribe call fails while partitioned, without affecting any
    /// other client sharing the same [`SimNetwork`].
    pub fn set_partitioned(&self, partitioned: bool) {
        self.partitioned.store(partitioned, Ordering::Release);
    }

    fn is_partitioned(&self) -> bool {
        self.partitioned.load(Ordering::Acquire)
    }
}

#[async_trait]
impl MoqTransport for InMemoryTransport {
    async fn publish(&self, track: &str, frame: Bytes) -> Result<(), TransportError> {
        if self.is_partitioned() {
            return Err(TransportError::StreamReset(track.to_string()));
        }

        let mut state = self.network.state.lock().await;
        state.announced.insert(track.to_string());
        if let Some(subscribers) = state.subscribers.get_mut(track) {
            subscribers.retain(|tx| tx.try_send(frame.clone()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(&self, track: &str) -> Result<mpsc::Receiver<Bytes>, TransportError> {
        if self.is_partitioned() {
            return Err(TransportError::TrackNotFound(track.to_string()));
        }

        let mut state = self.network.state.lock().await;
        if !state.announced.contains(track) {
            return Err(TransportError::TrackNotFound(track.to_string()));
        }

        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        state.subscribers.entry(track.to_string()).or_default().push(tx);
        Ok(rx)
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_before_any_publish_is_track_not_found() {
        let network = SimNetwork::new();
        let transport = InMemoryTransport::new(network);

        let err = transport.subscribe("marmot/aa/wrappers/bb").await.unwrap_err();
        assert!(matches!(err, TransportError::TrackNotFound(_)));
    }

    #[tokio::test]
    async fn publish_then_subscribe_then_publish_delivers_only_the_second_frame() {
        let network = SimNetwork::new();
        let publisher = InMemoryTransport::new(network.clone());
        let subscriber = InMemoryTransport::new(network);

        publisher.publish("t", Bytes::from_static(b"before")).await.expect("announces track");
        let mut rx = subscriber.subscribe("t").await.expect("now announced");
        publisher.publish("t", Bytes::from_static(b"after")).await.expect("publishes");

        let received = rx.recv().await.expect("frame arrives");
        assert_eq!(received, Bytes::from_static(b"after"));
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive_published_frames() {
        let network = SimNetwork::new();
        let publisher = InMemoryTransport::new(network.clone());
        let sub_a = InMemoryTransport::new(network.clone());
        let sub_b = InMemoryTransport::new(network);

        publisher.publish("t", Bytes::from_static(b"announce")).await.expect("announces");
        let mut rx_a = sub_a.subscribe("t").await.expect("subscribes");
        let mut rx_b = sub_b.subscribe("t").await.expect("subscribes");

        publisher.publish("t", Bytes::from_static(b"hello")).await.expect("publishes");

        assert_eq!(rx_a.recv().await, Some(Bytes::from_static(b"hello")));
        assert_eq!(rx_b.recv().await, Some(Bytes::from_static(b"hello")));
    }

    #[tokio::test]
    async fn partitioned_transport_rejects_publish_and_subscribe() {
        let network = SimNetwork::new();
        let transport = InMemoryTransport::new(network);
        transport.set_partitioned(true);

        assert!(transport.publish("t", Bytes::from_static(b"x")).await.is_err());
        assert!(transport.subscribe("t").await.is_err());
    }
}
