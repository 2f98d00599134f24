//! `MoqTransport`: the trait that keeps the engine core off any concrete
//! QUIC stack, plus [`GroupTransport`], the per-group bridge that applies
//! track-path construction, the publish backlog, and subscription backoff
//! on top of it.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use marmot_proto::track;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};

/// Errors a `MoqTransport` implementation can raise.
///
/// `transient` variants (a reset stream, a track not yet announced) are
/// worth retrying with backoff; the rest are not.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The named track does not exist yet on the relay. Transient: it may
    /// be announced shortly after the writer opens it.
    #[error("track not found: {0}")]
    TrackNotFound(String),

    /// The underlying QUIC stream was reset by the peer or the relay.
    /// Transient.
    #[error("stream reset on track {0}")]
    StreamReset(String),

    /// The connection to the relay is gone. Fatal: the caller must
    /// reconnect from scratch.
    #[error("connection closed")]
    ConnectionClosed,

    /// The relay or peer rejected the operation for a reason that will not
    /// resolve itself (bad authorization, protocol violation). Fatal.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Whether retrying this operation (with backoff) might succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TrackNotFound(_) | Self::StreamReset(_))
    }
}

/// A content-blind publish/subscribe transport over named MoQ tracks.
///
/// Implementations carry opaque bytes only; framing, encryption, and
/// interpretation all live above this trait. `marmot-harness` provides an
/// in-memory implementation for deterministic simulation; [`quinn_transport`]
/// (behind the `transport` feature) provides the production one.
#[async_trait]
pub trait MoqTransport: Send + Sync {
    /// Append one frame to `track`, opening it as a publish stream on first
    /// use.
    async fn publish(&self, track: &str, frame: Bytes) -> Result<(), TransportError>;

    /// Subscribe to `track`. Frames are delivered on the returned channel in
    /// arrival order; the channel closes when the subscription ends.
    async fn subscribe(&self, track: &str) -> Result<mpsc::Receiver<Bytes>, TransportError>;

    /// Flush outstanding state and tear down the connection.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Backoff schedule for [`GroupTransport::subscribe_peer`] retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub multiplier: u32,
    /// Upper bound on the delay between attempts.
    pub cap: Duration,
    /// Number of attempts (including the first) before giving up.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self { initial: Duration::from_millis(200), multiplier: 2, cap: Duration::from_secs(10), max_attempts: 6 }
    }
}

/// Outcome of an idempotent subscribe call.
pub enum SubscribeOutcome {
    /// First subscription to this track; frames arrive on the channel.
    New(mpsc::Receiver<Bytes>),
    /// Already subscribed; no new channel, the caller keeps using the one
    /// returned the first time.
    AlreadySubscribed,
}

/// Bounded FIFO of frames queued while the publish track is not yet ready.
/// Overflow drops the oldest frame.
struct PublishQueue {
    frames: VecDeque<Bytes>,
    capacity: usize,
}

impl PublishQueue {
    fn new(capacity: usize) -> Self {
        Self { frames: VecDeque::with_capacity(capacity), capacity }
    }

    fn push(&mut self, frame: Bytes) {
        if self.frames.len() >= self.capacity {
            self.frames.pop_front();
            tracing::warn!("publish queue full, dropping oldest frame");
        }
        self.frames.push_back(frame);
    }

    fn drain(&mut self) -> Vec<Bytes> {
        self.frames.drain(..).collect()
    }
}

/// Per-group bridge over a [`MoqTransport`]: owns this member's publish
/// track, the pending-frame backlog while it warms up, and the set of
/// peer subscriptions with backoff on transient errors.
pub struct GroupTransport<T: MoqTransport> {
    transport: Arc<T>,
    group_root: String,
    own_track: String,
    ready: std::sync::atomic::AtomicBool,
    queue: Mutex<PublishQueue>,
    subscribed: Mutex<std::collections::HashSet<String>>,
    backoff: BackoffConfig,
}

impl<T: MoqTransport> GroupTransport<T> {
    /// Default bound on the publish backlog before oldest-drop kicks in.
    pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

    /// A bridge for `own_pubkey_hex`'s publish track under `group_root`
    /// (`marmot_proto::track::group_root`).
    #[must_use]
    pub fn new(transport: Arc<T>, group_root: String, own_pubkey_hex: &str) -> Self {
        Self::with_config(transport, group_root, own_pubkey_hex, Self::DEFAULT_QUEUE_CAPACITY, BackoffConfig::default())
    }

    /// As [`new`](Self::new), with explicit queue capacity and backoff
    /// schedule.
    #[must_use]
    pub fn with_config(
        transport: Arc<T>,
        group_root: String,
        own_pubkey_hex: &str,
        queue_capacity: usize,
        backoff: BackoffConfig,
    ) -> Self {
        let own_track = track::wrappers_track(&group_root, own_pubkey_hex);
        Self {
            transport,
            group_root,
            own_track,
            ready: std::sync::atomic::AtomicBool::new(false),
            queue: Mutex::new(PublishQueue::new(queue_capacity)),
            subscribed: Mutex::new(std::collections::HashSet::new()),
            backoff,
        }
    }

    /// Whether the publish track is considered live: either the relay has
    /// accepted a publish, or [`mark_ready`](Self::mark_ready) was called
    /// directly (e.g. by a grace timer).
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Mark the publish track ready and flush any backlog, oldest first.
    /// Idempotent.
    pub async fn mark_ready(&self) {
        if self.ready.swap(true, std::sync::atomic::Ordering::AcqRel) {
            return;
        }
        let backlog = {
            let mut queue = self.queue.lock().await;
            queue.drain()
        };
        for frame in backlog {
            if let Err(err) = self.transport.publish(&self.own_track, frame).await {
                tracing::warn!(%err, "dropping queued frame: publish failed after ready");
            }
        }
    }

    /// Publish one frame on this member's own track. Queues it (bounded,
    /// oldest-drop) if the track is not yet ready.
    pub async fn publish(&self, frame: Bytes) -> Result<(), TransportError> {
        if !self.is_ready() {
            self.queue.lock().await.push(frame);
            return Ok(());
        }

        match self.transport.publish(&self.own_track, frame.clone()).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_transient() => {
                self.queue.lock().await.push(frame);
                Ok(())
            },
            Err(err) => Err(err),
        }
    }

    /// Idempotently subscribe to a peer's text (control) track, retrying
    /// transient failures with exponential backoff up to
    /// [`BackoffConfig::max_attempts`].
    ///
    /// # Errors
    ///
    /// Returns the last `TransportError` if every attempt failed, or a
    /// fatal error immediately without retrying.
    pub async fn subscribe_peer(&self, pubkey_hex: &str) -> Result<SubscribeOutcome, TransportError> {
        let track_name = track::wrappers_track(&self.group_root, pubkey_hex);
        self.subscribe_track(track_name).await
    }

    /// As [`subscribe_peer`](Self::subscribe_peer), for a peer's audio
    /// track.
    ///
    /// # Errors
    ///
    /// See [`subscribe_peer`](Self::subscribe_peer).
    pub async fn subscribe_peer_audio(
        &self,
        pubkey_hex: &str,
        track_label: &str,
    ) -> Result<SubscribeOutcome, TransportError> {
        let track_name = track::audio_track(&self.group_root, pubkey_hex, track_label);
        self.subscribe_track(track_name).await
    }

    async fn subscribe_track(&self, track_name: String) -> Result<SubscribeOutcome, TransportError> {
        if !self.subscribed.lock().await.insert(track_name.clone()) {
            return Ok(SubscribeOutcome::AlreadySubscribed);
        }

        let mut delay = self.backoff.initial;
        let mut last_err = None;
        for attempt in 0..self.backoff.max_attempts {
            match self.transport.subscribe(&track_name).await {
                Ok(rx) => return Ok(SubscribeOutcome::New(rx)),
                Err(err) if err.is_transient() && attempt + 1 < self.backoff.max_attempts => {
                    tracing::warn!(%err, track = %track_name, attempt, "transient subscribe failure, retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * self.backoff.multiplier).min(self.backoff.cap);
                    last_err = Some(err);
                },
                Err(err) => {
                    self.subscribed.lock().await.remove(&track_name);
                    return Err(err);
                },
            }
        }

        self.subscribed.lock().await.remove(&track_name);
        Err(last_err.unwrap_or(TransportError::ConnectionClosed))
    }

    /// Flush and close the underlying transport.
    ///
    /// # Errors
    ///
    /// Propagates whatever the underlying transport's `close` returns.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.transport.close().await
    }

    /// The group root this bridge is scoped to (`marmot/<hex>`).
    #[must_use]
    pub fn group_root(&self) -> &str {
        &self.group_root
    }
}
