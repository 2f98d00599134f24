//! Bounded FIFO of wrappers that failed to ingest transiently, replayed in
//! arrival order after every commit merge.
//!
//! Mirrors `marmot_client::transport`'s publish backlog: bounded capacity,
//! oldest-drop on overflow, logged via `tracing`.

use std::collections::VecDeque;

/// A wrapper that failed transiently, queued for replay on the next commit
/// merge.
#[derive(Debug, Clone)]
pub struct PendingFrame {
    /// Hex-encoded public key of the peer whose track this arrived on.
    pub from_hex: String,
    /// The wrapper bytes, unchanged since arrival.
    pub bytes: Vec<u8>,
    /// How many replay attempts have already failed transiently.
    pub attempts: u32,
}

/// Bounded, oldest-drop queue of [`PendingFrame`]s, with a per-frame retry
/// ceiling.
pub struct PendingFrameQueue {
    frames: VecDeque<PendingFrame>,
    capacity: usize,
    max_attempts: u32,
}

impl PendingFrameQueue {
    /// Default bound on the number of queued frames.
    pub const DEFAULT_CAPACITY: usize = 256;
    /// Default bound on replay attempts before a frame is dropped.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

    /// A queue with the default capacity and retry ceiling.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(Self::DEFAULT_CAPACITY, Self::DEFAULT_MAX_ATTEMPTS)
    }

    /// As [`new`](Self::new), with explicit bounds.
    #[must_use]
    pub fn with_limits(capacity: usize, max_attempts: u32) -> Self {
        Self { frames: VecDeque::with_capacity(capacity), capacity, max_attempts }
    }

    /// Queue a wrapper that just failed transiently, at zero prior attempts.
    pub fn push(&mut self, from_hex: String, bytes: Vec<u8>) {
        if self.frames.len() >= self.capacity {
            self.frames.pop_front();
            tracing::warn!("pending-frame queue full, dropping oldest frame");
        }
        self.frames.push_back(PendingFrame { from_hex, bytes, attempts: 0 });
    }

    /// Drain every queued frame in arrival order, for a replay pass. Frames
    /// the caller determines are still transient should be re-queued via
    /// [`requeue`](Self::requeue); anything else is simply dropped by the
    /// caller's handling of the replay outcome.
    pub fn drain(&mut self) -> Vec<PendingFrame> {
        self.frames.drain(..).collect()
    }

    /// Re-queue a frame that failed transiently again during a replay pass,
    /// unless it has exhausted its retry ceiling (in which case it is
    /// dropped with a warning).
    pub fn requeue(&mut self, mut frame: PendingFrame) {
        frame.attempts += 1;
        if frame.attempts >= self.max_attempts {
            tracing::warn!(
                attempts = frame.attempts,
                from = %frame.from_hex,
                "dropping pending frame after exhausting retry ceiling"
            );
            return;
        }
        self.frames.push_back(frame);
    }

    /// Whether the queue currently holds any frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of frames currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }
}

impl Default for PendingFrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_drops_oldest() {
        let mut queue = PendingFrameQueue::with_limits(2, 8);
        queue.push("aa".to_string(), vec![1]);
        queue.push("bb".to_string(), vec![2]);
        queue.push("cc".to_string(), vec![3]);

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].from_hex, "bb");
        assert_eq!(drained[1].from_hex, "cc");
    }

    #[test]
    fn requeue_respects_retry_ceiling() {
        let mut queue = PendingFrameQueue::with_limits(8, 2);
        queue.push("aa".to_string(), vec![1]);
        let frame = queue.drain().pop().expect("one frame");

        queue.requeue(frame);
        assert_eq!(queue.len(), 1);

        let frame = queue.drain().pop().expect("still one frame");
        queue.requeue(frame);
        assert!(queue.is_empty(), "frame dropped after exhausting retry ceiling");
    }

    #[test]
    fn drain_preserves_arrival_order() {
        let mut queue = PendingFrameQueue::new();
        queue.push("a".to_string(), vec![1]);
        queue.push("b".to_string(), vec![2]);
        queue.push("c".to_string(), vec![3]);

        let drained: Vec<_> = queue.drain().into_iter().map(|f| f.from_hex).collect();
        assert_eq!(drained, vec!["a", "b", "c"]);
    }
}
