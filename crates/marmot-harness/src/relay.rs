//! In-memory signalling relay: broadcasts [`SignedEvent`]s to every current
//! subscriber, deduplicating by id.
//!
//! Mirrors the production relay's best-effort, at-least-once fanout
//! contract: a subscriber only sees events published after it subscribed,
//! and a relay that has already forwarded an id will not forward it again
//! even if the same client republishes it (the bootstrap handshake's own
//! idempotence means this is a convenience, not a correctness requirement).

use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex},
};

use marmot_proto::envelope::SignedEvent;

struct RelayState {
    seen: HashSet<[u8; 32]>,
    subscribers: Vec<VecDeque<SignedEvent>>,
}

/// Shared in-memory signalling relay.
pub struct SimRelay {
    state: Mutex<RelayState>,
}

impl SimRelay {
    /// A fresh relay with no subscribers and no published history.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self { state: Mutex::new(RelayState { seen: HashSet::new(), subscribers: Vec::new() }) })
    }

    /// Register a new subscriber, returning its index for
    /// [`SimRelay::poll`].
    pub fn subscribe(&self) -> usize {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.subscribers.push(VecDeque::new());
        state.subscribers.len() - 1
    }

    /// Broadcast `event` to every subscriber registered so far, unless its
    /// id has already been published.
    pub fn publish(&self, event: SignedEvent) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if !state.seen.insert(event.id) {
            return;
        }
        for queue in &mut state.subscribers {
            queue.push_back(event.clone());
        }
    }

    /// Pop the next event queued for subscriber `slot`, if any.
    pub fn poll(&self, slot: usize) -> Option<SignedEvent> {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.subscribers.get_mut(slot).and_then(VecDeque::pop_front)
    }
}

impl Default for SimRelay {
    fn default() -> Self {
        Self { state: Mutex::new(RelayState { seen: HashSet::new(), subscribers: Vec::new() }) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: u8, content: &str) -> SignedEvent {
        SignedEvent::new([id; 32], 0, 445, vec![], content.to_string())
    }

    #[test]
    fn subscriber_only_sees_events_published_after_it_joined() {
        let relay = SimRelay::new();
        relay.publish(event(1, "before"));
        let slot = relay.subscribe();
        relay.publish(event(2, "after"));

        let first = relay.poll(slot).expect("one event");
        assert_eq!(first.content, "after");
        assert!(relay.poll(slot).is_none());
    }

    #[test]
    fn republishing_the_same_id_is_not_delivered_twice() {
        let relay = SimRelay::new();
        let slot = relay.subscribe();
        let evt = event(3, "dup");
        relay.publish(evt.clone());
        relay.publish(evt);

        assert!(relay.poll(slot).is_some());
        assert!(relay.poll(slot).is_none());
    }

    #[test]
    fn every_subscriber_receives_a_broadcast() {
        let relay = SimRelay::new();
        let a = relay.subscribe();
        let b = relay.subscribe();
        relay.publish(event(4, "hello"));

        assert!(relay.poll(a).is_some());
        assert!(relay.poll(b).is_some());
    }
}
