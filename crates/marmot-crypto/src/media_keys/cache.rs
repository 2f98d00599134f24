//! Time-bounded cache for superseded generation key material.
//!
//! Generic over the caller's instant type so the same cache works under a
//! production clock and a simulated one; see `marmot_core::env::Environment`
//! for the trait this is meant to be paired with, though this crate does not
//! depend on it directly.

use std::{collections::HashMap, time::Duration};

use super::base::GenerationKeys;

/// Default retention window for a superseded generation or epoch: long
/// enough to absorb reorder and late delivery across a commit boundary.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(10);

/// Caches [`GenerationKeys`] by generation number, for a retention window
/// measured against a caller-supplied clock.
pub struct GenerationCache<Instant> {
    retention: Duration,
    entries: HashMap<u8, (GenerationKeys, Instant)>,
}

impl<Instant> GenerationCache<Instant>
where
    Instant: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    /// A cache with the given retention window.
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self { retention, entries: HashMap::new() }
    }

    /// Insert or replace the key material for `generation`, stamped `now`.
    pub fn insert(&mut self, generation: u8, keys: GenerationKeys, now: Instant) {
        self.entries.insert(generation, (keys, now));
    }

    /// Look up `generation`'s key material if it is still within the
    /// retention window as of `now`.
    #[must_use]
    pub fn get(&self, generation: u8, now: Instant) -> Option<&GenerationKeys> {
        self.entries
            .get(&generation)
            .filter(|(_, inserted_at)| now - *inserted_at <= self.retention)
            .map(|(keys, _)| keys)
    }

    /// Drop entries whose retention window has elapsed as of `now`.
    pub fn purge_expired(&mut self, now: Instant) {
        self.entries.retain(|_, (_, inserted_at)| now - *inserted_at <= self.retention);
    }

    /// Return `generation`'s key material, deriving (or re-deriving, if the
    /// cached entry has aged out) it from `base` as needed.
    pub fn get_or_derive(&mut self, generation: u8, now: Instant, base: &[u8; 32]) -> &GenerationKeys {
        use std::collections::hash_map::Entry;

        match self.entries.entry(generation) {
            Entry::Occupied(occupied) if now - occupied.get().1 <= self.retention => {
                &occupied.into_mut().0
            },
            Entry::Occupied(mut occupied) => {
                occupied.insert((GenerationKeys::derive(base, generation), now));
                &occupied.into_mut().0
            },
            Entry::Vacant(vacant) => &vacant.insert((GenerationKeys::derive(base, generation), now)).0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn fresh_entry_is_retrievable() {
        let mut cache = GenerationCache::new(Duration::from_secs(10));
        let now = Instant::now();
        cache.insert(3, GenerationKeys::derive(&[1u8; 32], 3), now);
        assert!(cache.get(3, now).is_some());
    }

    #[test]
    fn expired_entry_is_not_retrievable() {
        let mut cache = GenerationCache::new(Duration::from_millis(1));
        let inserted_at = Instant::now();
        cache.insert(3, GenerationKeys::derive(&[1u8; 32], 3), inserted_at);
        let later = inserted_at + Duration::from_secs(1);
        assert!(cache.get(3, later).is_none());
    }

    #[test]
    fn purge_removes_only_expired_entries() {
        let mut cache = GenerationCache::new(Duration::from_millis(1));
        let t0 = Instant::now();
        cache.insert(1, GenerationKeys::derive(&[1u8; 32], 1), t0);
        let t1 = t0 + Duration::from_secs(1);
        cache.insert(2, GenerationKeys::derive(&[1u8; 32], 2), t1);
        cache.purge_expired(t1);
        assert!(cache.get(1, t1).is_none());
        assert!(cache.get(2, t1).is_some());
    }
}
