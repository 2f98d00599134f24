//! Per-sender/per-track/per-epoch/per-generation AEAD key schedule for
//! real-time media, derived entirely from the MLS exporter.
//!
//! [`MediaKeySchedule`] is the stateful entry point: it owns the current
//! epoch's base key, derives and caches generation keys on demand, and
//! retains the immediately preceding epoch's material for a short window so
//! frames racing a commit still decrypt.

pub mod base;
pub mod cache;
pub mod cipher;
pub mod error;

use std::{collections::HashSet, time::Duration};

pub use base::{GenerationKeys, MEDIA_BASE_KEY_LABEL, media_base_key_context};
pub use cache::{DEFAULT_RETENTION, GenerationCache};
pub use cipher::{build_nonce, decrypt_audio_frame, encrypt_audio_frame};
pub use error::MediaCryptoError;

fn generation_of(counter: u32) -> u8 {
    (counter >> 24) as u8
}

fn intra_generation_counter_of(counter: u32) -> u32 {
    counter & 0x00FF_FFFF
}

struct EpochKeys<Instant> {
    epoch: u64,
    base: [u8; 32],
    generations: GenerationCache<Instant>,
    issued_counters: HashSet<u32>,
}

impl<Instant> EpochKeys<Instant>
where
    Instant: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    fn new(epoch: u64, base: [u8; 32], retention: Duration) -> Self {
        Self { epoch, base, generations: GenerationCache::new(retention), issued_counters: HashSet::new() }
    }
}

/// Stateful media key schedule for one (sender, track) pair.
///
/// Rotates its base key on every MLS epoch change ([`rotate`](Self::rotate)),
/// while retaining the previous epoch's keys for [`DEFAULT_RETENTION`] so
/// frames sent just before a commit still decrypt after it lands.
pub struct MediaKeySchedule<Instant> {
    current: EpochKeys<Instant>,
    previous: Option<(EpochKeys<Instant>, Instant)>,
    retention: Duration,
}

impl<Instant> MediaKeySchedule<Instant>
where
    Instant: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    /// A schedule starting at `epoch` with the given MLS-exporter-derived
    /// base key, using [`DEFAULT_RETENTION`] for superseded epochs.
    #[must_use]
    pub fn new(epoch: u64, base: [u8; 32]) -> Self {
        Self::with_retention(epoch, base, DEFAULT_RETENTION)
    }

    /// As [`new`](Self::new), with an explicit retention window.
    #[must_use]
    pub fn with_retention(epoch: u64, base: [u8; 32], retention: Duration) -> Self {
        Self { current: EpochKeys::new(epoch, base, retention), previous: None, retention }
    }

    /// This schedule's current epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.current.epoch
    }

    /// Advance to a new epoch's base key, retiring the current one into the
    /// retention window. Called once per merged commit.
    pub fn rotate(&mut self, new_epoch: u64, new_base: [u8; 32], now: Instant) {
        let retired = std::mem::replace(&mut self.current, EpochKeys::new(new_epoch, new_base, self.retention));
        self.previous = Some((retired, now));
    }

    /// Encrypt a frame for the current epoch.
    ///
    /// # Errors
    ///
    /// Returns [`MediaCryptoError::CounterReuse`] if `counter` was already
    /// used in the current epoch, or [`MediaCryptoError::EncryptionFailed`]
    /// if the AEAD primitive rejects the call.
    pub fn encrypt(
        &mut self,
        counter: u32,
        plaintext: &[u8],
        aad: &[u8],
        now: Instant,
    ) -> Result<Vec<u8>, MediaCryptoError> {
        if !self.current.issued_counters.insert(counter) {
            return Err(MediaCryptoError::CounterReuse { generation: generation_of(counter), counter });
        }

        let generation = generation_of(counter);
        let keys = self.current.generations.get_or_derive(generation, now, &self.current.base);
        encrypt_audio_frame(keys, intra_generation_counter_of(counter), plaintext, aad)
    }

    /// Decrypt and authenticate a frame carried at `epoch`.
    ///
    /// Accepts the current epoch, or the immediately preceding one while it
    /// remains within the retention window as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`MediaCryptoError::StaleEpoch`] if `epoch` is neither current
    /// nor a still-retained previous epoch, or
    /// [`MediaCryptoError::DecryptionFailed`] on an AEAD authentication
    /// failure.
    pub fn decrypt(
        &mut self,
        epoch: u64,
        counter: u32,
        ciphertext: &[u8],
        aad: &[u8],
        now: Instant,
    ) -> Result<Vec<u8>, MediaCryptoError> {
        let generation = generation_of(counter);
        let intra_counter = intra_generation_counter_of(counter);

        if epoch == self.current.epoch {
            let keys = self.current.generations.get_or_derive(generation, now, &self.current.base);
            return decrypt_audio_frame(keys, intra_counter, ciphertext, aad);
        }

        if let Some((retired, retired_at)) = self.previous.as_mut() {
            if epoch == retired.epoch && now - *retired_at <= self.retention {
                let keys = retired.generations.get_or_derive(generation, now, &retired.base);
                return decrypt_audio_frame(keys, intra_counter, ciphertext, aad);
            }
        }

        Err(MediaCryptoError::StaleEpoch { requested: epoch, current: self.current.epoch })
    }

    /// Drop generation key material that has aged out of the retention
    /// window, for both the current and (if present) previous epoch.
    pub fn purge_expired(&mut self, now: Instant) {
        self.current.generations.purge_expired(now);
        if let Some((retired, retired_at)) = self.previous.as_mut() {
            retired.generations.purge_expired(now);
            if now - *retired_at > self.retention {
                self.previous = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip_within_epoch() {
        let mut schedule = MediaKeySchedule::new(0, [3u8; 32]);
        let now = Instant::now();
        let ciphertext = schedule.encrypt(0x00_00_00_01, b"frame", b"aad", now).expect("encrypts");
        let plaintext = schedule.decrypt(0, 0x00_00_00_01, &ciphertext, b"aad", now).expect("decrypts");
        assert_eq!(plaintext, b"frame");
    }

    #[test]
    fn reused_counter_is_rejected() {
        let mut schedule = MediaKeySchedule::new(0, [3u8; 32]);
        let now = Instant::now();
        schedule.encrypt(1, b"a", b"aad", now).expect("first use succeeds");
        let err = schedule.encrypt(1, b"b", b"aad", now).unwrap_err();
        assert!(matches!(err, MediaCryptoError::CounterReuse { counter: 1, .. }));
    }

    #[test]
    fn rotation_retires_previous_epoch_keys() {
        let mut schedule = MediaKeySchedule::with_retention(0, [3u8; 32], Duration::from_secs(10));
        let t0 = Instant::now();
        let old_ciphertext = schedule.encrypt(1, b"pre-rotation", b"aad", t0).expect("encrypts");

        schedule.rotate(1, [9u8; 32], t0);

        let decrypted = schedule.decrypt(0, 1, &old_ciphertext, b"aad", t0).expect("previous epoch still retained");
        assert_eq!(decrypted, b"pre-rotation");
    }

    #[test]
    fn stale_epoch_is_rejected_after_retention_elapses() {
        let mut schedule = MediaKeySchedule::with_retention(0, [3u8; 32], Duration::from_secs(10));
        let t0 = Instant::now();
        let ciphertext = schedule.encrypt(1, b"pre-rotation", b"aad", t0).expect("encrypts");
        schedule.rotate(1, [9u8; 32], t0);

        let after_retention = t0 + Duration::from_secs(11);
        let err = schedule.decrypt(0, 1, &ciphertext, b"aad", after_retention).unwrap_err();
        assert!(matches!(err, MediaCryptoError::StaleEpoch { requested: 0, current: 1 }));
    }

    #[test]
    fn unknown_epoch_is_stale() {
        let mut schedule = MediaKeySchedule::new(5, [3u8; 32]);
        let now = Instant::now();
        let err = schedule.decrypt(2, 1, &[0u8; 32], b"aad", now).unwrap_err();
        assert!(matches!(err, MediaCryptoError::StaleEpoch { requested: 2, current: 5 }));
    }

    #[test]
    fn generation_rolls_over_at_high_byte_boundary() {
        let mut schedule = MediaKeySchedule::new(0, [7u8; 32]);
        let now = Instant::now();
        let last_of_gen0 = schedule.encrypt(0x00FF_FFFF, b"last", b"aad", now).expect("encrypts");
        let first_of_gen1 = schedule.encrypt(0x0100_0000, b"first", b"aad", now).expect("encrypts");

        assert_eq!(schedule.decrypt(0, 0x00FF_FFFF, &last_of_gen0, b"aad", now).expect("decrypts"), b"last");
        assert_eq!(schedule.decrypt(0, 0x0100_0000, &first_of_gen1, b"aad", now).expect("decrypts"), b"first");
    }
}
