//! Per-(sender, track) media key schedules (C5), keyed off the MLS group's
//! exporter secret and leaf indices.
//!
//! This module owns no transport or clock of its own: every call takes the
//! live [`MlsGroup`] and the driver's notion of "now" as arguments, and
//! returns plain bytes the host hands to (or receives from) a MoQ audio
//! track.

use std::collections::HashMap;

use marmot_core::{
    MlsError,
    env::Environment,
    mls::{MemberPubkey, MlsGroup},
};
use marmot_crypto::{MEDIA_BASE_KEY_LABEL, MediaCryptoError, MediaKeySchedule, media_base_key_context};
use marmot_proto::{aad::build_media_aad, media_frame::MediaFrame, track::TrackPosition};

/// Errors from the media pipeline, distinct from [`crate::EngineError`]'s
/// MLS/transport variants so AEAD failures keep their own detail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    /// Deriving the base key from the MLS exporter failed.
    #[error(transparent)]
    Mls(#[from] MlsError),

    /// The AEAD primitive or key schedule rejected the frame.
    #[error(transparent)]
    Crypto(#[from] MediaCryptoError),

    /// The wire frame was too short to contain a counter.
    #[error("malformed media frame")]
    Malformed,
}

fn base_key<E: Environment>(
    group: &MlsGroup<E>,
    sender_leaf: u32,
    track_label: &str,
) -> Result<[u8; 32], MlsError> {
    let context = media_base_key_context(sender_leaf, track_label, group.epoch());
    let exported = group.export_secret(MEDIA_BASE_KEY_LABEL, &context, 32)?;
    Ok(exported.try_into().unwrap_or([0u8; 32]))
}

/// Owns one [`MediaKeySchedule`] per (sender, track label) pair this session
/// has encrypted or decrypted for, rotating each lazily to the group's
/// current epoch on first use after a commit.
pub struct MediaRegistry<E: Environment> {
    schedules: HashMap<(MemberPubkey, String), MediaKeySchedule<E::Instant>>,
}

impl<E: Environment> MediaRegistry<E> {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { schedules: HashMap::new() }
    }

    fn schedule_for(
        &mut self,
        group: &MlsGroup<E>,
        sender: MemberPubkey,
        sender_leaf: u32,
        track_label: &str,
        now: E::Instant,
    ) -> Result<&mut MediaKeySchedule<E::Instant>, MlsError> {
        let epoch = group.epoch();
        let key = (sender, track_label.to_string());

        if let Some(existing) = self.schedules.get(&key) {
            if existing.epoch() != epoch {
                let new_base = base_key(group, sender_leaf, track_label)?;
                self.schedules.get_mut(&key).expect("just checked").rotate(epoch, new_base, now);
            }
        } else {
            let base = base_key(group, sender_leaf, track_label)?;
            self.schedules.insert(key.clone(), MediaKeySchedule::new(epoch, base));
        }

        Ok(self.schedules.get_mut(&key).expect("inserted or rotated above"))
    }

    /// Encrypt one outbound audio frame for this client's own track,
    /// returning the wire-ready `[counter || ciphertext]` bytes.
    ///
    /// # Errors
    ///
    /// See [`MediaError`].
    pub fn encrypt(
        &mut self,
        group: &MlsGroup<E>,
        track_label: &str,
        counter: u32,
        plaintext: &[u8],
        position: TrackPosition,
        now: E::Instant,
    ) -> Result<Vec<u8>, MediaError> {
        let own_pubkey = group.own_pubkey();
        let own_leaf = group.own_leaf_index();
        let group_root = group.derive_group_root();
        let epoch = group.epoch();

        let aad = build_media_aad(&group_root, track_label, epoch, position);
        let schedule = self.schedule_for(group, own_pubkey, own_leaf, track_label, now)?;
        let ciphertext = schedule.encrypt(counter, plaintext, &aad, now)?;

        Ok(MediaFrame::new(counter, ciphertext).to_bytes())
    }

    /// Decrypt one inbound audio frame from `sender`'s track.
    ///
    /// Tries the group's current epoch first, then the immediately
    /// preceding one (still within the media key schedule's retention
    /// window), to absorb frames racing a commit across the rotation.
    ///
    /// # Errors
    ///
    /// See [`MediaError`].
    pub fn decrypt(
        &mut self,
        group: &MlsGroup<E>,
        sender: MemberPubkey,
        track_label: &str,
        wire_bytes: &[u8],
        position: TrackPosition,
        now: E::Instant,
    ) -> Result<Vec<u8>, MediaError> {
        let frame = MediaFrame::decode(wire_bytes).map_err(|_| MediaError::Malformed)?;
        let sender_leaf = group.leaf_index_of(sender)?;
        let group_root = group.derive_group_root();
        let current_epoch = group.epoch();

        let schedule = self.schedule_for(group, sender, sender_leaf, track_label, now)?;

        let current_aad = build_media_aad(&group_root, track_label, current_epoch, position);
        match schedule.decrypt(current_epoch, frame.counter, &frame.ciphertext, &current_aad, now) {
            Ok(plaintext) => Ok(plaintext),
            Err(err) if current_epoch > 0 => {
                let previous_epoch = current_epoch - 1;
                let previous_aad = build_media_aad(&group_root, track_label, previous_epoch, position);
                schedule
                    .decrypt(previous_epoch, frame.counter, &frame.ciphertext, &previous_aad, now)
                    .map_err(|_| MediaError::Crypto(err))
            },
            Err(err) => Err(MediaError::Crypto(err)),
        }
    }

    /// Drop generation key material that has aged out of every schedule's
    /// retention window. Call periodically (e.g. alongside handshake ticks).
    pub fn purge_expired(&mut self, now: E::Instant) {
        for schedule in self.schedules.values_mut() {
            schedule.purge_expired(now);
        }
    }
}

impl<E: Environment> Default for MediaRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}
