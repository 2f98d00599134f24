//! Bootstrap handshake: the idempotent two-party exchange that gets a
//! creator and an invitee from nothing to "both hold the same MLS group
//! identifier" over a lossy, unordered, deduplicated signed-event relay.
//!
//! Sans-IO, like [`crate::mls::MlsGroup`]: [`Handshake::on_envelope`] and
//! [`Handshake::on_tick`] take the inputs a driver observed and return a
//! list of [`HandshakeAction`]s for that driver to execute (sign and
//! publish an envelope, hand a key package or welcome to the MLS group,
//! sleep). This crate never touches a relay socket or a wall clock.

use std::{collections::HashSet, time::Duration};

use marmot_proto::envelope::{EnvelopeBody, HandshakeRole, SignedEvent};

use crate::{
    env::Environment,
    identity,
    mls::{GroupId, MemberPubkey},
};

/// Tuning knobs for the handshake's retry cadence and overall patience.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// How often the invitee re-publishes its key package / welcome request
    /// while waiting. The creator replays its last welcome at the same
    /// cadence in response, rather than on its own timer.
    pub heartbeat_interval: Duration,

    /// Wall-clock bound (measured from handshake start) after which an
    /// unresolved handshake times out fatally.
    pub overall_timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self { heartbeat_interval: Duration::from_secs(2), overall_timeout: Duration::from_secs(60) }
    }
}

/// What a driver should do in response to a handshake event or tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeAction {
    /// Sign and publish an envelope carrying this body on the session's
    /// bootstrap channel.
    Publish(EnvelopeBody),

    /// Creator-only: the invitee's key package arrived for the first time.
    /// The driver calls `MlsGroup::create_group` with this invitee and, on
    /// success, reports the result back via
    /// [`Handshake::on_group_created`].
    CreateGroup {
        /// The invitee being admitted.
        invitee_pubkey: MemberPubkey,
        /// Their MLS key package bundle, opaque to this module.
        key_package_bytes: Vec<u8>,
    },

    /// Invitee-only: a welcome arrived. The driver calls
    /// `MlsGroup::accept_welcome` and reports the result back via
    /// [`Handshake::on_welcome_accepted`] or [`Handshake::on_welcome_rejected`].
    AcceptWelcome {
        /// The group this welcome claims to join.
        group_id: GroupId,
        /// The serialized MLS welcome message.
        welcome_bytes: Vec<u8>,
    },

    /// The overall handshake timeout elapsed without resolving. Surfaced by
    /// the controller as a fatal error recommending the user refresh.
    TimedOut,
}

/// Current phase of one side of the handshake, for `Handshake{phase}` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Creator: no key package observed yet.
    AwaitingKeyPackage,
    /// Creator: welcome sent, waiting for confirming application traffic.
    AwaitingConfirmation,
    /// Creator: confirmed by observed application traffic. Terminal.
    Confirmed,
    /// Invitee: publishing key package / welcome-request heartbeats.
    AwaitingWelcome,
    /// Invitee: welcome accepted and group joined. Terminal.
    Joined,
    /// Either side: the overall timeout elapsed. Terminal.
    TimedOut,
}

enum RoleState {
    Creator { inner: CreatorState },
    Invitee { inner: InviteeState, key_package_bytes: Vec<u8> },
}

enum CreatorState {
    AwaitingKeyPackage,
    AwaitingConfirmation { group_id: GroupId, welcome_bytes: Vec<u8> },
    Confirmed,
    TimedOut,
}

enum InviteeState {
    AwaitingWelcome,
    Joined { group_id: GroupId },
    TimedOut,
}

/// One side of a bootstrap handshake for a single session.
pub struct Handshake<E: Environment> {
    env: E,
    session: [u8; 16],
    own_pubkey: MemberPubkey,
    config: HandshakeConfig,
    started_at: E::Instant,
    last_heartbeat: Option<E::Instant>,
    seen_event_ids: HashSet<[u8; 32]>,
    role: RoleState,
}

impl<E: Environment> Handshake<E> {
    /// Start a handshake as the group creator, waiting for the first key
    /// package.
    #[must_use]
    pub fn new_creator(
        env: E,
        session: [u8; 16],
        own_pubkey: MemberPubkey,
        config: HandshakeConfig,
    ) -> Self {
        let started_at = env.now();
        Self {
            env,
            session,
            own_pubkey,
            config,
            started_at,
            last_heartbeat: None,
            seen_event_ids: HashSet::new(),
            role: RoleState::Creator { inner: CreatorState::AwaitingKeyPackage },
        }
    }

    /// Start a handshake as the invitee, with a key package already
    /// produced by `MlsGroup::create_key_package` and ready to publish.
    #[must_use]
    pub fn new_invitee(
        env: E,
        session: [u8; 16],
        own_pubkey: MemberPubkey,
        key_package_bytes: Vec<u8>,
        config: HandshakeConfig,
    ) -> Self {
        let started_at = env.now();
        Self {
            env,
            session,
            own_pubkey,
            config,
            started_at,
            last_heartbeat: None,
            seen_event_ids: HashSet::new(),
            role: RoleState::Invitee { inner: InviteeState::AwaitingWelcome, key_package_bytes },
        }
    }

    /// Current phase, for surfacing `Handshake{phase}` events.
    #[must_use]
    pub fn phase(&self) -> Phase {
        match &self.role {
            RoleState::Creator { inner: CreatorState::AwaitingKeyPackage } => Phase::AwaitingKeyPackage,
            RoleState::Creator { inner: CreatorState::AwaitingConfirmation { .. } } => {
                Phase::AwaitingConfirmation
            },
            RoleState::Creator { inner: CreatorState::Confirmed } => Phase::Confirmed,
            RoleState::Creator { inner: CreatorState::TimedOut }
            | RoleState::Invitee { inner: InviteeState::TimedOut, .. } => Phase::TimedOut,
            RoleState::Invitee { inner: InviteeState::AwaitingWelcome, .. } => Phase::AwaitingWelcome,
            RoleState::Invitee { inner: InviteeState::Joined { .. }, .. } => Phase::Joined,
        }
    }

    /// Whether this side has reached a terminal phase (confirmed, joined,
    /// or timed out) and no longer needs driving.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.phase(), Phase::Confirmed | Phase::Joined | Phase::TimedOut)
    }

    fn own_role(&self) -> HandshakeRole {
        match self.role {
            RoleState::Creator { .. } => HandshakeRole::Creator,
            RoleState::Invitee { .. } => HandshakeRole::Invitee,
        }
    }

    /// Process a signed event observed on the relay. Returns an empty list
    /// for events that are duplicates, off-channel, self-authored, or fail
    /// signature verification.
    pub fn on_envelope(&mut self, event: &SignedEvent) -> Vec<HandshakeAction> {
        if event.pubkey == self.own_pubkey {
            return Vec::new();
        }
        if !self.seen_event_ids.insert(event.id) {
            return Vec::new();
        }
        if event.session_tag() != Some(hex::encode(self.session).as_str()) {
            return Vec::new();
        }
        if !event.verify_id() {
            return Vec::new();
        }
        if identity::verify(&event.pubkey, event.signing_data(), &event.sig).is_err() {
            return Vec::new();
        }
        let Ok(envelope) = event.envelope() else {
            return Vec::new();
        };
        if envelope.from_role == self.own_role() {
            return Vec::new();
        }

        match &self.role {
            RoleState::Creator { inner } => {
                Self::on_creator_envelope(inner, event.pubkey, envelope.body)
            },
            RoleState::Invitee { inner, .. } => Self::on_invitee_envelope(inner, envelope.body),
        }
    }

    fn on_creator_envelope(
        state: &CreatorState,
        invitee_pubkey: MemberPubkey,
        body: EnvelopeBody,
    ) -> Vec<HandshakeAction> {
        match (state, body) {
            (CreatorState::AwaitingKeyPackage, EnvelopeBody::KeyPackage { bundle, .. }) => {
                vec![HandshakeAction::CreateGroup { invitee_pubkey, key_package_bytes: bundle }]
            },
            (CreatorState::AwaitingConfirmation { group_id, welcome_bytes }, EnvelopeBody::RequestWelcome) => {
                vec![HandshakeAction::Publish(EnvelopeBody::Welcome {
                    welcome: welcome_bytes.clone(),
                    group_id: *group_id,
                })]
            },
            (CreatorState::AwaitingConfirmation { group_id, welcome_bytes }, EnvelopeBody::KeyPackage { .. }) => {
                // Retransmitted offer after we've already formed the group:
                // replay the same welcome rather than forming a second one.
                vec![HandshakeAction::Publish(EnvelopeBody::Welcome {
                    welcome: welcome_bytes.clone(),
                    group_id: *group_id,
                })]
            },
            _ => Vec::new(),
        }
    }

    fn on_invitee_envelope(state: &InviteeState, body: EnvelopeBody) -> Vec<HandshakeAction> {
        match (state, body) {
            (InviteeState::AwaitingWelcome, EnvelopeBody::Welcome { welcome, group_id }) => {
                vec![HandshakeAction::AcceptWelcome { group_id, welcome_bytes: welcome }]
            },
            (InviteeState::Joined { group_id: known }, EnvelopeBody::Welcome { group_id, .. })
                if group_id == *known =>
            {
                // Already joined this exact group: idempotent no-op.
                Vec::new()
            },
            _ => Vec::new(),
        }
    }

    /// The driver calls this once `MlsGroup::create_group` has returned
    /// successfully for the invitee named in a [`HandshakeAction::CreateGroup`].
    pub fn on_group_created(&mut self, group_id: GroupId, welcome_bytes: Vec<u8>) -> Vec<HandshakeAction> {
        let RoleState::Creator { inner } = &mut self.role else {
            return Vec::new();
        };
        if !matches!(inner, CreatorState::AwaitingKeyPackage) {
            return Vec::new();
        }
        *inner = CreatorState::AwaitingConfirmation { group_id, welcome_bytes: welcome_bytes.clone() };
        vec![HandshakeAction::Publish(EnvelopeBody::Welcome { welcome: welcome_bytes, group_id })]
    }

    /// The driver calls this once it has observed application traffic from
    /// the invitee, confirming the welcome was accepted. Terminal for the
    /// creator side.
    pub fn on_confirmed(&mut self) {
        if let RoleState::Creator { inner } = &mut self.role {
            if matches!(inner, CreatorState::AwaitingConfirmation { .. }) {
                *inner = CreatorState::Confirmed;
            }
        }
    }

    /// The driver calls this once `MlsGroup::accept_welcome` succeeded.
    /// Terminal for the invitee side.
    pub fn on_welcome_accepted(&mut self, group_id: GroupId) {
        if let RoleState::Invitee { inner, .. } = &mut self.role {
            *inner = InviteeState::Joined { group_id };
        }
    }

    /// The driver calls this if `MlsGroup::accept_welcome` rejected the
    /// welcome (e.g. a stale epoch after the creator re-rolled the group).
    /// Resets the invitee to resume heartbeating.
    pub fn on_welcome_rejected(&mut self) {
        if let RoleState::Invitee { inner, .. } = &mut self.role {
            *inner = InviteeState::AwaitingWelcome;
        }
        self.last_heartbeat = None;
    }

    /// Drive time-based behaviour: the invitee's heartbeat cadence and the
    /// overall handshake timeout. Call periodically (e.g. alongside
    /// transport polling).
    pub fn on_tick(&mut self, now: E::Instant) -> Vec<HandshakeAction> {
        if self.is_finished() {
            return Vec::new();
        }

        if now - self.started_at >= self.config.overall_timeout {
            match &mut self.role {
                RoleState::Creator { inner } => *inner = CreatorState::TimedOut,
                RoleState::Invitee { inner, .. } => *inner = InviteeState::TimedOut,
            }
            return vec![HandshakeAction::TimedOut];
        }

        let due = self.last_heartbeat.is_none_or(|last| now - last >= self.config.heartbeat_interval);
        if !due {
            return Vec::new();
        }

        let RoleState::Invitee { inner: InviteeState::AwaitingWelcome, key_package_bytes } = &self.role
        else {
            return Vec::new();
        };

        self.last_heartbeat = Some(now);
        vec![
            HandshakeAction::Publish(EnvelopeBody::KeyPackage {
                bundle: key_package_bytes.clone(),
                pubkey: self.own_pubkey,
            }),
            HandshakeAction::Publish(EnvelopeBody::RequestWelcome),
        ]
    }

    /// Current monotonic time, for driver code that wants to call
    /// [`Handshake::on_tick`] without maintaining its own clock handle.
    #[must_use]
    pub fn now(&self) -> E::Instant {
        self.env.now()
    }
}

#[cfg(test)]
mod tests {
    use crate::env::test_utils::MockEnv;

    use super::*;

    fn signed(
        pubkey: MemberPubkey,
        session: [u8; 16],
        role: HandshakeRole,
        body: EnvelopeBody,
        created_at: u64,
    ) -> SignedEvent {
        let envelope = marmot_proto::envelope::HandshakeEnvelope { session, from_role: role, created_at, body };
        let content = serde_json::to_string(&envelope).expect("serializes");
        let tags = vec![vec!["t".to_string(), hex::encode(session)]];
        let id = SignedEvent::compute_id(&pubkey, created_at, marmot_proto::envelope::HANDSHAKE_EVENT_KIND, &tags, &content);
        SignedEvent {
            id,
            pubkey,
            created_at,
            kind: marmot_proto::envelope::HANDSHAKE_EVENT_KIND,
            tags,
            content,
            sig: [0u8; 64],
        }
    }

    #[test]
    fn creator_requests_group_creation_on_first_key_package() {
        let env = MockEnv::with_crypto_rng();
        let session = [1u8; 16];
        let mut hs = Handshake::new_creator(env, session, [1u8; 32], HandshakeConfig::default());

        let event = signed(
            [2u8; 32],
            session,
            HandshakeRole::Invitee,
            EnvelopeBody::KeyPackage { bundle: vec![9, 9, 9], pubkey: [2u8; 32] },
            1,
        );
        let actions = hs.on_envelope(&event);
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            &actions[0],
            HandshakeAction::CreateGroup { invitee_pubkey, key_package_bytes }
                if *invitee_pubkey == [2u8; 32] && key_package_bytes == &vec![9, 9, 9]
        ));
    }

    #[test]
    fn creator_replays_welcome_on_repeated_request() {
        let env = MockEnv::with_crypto_rng();
        let session = [1u8; 16];
        let mut hs = Handshake::new_creator(env, session, [1u8; 32], HandshakeConfig::default());

        let kp = signed(
            [2u8; 32],
            session,
            HandshakeRole::Invitee,
            EnvelopeBody::KeyPackage { bundle: vec![1], pubkey: [2u8; 32] },
            1,
        );
        hs.on_envelope(&kp);
        let actions = hs.on_group_created([7u8; 32], vec![1, 2, 3]);
        assert_eq!(actions.len(), 1);

        let req = signed([2u8; 32], session, HandshakeRole::Invitee, EnvelopeBody::RequestWelcome, 2);
        let actions = hs.on_envelope(&req);
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            &actions[0],
            HandshakeAction::Publish(EnvelopeBody::Welcome { group_id, welcome })
                if *group_id == [7u8; 32] && welcome == &vec![1, 2, 3]
        ));
    }

    #[test]
    fn invitee_accepts_welcome_and_becomes_joined() {
        let env = MockEnv::with_crypto_rng();
        let session = [3u8; 16];
        let mut hs =
            Handshake::new_invitee(env, session, [2u8; 32], vec![1, 2, 3], HandshakeConfig::default());

        let welcome = signed(
            [1u8; 32],
            session,
            HandshakeRole::Creator,
            EnvelopeBody::Welcome { welcome: vec![9], group_id: [4u8; 32] },
            1,
        );
        let actions = hs.on_envelope(&welcome);
        assert_eq!(actions.len(), 1);
        hs.on_welcome_accepted([4u8; 32]);
        assert_eq!(hs.phase(), Phase::Joined);
    }

    #[test]
    fn duplicate_event_id_is_ignored() {
        let env = MockEnv::with_crypto_rng();
        let session = [1u8; 16];
        let mut hs = Handshake::new_creator(env, session, [1u8; 32], HandshakeConfig::default());

        let event = signed(
            [2u8; 32],
            session,
            HandshakeRole::Invitee,
            EnvelopeBody::KeyPackage { bundle: vec![1], pubkey: [2u8; 32] },
            1,
        );
        assert_eq!(hs.on_envelope(&event).len(), 1);
        assert_eq!(hs.on_envelope(&event).len(), 0);
    }

    #[test]
    fn off_channel_event_is_ignored() {
        let env = MockEnv::with_crypto_rng();
        let mut hs = Handshake::new_creator(env, [1u8; 16], [1u8; 32], HandshakeConfig::default());

        let event = signed(
            [2u8; 32],
            [0xFFu8; 16],
            HandshakeRole::Invitee,
            EnvelopeBody::KeyPackage { bundle: vec![1], pubkey: [2u8; 32] },
            1,
        );
        assert_eq!(hs.on_envelope(&event).len(), 0);
    }

    #[test]
    fn invitee_heartbeats_at_configured_cadence() {
        let env = MockEnv::with_crypto_rng();
        let config = HandshakeConfig { heartbeat_interval: Duration::from_secs(2), ..Default::default() };
        let mut hs = Handshake::new_invitee(env, [1u8; 16], [2u8; 32], vec![1], config);

        let t0 = hs.now();
        let actions = hs.on_tick(t0);
        assert_eq!(actions.len(), 2);

        let actions = hs.on_tick(t0);
        assert!(actions.is_empty(), "heartbeat should not re-fire before the interval elapses");
    }

    #[test]
    fn overall_timeout_fires_once() {
        let env = MockEnv::with_crypto_rng();
        let config = HandshakeConfig { overall_timeout: Duration::from_secs(1), ..Default::default() };
        let mut hs = Handshake::new_invitee(env, [1u8; 16], [2u8; 32], vec![1], config);

        let t0 = hs.now();
        let later = t0 + Duration::from_secs(2);
        let actions = hs.on_tick(later);
        assert_eq!(actions, vec![HandshakeAction::TimedOut]);
        assert_eq!(hs.phase(), Phase::TimedOut);
        assert!(hs.on_tick(later).is_empty());
    }
}
