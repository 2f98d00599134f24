//! The sans-IO controller (C4): sequences the bootstrap handshake, the MLS
//! group, and the media key schedule behind [`Controller::handle_operation`]
//! and [`Controller::handle_input`].
//!
//! Like [`marmot_core::mls::MlsGroup`] and [`marmot_core::handshake::Handshake`]
//! underneath it, this module never touches a socket or a wall clock of its
//! own: every call takes exactly the inputs a [`crate::Driver`] observed and
//! returns a list of [`ControllerAction`]s for that driver to execute. A
//! commit this client authors (`RotateEpoch`, `InviteMember`, `RemoveMember`)
//! is never merged until either an observed commit from another member
//! supersedes it, or [`Controller::handle_input`]`(Input::Tick)` finds
//! [`marmot_core::mls::MlsGroup::is_commit_timeout`] has elapsed — this
//! client never subscribes to its own publish track, so there is no echo to
//! wait for, only a bound on how long to wait before merging optimistically.

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use marmot_core::{
    MlsError,
    env::Environment,
    handshake::{Handshake, HandshakeAction, HandshakeConfig, Phase},
    identity::Identity,
    mls::{GroupId, Invitee, Member, MemberPubkey, MlsAction, MlsGroup, Outcome, PendingJoinState},
};
use marmot_proto::{
    envelope::{EnvelopeBody, HANDSHAKE_EVENT_KIND, HandshakeEnvelope, HandshakeRole, SignedEvent},
    track::TrackPosition,
};

use crate::{
    action::ControllerAction,
    config::{Role, SessionConfig},
    error::{EngineError, RecoveryHint},
    event::{ControllerEvent, RosterMember},
    input::Input,
    media::{MediaError, MediaRegistry},
    op::Operation,
    pending::PendingFrameQueue,
    state::EngineSnapshot,
};

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

enum HandshakeSlot<E: Environment> {
    Creator { handshake: Handshake<E>, invitee_pubkey: Option<MemberPubkey> },
    Invitee { handshake: Handshake<E>, pending_join: Option<PendingJoinState<E>> },
}

impl<E: Environment> HandshakeSlot<E> {
    fn handshake(&self) -> &Handshake<E> {
        match self {
            Self::Creator { handshake, .. } | Self::Invitee { handshake, .. } => handshake,
        }
    }

    fn handshake_mut(&mut self) -> &mut Handshake<E> {
        match self {
            Self::Creator { handshake, .. } | Self::Invitee { handshake, .. } => handshake,
        }
    }
}

/// The engine's central state machine: one per session.
///
/// Owns the in-flight bootstrap handshake(s) (the original session plus any
/// later [`Operation::InviteMember`] sessions, each scoped to its own
/// out-of-band session id), the MLS group once formed or joined, the
/// subscription set, the per-track media key schedules, and a bounded replay
/// queue for wrappers that failed transiently.
pub struct Controller<E: Environment> {
    env: E,
    identity: Identity,
    own_pubkey: MemberPubkey,
    config_admin_pubkeys: Vec<MemberPubkey>,
    handshakes: HashMap<[u8; 16], HandshakeSlot<E>>,
    pending_invite_admin: HashMap<[u8; 16], bool>,
    group: Option<MlsGroup<E>>,
    subscriptions: HashSet<MemberPubkey>,
    pending_frames: PendingFrameQueue,
    media: MediaRegistry<E>,
    commit_total: u64,
    commit_timeout: Duration,
    snapshot: EngineSnapshot,
    shutdown: bool,
}

impl<E: Environment> Controller<E> {
    /// How long an authored commit waits for an observed conflicting commit
    /// before the engine merges it on its own.
    pub const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_secs(30);

    /// A fresh controller for `identity`, with no handshake or group yet.
    /// Call [`Operation::Bootstrap`] via [`Controller::handle_operation`] to
    /// start one.
    #[must_use]
    pub fn new(env: E, identity: Identity) -> Self {
        let own_pubkey = identity.public_key();
        Self {
            env,
            identity,
            own_pubkey,
            config_admin_pubkeys: Vec::new(),
            handshakes: HashMap::new(),
            pending_invite_admin: HashMap::new(),
            group: None,
            subscriptions: HashSet::new(),
            pending_frames: PendingFrameQueue::new(),
            media: MediaRegistry::new(),
            commit_total: 0,
            commit_timeout: Self::DEFAULT_COMMIT_TIMEOUT,
            snapshot: EngineSnapshot::new(),
            shutdown: false,
        }
    }

    /// This session's own public key.
    #[must_use]
    pub fn own_pubkey(&self) -> MemberPubkey {
        self.own_pubkey
    }

    /// The group's current epoch, once a group has been joined or created.
    #[must_use]
    pub fn current_epoch(&self) -> Option<u64> {
        self.group.as_ref().map(MlsGroup::epoch)
    }

    /// The stable `marmot/<hex>` MoQ track prefix, once a group is known.
    #[must_use]
    pub fn group_root(&self) -> Option<String> {
        self.group.as_ref().map(MlsGroup::derive_group_root)
    }

    /// A read-only snapshot of the engine's current state.
    #[must_use]
    pub fn snapshot(&self) -> &EngineSnapshot {
        &self.snapshot
    }

    /// Peers this session has ever subscribed to.
    ///
    /// Monotonically grows: per §4.4's roster policy, a peer is never
    /// unsubscribed merely because it left the roster mid-session, so this
    /// is "ever subscribed", not "currently on the roster".
    #[must_use]
    pub fn subscribed_peers(&self) -> &HashSet<MemberPubkey> {
        &self.subscriptions
    }

    /// Number of wrappers currently queued for replay because they failed to
    /// ingest transiently (e.g. arrived for an epoch this client hasn't
    /// reached yet). Drained automatically once the next commit merges.
    #[must_use]
    pub fn pending_frame_count(&self) -> usize {
        self.pending_frames.len()
    }

    /// Whether [`Operation::Shutdown`] has already run; [`crate::Runtime`]
    /// stops polling once this is `true`.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Process one host-issued operation, returning the actions a driver
    /// must execute in response.
    pub fn handle_operation(&mut self, op: Operation) -> Vec<ControllerAction> {
        if self.shutdown {
            return Vec::new();
        }
        match op {
            Operation::Bootstrap(config) => self.start_bootstrap(config),
            Operation::ConnectTransport => self.connect_transport(),
            Operation::SendMessage(payload) => self.send_message(&payload),
            Operation::InviteMember { session, is_admin } => self.invite_member(session, is_admin),
            Operation::RemoveMember(pubkey) => self.remove_member(pubkey),
            Operation::RotateEpoch => self.rotate_epoch(),
            Operation::Shutdown => self.do_shutdown(),
        }
    }

    /// Process one driver-observed input, returning the actions a driver
    /// must execute in response.
    pub fn handle_input(&mut self, input: Input) -> Vec<ControllerAction> {
        if self.shutdown {
            return Vec::new();
        }
        match input {
            Input::Tick => self.on_tick(),
            Input::Envelope(event) => self.on_envelope(event),
            Input::Wrapper { from_hex, bytes } => self.on_wrapper(&from_hex, bytes),
            Input::TransportReady => {
                self.snapshot.transport_ready = true;
                vec![ControllerAction::Emit(ControllerEvent::Ready(true))]
            },
        }
    }

    /// Encrypt one outbound audio frame. Synchronous and direct (not routed
    /// through [`Operation`]/[`Input`]): PCM capture and the media pipeline
    /// are the host's responsibility, and the AEAD work is CPU-bound.
    ///
    /// # Errors
    ///
    /// See [`MediaError`].
    pub fn encrypt_audio_frame(
        &mut self,
        track_label: &str,
        counter: u32,
        plaintext: &[u8],
        position: TrackPosition,
    ) -> Result<Vec<u8>, MediaError> {
        let now = self.env.now();
        let Some(group) = self.group.as_ref() else {
            return Err(MediaError::Mls(no_active_group()));
        };
        self.media.encrypt(group, track_label, counter, plaintext, position, now)
    }

    /// Decrypt one inbound audio frame from `sender`'s track.
    ///
    /// # Errors
    ///
    /// See [`MediaError`].
    pub fn decrypt_audio_frame(
        &mut self,
        sender: MemberPubkey,
        track_label: &str,
        wire_bytes: &[u8],
        position: TrackPosition,
    ) -> Result<Vec<u8>, MediaError> {
        let now = self.env.now();
        let Some(group) = self.group.as_ref() else {
            return Err(MediaError::Mls(no_active_group()));
        };
        self.media.decrypt(group, sender, track_label, wire_bytes, position, now)
    }

    fn error_action(&self, err: EngineError) -> ControllerAction {
        ControllerAction::Emit(ControllerEvent::from_error(&err))
    }

    fn start_bootstrap(&mut self, config: SessionConfig) -> Vec<ControllerAction> {
        self.config_admin_pubkeys = config.admin_pubkeys;
        match config.role {
            Role::Creator => {
                let handshake =
                    Handshake::new_creator(self.env.clone(), config.session_id, self.own_pubkey, HandshakeConfig::default());
                let phase = handshake.phase();
                self.handshakes.insert(config.session_id, HandshakeSlot::Creator { handshake, invitee_pubkey: None });
                vec![ControllerAction::Emit(ControllerEvent::Handshake { phase })]
            },
            Role::Invitee => match MlsGroup::create_key_package(self.env.clone(), self.own_pubkey) {
                Ok((key_package_bytes, pending_join)) => {
                    let handshake = Handshake::new_invitee(
                        self.env.clone(),
                        config.session_id,
                        self.own_pubkey,
                        key_package_bytes,
                        HandshakeConfig::default(),
                    );
                    let phase = handshake.phase();
                    self.handshakes
                        .insert(config.session_id, HandshakeSlot::Invitee { handshake, pending_join: Some(pending_join) });
                    vec![ControllerAction::Emit(ControllerEvent::Handshake { phase })]
                },
                Err(err) => vec![self.error_action(err.into())],
            },
        }
    }

    fn connect_transport(&mut self) -> Vec<ControllerAction> {
        let Some(group) = self.group.as_ref() else {
            return vec![self.error_action(EngineError::Config(
                "cannot connect transport before a group is known".to_string(),
            ))];
        };
        let mut actions = vec![ControllerAction::OpenTransport {
            group_root: group.derive_group_root(),
            own_pubkey_hex: hex::encode(self.own_pubkey),
        }];

        // A roster diff only fires `SubscribePeer` for a member the first
        // time it appears; a member admitted before the transport was
        // connected (the common case for an invitee who joins and is
        // rostered in the same step its Welcome is accepted) would
        // otherwise never get subscribed. Re-issuing for the whole current
        // roster here is safe: `GroupTransport::subscribe_peer` is
        // idempotent.
        if let Ok(members) = group.list_members() {
            for member in members {
                if member.pubkey != self.own_pubkey && self.subscriptions.insert(member.pubkey) {
                    actions.push(ControllerAction::SubscribePeer(member.pubkey));
                }
            }
        }
        actions
    }

    fn send_message(&mut self, payload: &[u8]) -> Vec<ControllerAction> {
        let Some(group) = self.group.as_mut() else {
            return vec![self.error_action(EngineError::Config("no active group".to_string()))];
        };
        match group.create_message(payload) {
            Ok(wrapper) => vec![
                ControllerAction::PublishWrapper(wrapper),
                ControllerAction::Emit(ControllerEvent::Message {
                    author: self.own_pubkey,
                    content: payload.to_vec(),
                    ts: unix_now(),
                    local: true,
                }),
            ],
            Err(err) => vec![self.error_action(err.into())],
        }
    }

    fn is_local_admin(&self) -> bool {
        self.group
            .as_ref()
            .and_then(|group| group.list_members().ok())
            .map(|members| members.iter().any(|m| m.pubkey == self.own_pubkey && m.is_admin))
            .unwrap_or(false)
    }

    fn invite_member(&mut self, session: [u8; 16], is_admin: bool) -> Vec<ControllerAction> {
        if self.group.is_some() && !self.is_local_admin() {
            return vec![self.error_action(EngineError::Config("only admins may invite members".to_string()))];
        }
        let handshake = Handshake::new_creator(self.env.clone(), session, self.own_pubkey, HandshakeConfig::default());
        let phase = handshake.phase();
        self.handshakes.insert(session, HandshakeSlot::Creator { handshake, invitee_pubkey: None });
        self.pending_invite_admin.insert(session, is_admin);
        vec![ControllerAction::Emit(ControllerEvent::Handshake { phase })]
    }

    fn remove_member(&mut self, pubkey: MemberPubkey) -> Vec<ControllerAction> {
        if !self.is_local_admin() {
            return vec![self.error_action(EngineError::Config("only admins may remove members".to_string()))];
        }
        let Some(group) = self.group.as_mut() else {
            return vec![self.error_action(EngineError::Config("no active group".to_string()))];
        };
        match group.remove_members(&[pubkey]) {
            Ok(mls_actions) => self.translate_mls_actions([0u8; 16], mls_actions),
            Err(err) => vec![self.error_action(err.into())],
        }
    }

    fn rotate_epoch(&mut self) -> Vec<ControllerAction> {
        let Some(group) = self.group.as_mut() else {
            return vec![self.error_action(EngineError::Config("no active group".to_string()))];
        };
        match group.self_update() {
            Ok((_, mls_actions)) => self.translate_mls_actions([0u8; 16], mls_actions),
            Err(err) => vec![self.error_action(err.into())],
        }
    }

    fn do_shutdown(&mut self) -> Vec<ControllerAction> {
        self.shutdown = true;
        self.group = None;
        self.handshakes.clear();
        vec![ControllerAction::CloseTransport, ControllerAction::Emit(ControllerEvent::Status("shutting down".to_string()))]
    }

    fn on_tick(&mut self) -> Vec<ControllerAction> {
        let now = self.env.now();
        let mut actions = Vec::new();

        let sessions: Vec<[u8; 16]> = self.handshakes.keys().copied().collect();
        for session in sessions {
            let Some(slot) = self.handshakes.get_mut(&session) else { continue };
            let handshake_actions = slot.handshake_mut().on_tick(now);
            if !handshake_actions.is_empty() {
                actions.extend(self.apply_handshake_actions(session, handshake_actions));
            }
            if self.handshakes.get(&session).is_some_and(|slot| slot.handshake().is_finished()) {
                self.handshakes.remove(&session);
            }
        }

        if self.group.as_ref().is_some_and(|group| group.is_commit_timeout(now, self.commit_timeout)) {
            actions.extend(self.merge_own_commit());
        }

        self.media.purge_expired(now);
        actions
    }

    fn on_envelope(&mut self, event: SignedEvent) -> Vec<ControllerAction> {
        let mut actions = Vec::new();
        let sessions: Vec<[u8; 16]> = self.handshakes.keys().copied().collect();
        for session in sessions {
            let Some(slot) = self.handshakes.get_mut(&session) else { continue };
            let handshake_actions = slot.handshake_mut().on_envelope(&event);
            if !handshake_actions.is_empty() {
                actions.extend(self.apply_handshake_actions(session, handshake_actions));
            }
        }
        actions
    }

    fn on_wrapper(&mut self, from_hex: &str, bytes: Vec<u8>) -> Vec<ControllerAction> {
        let Some(group) = self.group.as_mut() else { return Vec::new() };
        let outcome = group.ingest_wrapper(&bytes);
        if let Outcome::Unprocessable { transient: true, .. } = &outcome {
            self.pending_frames.push(from_hex.to_string(), bytes);
        }
        self.handle_outcome(outcome)
    }

    fn handle_outcome(&mut self, outcome: Outcome) -> Vec<ControllerAction> {
        match outcome {
            Outcome::Application { author, payload } => {
                let mut actions = self.confirm_handshakes_for(author);
                actions.push(ControllerAction::Emit(ControllerEvent::Message {
                    author,
                    content: payload,
                    ts: unix_now(),
                    local: false,
                }));
                actions
            },
            Outcome::Commit { epoch_after } => self.on_commit_merged(epoch_after),
            Outcome::Proposal => Vec::new(),
            Outcome::Welcome { group_id } => {
                vec![ControllerAction::Emit(ControllerEvent::Status(format!(
                    "received unexpected welcome for group {}",
                    hex::encode(group_id)
                )))]
            },
            Outcome::Unprocessable { reason, transient } => {
                vec![self.error_action(EngineError::Mls(MlsError::Unprocessable { reason, transient }))]
            },
        }
    }

    fn confirm_handshakes_for(&mut self, author: MemberPubkey) -> Vec<ControllerAction> {
        let mut actions = Vec::new();
        for slot in self.handshakes.values_mut() {
            if let HandshakeSlot::Creator { handshake, invitee_pubkey: Some(pubkey) } = slot {
                if *pubkey == author && handshake.phase() == Phase::AwaitingConfirmation {
                    handshake.on_confirmed();
                    actions.push(ControllerAction::Emit(ControllerEvent::Handshake { phase: Phase::Confirmed }));
                }
            }
        }
        actions
    }

    fn merge_own_commit(&mut self) -> Vec<ControllerAction> {
        let epoch = {
            let Some(group) = self.group.as_mut() else { return Vec::new() };
            match group.merge_pending_commit() {
                Ok(()) => group.epoch(),
                Err(err) => return vec![self.error_action(err.into())],
            }
        };
        self.on_commit_merged(epoch)
    }

    fn on_commit_merged(&mut self, epoch_after: u64) -> Vec<ControllerAction> {
        self.commit_total += 1;
        self.snapshot.epoch = Some(epoch_after);

        let Some(group) = self.group.as_ref() else { return Vec::new() };
        let members = match group.list_members() {
            Ok(members) => members,
            Err(err) => return vec![self.error_action(err.into())],
        };

        let mut actions = vec![ControllerAction::Emit(ControllerEvent::Commit { total: self.commit_total })];
        actions.extend(self.diff_roster(members));
        actions.extend(self.replay_pending());
        actions
    }

    fn diff_roster(&mut self, members: Vec<Member>) -> Vec<ControllerAction> {
        let mut actions = Vec::new();
        let new_roster: Vec<RosterMember> =
            members.iter().map(|m| RosterMember { pubkey: m.pubkey, is_admin: m.is_admin }).collect();

        let old_by_pubkey: HashMap<MemberPubkey, bool> =
            self.snapshot.roster.iter().map(|m| (m.pubkey, m.is_admin)).collect();
        let new_by_pubkey: HashMap<MemberPubkey, bool> =
            new_roster.iter().map(|m| (m.pubkey, m.is_admin)).collect();

        for member in &new_roster {
            match old_by_pubkey.get(&member.pubkey) {
                None => {
                    actions.push(ControllerAction::Emit(ControllerEvent::MemberJoined(*member)));
                    if member.pubkey != self.own_pubkey && self.subscriptions.insert(member.pubkey) {
                        actions.push(ControllerAction::SubscribePeer(member.pubkey));
                    }
                },
                Some(&old_admin) if old_admin != member.is_admin => {
                    actions.push(ControllerAction::Emit(ControllerEvent::MemberUpdated(*member)));
                },
                _ => {},
            }
        }
        for pubkey in old_by_pubkey.keys() {
            if !new_by_pubkey.contains_key(pubkey) {
                actions.push(ControllerAction::Emit(ControllerEvent::MemberLeft(*pubkey)));
            }
        }

        self.snapshot.roster = new_roster.clone();
        actions.push(ControllerAction::Emit(ControllerEvent::Roster(new_roster)));
        actions
    }

    fn replay_pending(&mut self) -> Vec<ControllerAction> {
        let mut actions = Vec::new();
        for frame in self.pending_frames.drain() {
            let Some(group) = self.group.as_mut() else { break };
            let outcome = group.ingest_wrapper(&frame.bytes);
            if let Outcome::Unprocessable { transient: true, .. } = &outcome {
                self.pending_frames.requeue(frame);
                continue;
            }
            actions.extend(self.handle_outcome(outcome));
        }
        actions
    }

    fn apply_handshake_actions(&mut self, session: [u8; 16], handshake_actions: Vec<HandshakeAction>) -> Vec<ControllerAction> {
        let mut actions = Vec::new();
        for action in handshake_actions {
            match action {
                HandshakeAction::Publish(body) => {
                    actions.push(ControllerAction::PublishEnvelope(self.sign_envelope(session, body)));
                },
                HandshakeAction::CreateGroup { invitee_pubkey, key_package_bytes } => {
                    actions.extend(self.on_create_group(session, invitee_pubkey, key_package_bytes));
                },
                HandshakeAction::AcceptWelcome { group_id, welcome_bytes } => {
                    actions.extend(self.on_accept_welcome(session, group_id, welcome_bytes));
                },
                HandshakeAction::TimedOut => {
                    actions.push(ControllerAction::Emit(ControllerEvent::Handshake { phase: Phase::TimedOut }));
                    actions.push(self.error_action(EngineError::HandshakeTimeout));
                },
            }
        }
        actions
    }

    fn on_create_group(&mut self, session: [u8; 16], invitee_pubkey: MemberPubkey, key_package_bytes: Vec<u8>) -> Vec<ControllerAction> {
        if let Some(HandshakeSlot::Creator { invitee_pubkey: slot_invitee, .. }) = self.handshakes.get_mut(&session) {
            *slot_invitee = Some(invitee_pubkey);
        }

        let is_admin = self
            .pending_invite_admin
            .get(&session)
            .copied()
            .unwrap_or_else(|| self.config_admin_pubkeys.contains(&invitee_pubkey));
        let invitee = Invitee { key_package_bytes, is_admin };

        let mls_actions = if let Some(group) = self.group.as_mut() {
            match group.add_members(&[invitee]) {
                Ok(actions) => actions,
                Err(err) => return vec![self.error_action(err.into())],
            }
        } else {
            match MlsGroup::create_group(self.env.clone(), self.own_pubkey, &[invitee]) {
                Ok((group, actions)) => {
                    self.group = Some(group);
                    actions
                },
                Err(err) => return vec![self.error_action(err.into())],
            }
        };

        let mut actions = vec![ControllerAction::Emit(ControllerEvent::InviteGenerated { pubkey: invitee_pubkey, is_admin })];
        actions.extend(self.translate_mls_actions(session, mls_actions));
        actions
    }

    fn on_accept_welcome(&mut self, session: [u8; 16], group_id: GroupId, welcome_bytes: Vec<u8>) -> Vec<ControllerAction> {
        let Some(HandshakeSlot::Invitee { pending_join, .. }) = self.handshakes.get_mut(&session) else {
            return Vec::new();
        };
        let Some(state) = pending_join.take() else { return Vec::new() };

        match MlsGroup::accept_welcome(self.own_pubkey, &welcome_bytes, state) {
            Ok((group, mls_actions)) => {
                self.group = Some(group);
                self.snapshot.epoch = self.group.as_ref().map(MlsGroup::epoch);
                if let Some(HandshakeSlot::Invitee { handshake, .. }) = self.handshakes.get_mut(&session) {
                    handshake.on_welcome_accepted(group_id);
                }

                let mut actions = self.translate_mls_actions(session, mls_actions);
                if let Some(group) = self.group.as_ref() {
                    if let Ok(members) = group.list_members() {
                        actions.extend(self.diff_roster(members));
                    }
                }
                actions.push(ControllerAction::Emit(ControllerEvent::Handshake { phase: Phase::Joined }));
                actions
            },
            Err(err) => {
                // `pending_state` was consumed by the failed `accept_welcome`
                // call; there is nothing left to retry it with, so recover by
                // minting a fresh key package and handshake on this session.
                match MlsGroup::create_key_package(self.env.clone(), self.own_pubkey) {
                    Ok((key_package_bytes, new_pending)) => {
                        let handshake = Handshake::new_invitee(
                            self.env.clone(),
                            session,
                            self.own_pubkey,
                            key_package_bytes,
                            HandshakeConfig::default(),
                        );
                        self.handshakes.insert(session, HandshakeSlot::Invitee { handshake, pending_join: Some(new_pending) });
                    },
                    Err(kp_err) => return vec![self.error_action(kp_err.into())],
                }
                vec![self.error_action(err.into())]
            },
        }
    }

    fn deliver_welcome_for_session(&mut self, session: [u8; 16], wrapper: Vec<u8>) -> Vec<ControllerAction> {
        let group_id = self.group.as_ref().map(MlsGroup::group_id).unwrap_or([0u8; 32]);
        let Some(HandshakeSlot::Creator { handshake, .. }) = self.handshakes.get_mut(&session) else {
            return Vec::new();
        };
        let handshake_actions = handshake.on_group_created(group_id, wrapper);
        self.apply_handshake_actions(session, handshake_actions)
    }

    fn translate_mls_actions(&mut self, session: [u8; 16], mls_actions: Vec<MlsAction>) -> Vec<ControllerAction> {
        let mut actions = Vec::new();
        for action in mls_actions {
            match action {
                MlsAction::Publish(bytes) => actions.push(ControllerAction::PublishWrapper(bytes)),
                MlsAction::DeliverWelcome { wrapper, .. } => {
                    actions.extend(self.deliver_welcome_for_session(session, wrapper));
                },
                MlsAction::PublishGroupInfo { .. } => {
                    actions.push(ControllerAction::Emit(ControllerEvent::Status("refreshed group info".to_string())));
                },
                MlsAction::RemoveGroup { reason } => {
                    actions.push(ControllerAction::Emit(ControllerEvent::Error {
                        message: reason,
                        fatal: true,
                        recovery: RecoveryHint::Refresh,
                    }));
                    self.group = None;
                    actions.push(ControllerAction::CloseTransport);
                },
                MlsAction::Log { message } => tracing::debug!(%message, "mls action"),
            }
        }
        actions
    }

    fn sign_envelope(&self, session: [u8; 16], body: EnvelopeBody) -> SignedEvent {
        let from_role = match self.handshakes.get(&session) {
            Some(HandshakeSlot::Invitee { .. }) => HandshakeRole::Invitee,
            _ => HandshakeRole::Creator,
        };
        let created_at = unix_now();
        let envelope = HandshakeEnvelope { session, from_role, created_at, body };
        let content = serde_json::to_string(&envelope).unwrap_or_default();
        let tags = vec![vec!["t".to_string(), hex::encode(session)]];
        let unsigned = SignedEvent::new(self.own_pubkey, created_at, HANDSHAKE_EVENT_KIND, tags, content);
        let sig = self.identity.sign(unsigned.id);
        unsigned.with_signature(sig)
    }
}

fn no_active_group() -> MlsError {
    MlsError::Unprocessable { reason: "no active group".to_string(), transient: false }
}

#[cfg(test)]
mod tests {
    use marmot_core::env::test_utils::MockEnv;

    use super::*;

    fn identity_from(byte: u8) -> Identity {
        Identity::from_secret_bytes(&[byte; 32]).expect("valid secret")
    }

    #[test]
    fn bootstrap_as_creator_emits_awaiting_key_package() {
        let env = MockEnv::with_seed(1);
        let mut controller = Controller::new(env, identity_from(1));
        let config = SessionConfig {
            role: Role::Creator,
            signalling_url: "https://relay.example".to_string(),
            moq_url: "https://moq.example".to_string(),
            session_id: [9u8; 16],
            secret: [1u8; 32],
            group_id: None,
            admin_pubkeys: Vec::new(),
            peer_pubkeys: Vec::new(),
        };
        let actions = controller.handle_operation(Operation::Bootstrap(config));
        assert!(actions.iter().any(|a| matches!(
            a,
            ControllerAction::Emit(ControllerEvent::Handshake { phase: Phase::AwaitingKeyPackage })
        )));
    }

    #[test]
    fn two_party_handshake_reaches_joined_and_confirmed() {
        let creator_env = MockEnv::with_seed(2);
        let invitee_env = MockEnv::with_seed(3);
        let mut creator = Controller::new(creator_env, identity_from(2));
        let mut invitee = Controller::new(invitee_env, identity_from(3));

        let session = [7u8; 16];
        creator.handle_operation(Operation::Bootstrap(SessionConfig {
            role: Role::Creator,
            signalling_url: String::new(),
            moq_url: String::new(),
            session_id: session,
            secret: [2u8; 32],
            group_id: None,
            admin_pubkeys: Vec::new(),
            peer_pubkeys: Vec::new(),
        }));
        let invitee_actions = invitee.handle_operation(Operation::Bootstrap(SessionConfig {
            role: Role::Invitee,
            signalling_url: String::new(),
            moq_url: String::new(),
            session_id: session,
            secret: [3u8; 32],
            group_id: None,
            admin_pubkeys: Vec::new(),
            peer_pubkeys: Vec::new(),
        }));
        assert!(invitee_actions.iter().any(|a| matches!(a, ControllerAction::Emit(_))));

        // Invitee heartbeats its key package on tick.
        let tick_actions = invitee.handle_input(Input::Tick);
        let key_package_envelope = tick_actions
            .into_iter()
            .find_map(|a| match a {
                ControllerAction::PublishEnvelope(event) if event.envelope().unwrap().body.type_name() == "key-package" => {
                    Some(event)
                },
                _ => None,
            })
            .expect("invitee published its key package");

        let creator_actions = creator.handle_input(Input::Envelope(key_package_envelope));
        let welcome_envelope = creator_actions
            .into_iter()
            .find_map(|a| match a {
                ControllerAction::PublishEnvelope(event) if event.envelope().unwrap().body.type_name() == "welcome" => {
                    Some(event)
                },
                _ => None,
            })
            .expect("creator published a welcome");

        let invitee_actions = invitee.handle_input(Input::Envelope(welcome_envelope));
        assert!(invitee_actions.iter().any(|a| matches!(
            a,
            ControllerAction::Emit(ControllerEvent::Handshake { phase: Phase::Joined })
        )));
        assert_eq!(invitee.current_epoch(), Some(0));
        assert_eq!(invitee.group_root(), creator.group_root());
    }

    #[test]
    fn send_message_without_group_is_a_config_error() {
        let env = MockEnv::with_seed(4);
        let mut controller = Controller::new(env, identity_from(4));
        let actions = controller.handle_operation(Operation::SendMessage(b"hi".to_vec()));
        assert!(actions.iter().any(|a| matches!(
            a,
            ControllerAction::Emit(ControllerEvent::Error { fatal: true, .. })
        )));
    }
}
