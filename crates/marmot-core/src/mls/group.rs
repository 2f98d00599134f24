//! Client-side MLS group state machine: the only module that imports the
//! MLS library directly.
//!
//! A member's identity on the roster is its 32-byte secp256k1 x-only public
//! key (see [`crate::identity`]) plus a one-byte admin flag, packed together
//! as the MLS `BasicCredential`'s identity bytes. Packing the flag into the
//! credential (rather than a side table) means `list_members` can read the
//! authoritative roster straight off the live MLS tree: the flag is fixed
//! when a member is added and changes only by removing and re-adding them,
//! which is itself a commit — so "admin rights advance only through
//! commits" falls out of the credential's own immutability.

use std::time::Duration;

use openmls::{
    group::{MlsGroupCreateConfig, MlsGroupJoinConfig, StagedWelcome},
    key_packages::{KeyPackage, KeyPackageIn},
    messages::proposals::ProposalType,
    prelude::{
        Ciphersuite, Credential, CredentialWithKey, GroupId as OpenMlsGroupId, LeafNodeIndex,
        MlsMessageBodyIn, MlsMessageIn, MlsMessageOut, ProcessedMessageContent, ProtocolMessage,
        ProtocolVersion, Sender,
    },
};
use openmls_basic_credential::{BasicCredential, SignatureKeyPair};
use tls_codec::{Deserialize as TlsDeserialize, Serialize as TlsSerialize};

use crate::{env::Environment, error::MlsError, mls::provider::MlsProvider};

/// Stable 32-byte MLS group identifier. `derive_group_root` hex-encodes this
/// to form the MoQ track prefix (`marmot_proto::track::group_root`).
pub type GroupId = [u8; 32];

/// A member's identity: the secp256k1 x-only public key that is both the
/// signalling-relay signing key and the MLS credential identity.
pub type MemberPubkey = [u8; 32];

const ADMIN_FLAG_LEN: usize = 1;

fn pack_identity(pubkey: MemberPubkey, is_admin: bool) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(32 + ADMIN_FLAG_LEN);
    bytes.extend_from_slice(&pubkey);
    bytes.push(u8::from(is_admin));
    bytes
}

fn unpack_identity(credential: &Credential) -> Result<(MemberPubkey, bool), MlsError> {
    let identity = credential.serialized_content();
    if identity.len() != 32 + ADMIN_FLAG_LEN {
        return Err(MlsError::MalformedCredential(format!(
            "expected {} identity bytes, got {}",
            32 + ADMIN_FLAG_LEN,
            identity.len()
        )));
    }
    let mut pubkey = [0u8; 32];
    pubkey.copy_from_slice(&identity[..32]);
    let is_admin = identity[32] != 0;
    Ok((pubkey, is_admin))
}

/// A roster entry as returned by [`MlsGroup::list_members`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    /// The member's secp256k1 x-only public key.
    pub pubkey: MemberPubkey,
    /// Whether this member may invite, admit, or remove others.
    pub is_admin: bool,
}

/// An invitee for [`MlsGroup::create_group`] or [`MlsGroup::add_members`]:
/// a serialized KeyPackage plus the admin flag they should be added with.
pub struct Invitee {
    /// The invitee's serialized MLS `KeyPackage` bundle.
    pub key_package_bytes: Vec<u8>,
    /// Whether to add this member as an admin.
    pub is_admin: bool,
}

/// State kept between [`MlsGroup::create_key_package`] and
/// [`MlsGroup::accept_welcome`] for a pending join: the provider and signer
/// generated for the KeyPackage, which the Welcome must reuse.
pub struct PendingJoinState<E: Environment> {
    provider: MlsProvider<E>,
    signer: SignatureKeyPair,
}

/// Actions the caller must execute. The state machine itself never touches
/// a network socket or the signalling relay; a driver (`marmot-client`)
/// turns these into MoQ publishes or relay envelopes.
#[derive(Debug, Clone)]
pub enum MlsAction {
    /// Publish a commit or proposal wrapper on the group's wrappers track.
    Publish(Vec<u8>),
    /// Deliver a welcome wrapper to a newly-added member out of band (via
    /// the bootstrap handshake, not the group's own track).
    DeliverWelcome {
        /// The new member this welcome is addressed to.
        recipient: MemberPubkey,
        /// TLS-serialized MLS `Welcome` message.
        wrapper: Vec<u8>,
    },
    /// Publish refreshed `GroupInfo` so external joiners can external-commit.
    PublishGroupInfo {
        /// Epoch this GroupInfo was exported at.
        epoch: u64,
        /// TLS-serialized `GroupInfo` message.
        group_info_bytes: Vec<u8>,
    },
    /// This client has been removed from the group; tear down local state.
    RemoveGroup {
        /// Human-readable reason, surfaced as `AppEvent::MemberLeft`-adjacent.
        reason: String,
    },
    /// Structured log line for the host's tracing subscriber.
    Log {
        /// The message to log.
        message: String,
    },
}

/// Result of [`MlsGroup::ingest_wrapper`].
#[derive(Debug, Clone)]
pub enum Outcome {
    /// An application message was decrypted.
    Application {
        /// The message's author.
        author: MemberPubkey,
        /// Decrypted plaintext.
        payload: Vec<u8>,
    },
    /// A commit was merged; the group is now at `epoch_after`.
    Commit {
        /// The epoch after merging.
        epoch_after: u64,
    },
    /// A proposal was received but not yet committed.
    Proposal,
    /// The wrapper was a Welcome message (processed generically; joining via
    /// a Welcome goes through [`MlsGroup::accept_welcome`] instead).
    Welcome {
        /// The group this welcome would join.
        group_id: GroupId,
    },
    /// The wrapper could not be processed; see [`MlsError::is_transient`].
    Unprocessable {
        /// Human-readable reason.
        reason: String,
        /// Whether a retry after further progress might succeed.
        transient: bool,
    },
}

struct PendingCommit<I> {
    target_epoch: u64,
    sent_at: I,
}

/// Per-process owner of one MLS group's cryptographic state.
pub struct MlsGroup<E: Environment> {
    own_pubkey: MemberPubkey,
    mls_group: openmls::group::MlsGroup,
    signer: SignatureKeyPair,
    provider: MlsProvider<E>,
    pending_commit: Option<PendingCommit<E::Instant>>,
}

fn ciphersuite() -> Ciphersuite {
    Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519
}

impl<E: Environment> MlsGroup<E> {
    /// Form a new MLS group seeded with `invitees`' key packages. The
    /// creator is the sole admin unless listed invitees are marked admin.
    ///
    /// Returns the group and the actions needed to publish the creation
    /// commit's `GroupInfo` and deliver each invitee's welcome.
    pub fn create_group(
        env: E,
        own_pubkey: MemberPubkey,
        invitees: &[Invitee],
    ) -> Result<(Self, Vec<MlsAction>), MlsError> {
        let provider = MlsProvider::new(env);
        let ciphersuite = ciphersuite();

        let signer = SignatureKeyPair::new(ciphersuite.signature_algorithm())
            .map_err(|e| MlsError::Crypto(format!("failed to generate MLS leaf signer: {e}")))?;

        let credential = BasicCredential::new(pack_identity(own_pubkey, true));
        let credential_with_key =
            CredentialWithKey { credential: credential.into(), signature_key: signer.public().into() };

        let group_config = MlsGroupCreateConfig::builder()
            .ciphersuite(ciphersuite)
            .use_ratchet_tree_extension(true)
            .build();

        let mls_group = openmls::group::MlsGroup::new(
            &provider,
            &signer,
            &group_config,
            credential_with_key,
        )
        .map_err(|e| MlsError::Crypto(format!("failed to create group: {e}")))?;

        let mut group = Self { own_pubkey, mls_group, signer, provider, pending_commit: None };

        let mut actions = vec![MlsAction::Log {
            message: format!("created group {} with {} invitee(s)", group.group_id_hex(), invitees.len()),
        }];

        if !invitees.is_empty() {
            actions.extend(group.add_members(invitees)?);
        } else {
            actions.extend(group.publish_group_info()?);
        }

        Ok((group, actions))
    }

    /// Produce a KeyPackage bundle this client can offer on the bootstrap
    /// handshake. Returns the serialized bundle and the state to keep until
    /// the matching Welcome arrives.
    pub fn create_key_package(
        env: E,
        own_pubkey: MemberPubkey,
    ) -> Result<(Vec<u8>, PendingJoinState<E>), MlsError> {
        let provider = MlsProvider::new(env);
        let ciphersuite = ciphersuite();

        let signer = SignatureKeyPair::new(ciphersuite.signature_algorithm())
            .map_err(|e| MlsError::Crypto(format!("failed to generate MLS leaf signer: {e}")))?;

        let credential = BasicCredential::new(pack_identity(own_pubkey, false));
        let credential_with_key =
            CredentialWithKey { credential: credential.into(), signature_key: signer.public().into() };

        let key_package_bundle = KeyPackage::builder()
            .build(ciphersuite, &provider, &signer, credential_with_key)
            .map_err(|e| MlsError::Crypto(format!("failed to build key package: {e}")))?;

        let serialized = key_package_bundle
            .key_package()
            .tls_serialize_detached()
            .map_err(|e| MlsError::Serialization(format!("failed to serialize key package: {e}")))?;

        Ok((serialized, PendingJoinState { provider, signer }))
    }

    /// Join a group from a Welcome envelope produced by [`Self::create_group`]
    /// or [`Self::add_members`]. Fails if the welcome addresses a different
    /// key package than the one `pending_state` was generated for.
    pub fn accept_welcome(
        own_pubkey: MemberPubkey,
        welcome_bytes: &[u8],
        pending_state: PendingJoinState<E>,
    ) -> Result<(Self, Vec<MlsAction>), MlsError> {
        let PendingJoinState { provider, signer } = pending_state;

        let mls_message = MlsMessageIn::tls_deserialize(&mut welcome_bytes.as_ref())
            .map_err(|e| MlsError::Serialization(format!("failed to deserialize welcome: {e}")))?;

        let welcome = match mls_message.extract() {
            MlsMessageBodyIn::Welcome(w) => w,
            _ => {
                return Err(MlsError::Unprocessable {
                    reason: "message is not a Welcome".to_string(),
                    transient: false,
                });
            },
        };

        let join_config = MlsGroupJoinConfig::builder().use_ratchet_tree_extension(true).build();

        let mls_group = StagedWelcome::new_from_welcome(&provider, &join_config, welcome, None)
            .map_err(|e| MlsError::Unprocessable { reason: e.to_string(), transient: true })?
            .into_group(&provider)
            .map_err(|e| MlsError::Crypto(format!("failed to join group from welcome: {e}")))?;

        let epoch = mls_group.epoch().as_u64();
        let group = Self { own_pubkey, mls_group, signer, provider, pending_commit: None };

        let actions = vec![MlsAction::Log {
            message: format!("joined group {} at epoch {epoch} via welcome", group.group_id_hex()),
        }];

        Ok((group, actions))
    }

    /// Join a group via external commit using publicly available
    /// `GroupInfo`, without a prior invitation (RFC 9420 §12.4).
    pub fn join_from_external(
        env: E,
        own_pubkey: MemberPubkey,
        group_info_bytes: &[u8],
    ) -> Result<(Self, Vec<MlsAction>), MlsError> {
        let provider = MlsProvider::new(env);
        let ciphersuite = ciphersuite();

        let signer = SignatureKeyPair::new(ciphersuite.signature_algorithm())
            .map_err(|e| MlsError::Crypto(format!("failed to generate MLS leaf signer: {e}")))?;

        let credential = BasicCredential::new(pack_identity(own_pubkey, false));
        let credential_with_key =
            CredentialWithKey { credential: credential.into(), signature_key: signer.public().into() };

        let mls_message_in = MlsMessageIn::tls_deserialize(&mut group_info_bytes.as_ref())
            .map_err(|e| MlsError::Serialization(format!("failed to deserialize group info: {e}")))?;

        let verifiable_group_info = mls_message_in
            .into_verifiable_group_info()
            .ok_or_else(|| MlsError::Unprocessable {
                reason: "message is not a GroupInfo".to_string(),
                transient: false,
            })?;

        let (mls_group, commit_bundle) = openmls::group::MlsGroup::external_commit_builder()
            .build_group(&provider, verifiable_group_info, credential_with_key)
            .map_err(|e| MlsError::Crypto(format!("failed to build external commit group: {e}")))?
            .load_psks(provider.storage())
            .map_err(|e| MlsError::Crypto(format!("failed to load psks: {e}")))?
            .build(provider.rand(), provider.crypto(), &signer, |_| true)
            .map_err(|e| MlsError::Crypto(format!("failed to build external commit: {e}")))?
            .finalize(&provider)
            .map_err(|e| MlsError::Crypto(format!("failed to finalize external commit: {e}")))?;

        let epoch = mls_group.epoch().as_u64();

        let commit_payload = commit_bundle
            .commit()
            .tls_serialize_detached()
            .map_err(|e| MlsError::Serialization(format!("failed to serialize commit: {e}")))?;

        let group = Self { own_pubkey, mls_group, signer, provider, pending_commit: None };
        let group_info_bytes = group.export_group_info()?;

        let actions = vec![
            MlsAction::Publish(commit_payload),
            MlsAction::PublishGroupInfo { epoch, group_info_bytes },
            MlsAction::Log {
                message: format!("external-committed into group {} at epoch {epoch}", group.group_id_hex()),
            },
        ];

        Ok((group, actions))
    }

    /// Encrypt `payload` to the current epoch.
    pub fn create_message(&mut self, payload: &[u8]) -> Result<Vec<u8>, MlsError> {
        let mls_message = self
            .mls_group
            .create_message(&self.provider, &self.signer, payload)
            .map_err(|e| MlsError::Crypto(format!("failed to create message: {e}")))?;

        mls_message
            .tls_serialize_detached()
            .map_err(|e| MlsError::Serialization(format!("failed to serialize message: {e}")))
    }

    /// Decrypt/process an inbound wrapper: an application message, a
    /// proposal, a commit, or (generically) a welcome.
    pub fn ingest_wrapper(&mut self, bytes: &[u8]) -> Outcome {
        match self.ingest_wrapper_inner(bytes) {
            Ok(outcome) => outcome,
            Err(err) => Outcome::Unprocessable { reason: err.to_string(), transient: err.is_transient() },
        }
    }

    fn ingest_wrapper_inner(&mut self, bytes: &[u8]) -> Result<Outcome, MlsError> {
        let mls_message = MlsMessageIn::tls_deserialize_exact(bytes)
            .map_err(|e| MlsError::Serialization(format!("failed to deserialize wrapper: {e}")))?;

        if let MlsMessageBodyIn::Welcome(welcome) = &mls_message.clone().extract() {
            let group_id = group_id_bytes(welcome.group_info().group_context().group_id())?;
            return Ok(Outcome::Welcome { group_id });
        }

        let protocol_message: ProtocolMessage = mls_message
            .try_into()
            .map_err(|e| MlsError::Unprocessable { reason: format!("{e:?}"), transient: false })?;

        let processed = self.mls_group.process_message(&self.provider, protocol_message).map_err(
            |e| MlsError::Unprocessable { reason: e.to_string(), transient: is_transient_mls_error(&e) },
        )?;

        let (sender_pubkey, _is_admin) = match processed.sender() {
            Sender::Member(_) => unpack_identity(processed.credential())?,
            _ => ([0u8; 32], false),
        };

        match processed.into_content() {
            ProcessedMessageContent::ApplicationMessage(app_msg) => {
                Ok(Outcome::Application { author: sender_pubkey, payload: app_msg.into_bytes() })
            },
            ProcessedMessageContent::ProposalMessage(_) | ProcessedMessageContent::ExternalJoinProposalMessage(_) => {
                Ok(Outcome::Proposal)
            },
            ProcessedMessageContent::StagedCommitMessage(staged_commit) => {
                let old_epoch = self.epoch();

                self.mls_group
                    .merge_staged_commit(&self.provider, *staged_commit)
                    .map_err(|e| MlsError::Crypto(format!("failed to merge commit: {e}")))?;

                let new_epoch = self.epoch();
                debug_assert!(
                    new_epoch > old_epoch,
                    "epoch must increase after a commit ({old_epoch} -> {new_epoch})"
                );

                self.pending_commit = None;

                if !self.mls_group.is_active() {
                    return Err(MlsError::RemovedFromGroup(
                        "commit removed this member from the group".to_string(),
                    ));
                }

                Ok(Outcome::Commit { epoch_after: new_epoch })
            },
        }
    }

    /// Produce a key-rotation commit (new epoch), e.g. on a timer or after
    /// suspected compromise.
    pub fn self_update(&mut self) -> Result<(Vec<u8>, Vec<MlsAction>), MlsError> {
        let target_epoch = self.epoch() + 1;
        let now = self.provider.now();

        let commit_message_bundle = self
            .mls_group
            .self_update(&self.provider, &self.signer, Default::default())
            .map_err(|e| MlsError::Crypto(format!("failed to create self-update commit: {e}")))?
            .into_messages();

        self.pending_commit = Some(PendingCommit { target_epoch, sent_at: now });

        let commit_payload = commit_message_bundle
            .0
            .tls_serialize_detached()
            .map_err(|e| MlsError::Serialization(format!("failed to serialize commit: {e}")))?;

        let mut actions = vec![MlsAction::Publish(commit_payload.clone())];
        actions.extend(self.publish_group_info()?);
        actions.push(MlsAction::Log { message: format!("rotating to epoch {target_epoch}") });

        Ok((commit_payload, actions))
    }

    /// Add members to the group by their serialized KeyPackage bundles,
    /// creating a commit that admits them (and rejects the bundle if its
    /// signature doesn't verify).
    pub fn add_members(&mut self, invitees: &[Invitee]) -> Result<Vec<MlsAction>, MlsError> {
        let mut key_packages = Vec::with_capacity(invitees.len());
        for invitee in invitees {
            let kp_in = KeyPackageIn::tls_deserialize(&mut invitee.key_package_bytes.as_slice())
                .map_err(|e| MlsError::Serialization(format!("invalid key package: {e}")))?;
            let key_package = kp_in
                .validate(self.provider.crypto(), ProtocolVersion::Mls10)
                .map_err(|e| MlsError::Crypto(format!("invalid key package signature: {e:?}")))?;
            key_packages.push(key_package);
        }

        let target_epoch = self.epoch() + 1;
        let now = self.provider.now();

        let (mls_message_out, welcome, group_info) = self
            .mls_group
            .add_members(&self.provider, &self.signer, &key_packages)
            .map_err(|e| MlsError::Crypto(format!("failed to add members: {e}")))?;

        self.pending_commit = Some(PendingCommit { target_epoch, sent_at: now });

        let mut actions = Vec::new();

        let group_info_bytes = group_info
            .tls_serialize_detached()
            .map_err(|e| MlsError::Serialization(format!("failed to serialize group info: {e}")))?;
        actions.push(MlsAction::PublishGroupInfo { epoch: target_epoch, group_info_bytes });

        let commit_payload = mls_message_out
            .tls_serialize_detached()
            .map_err(|e| MlsError::Serialization(format!("failed to serialize commit: {e}")))?;
        actions.push(MlsAction::Publish(commit_payload));

        let welcome_payload = welcome
            .tls_serialize_detached()
            .map_err(|e| MlsError::Serialization(format!("failed to serialize welcome: {e}")))?;

        for kp in &key_packages {
            let (recipient, _is_admin) = unpack_identity(kp.leaf_node().credential())?;
            actions.push(MlsAction::DeliverWelcome { recipient, wrapper: welcome_payload.clone() });
        }

        actions.push(MlsAction::Log { message: format!("added {} member(s) to group", key_packages.len()) });

        Ok(actions)
    }

    /// Remove members from the group by public key, creating a commit.
    pub fn remove_members(&mut self, pubkeys: &[MemberPubkey]) -> Result<Vec<MlsAction>, MlsError> {
        if pubkeys.is_empty() {
            return Err(MlsError::MemberNotFound("no members specified for removal".to_string()));
        }
        if pubkeys.contains(&self.own_pubkey) {
            return Err(MlsError::Crypto(
                "cannot remove self via remove_members; use leave_group".to_string(),
            ));
        }

        let target_epoch = self.epoch() + 1;
        let now = self.provider.now();

        let leaf_indices = self.pubkeys_to_leaf_indices(pubkeys)?;

        let (mls_message_out, _welcome_option, group_info) = self
            .mls_group
            .remove_members(&self.provider, &self.signer, &leaf_indices)
            .map_err(|e| MlsError::Crypto(format!("failed to remove members: {e}")))?;

        self.pending_commit = Some(PendingCommit { target_epoch, sent_at: now });

        let mut actions = Vec::new();

        let group_info_bytes = group_info
            .tls_serialize_detached()
            .map_err(|e| MlsError::Serialization(format!("failed to serialize group info: {e}")))?;
        actions.push(MlsAction::PublishGroupInfo { epoch: target_epoch, group_info_bytes });

        let commit_payload = mls_message_out
            .tls_serialize_detached()
            .map_err(|e| MlsError::Serialization(format!("failed to serialize commit: {e}")))?;
        actions.push(MlsAction::Publish(commit_payload));

        actions.push(MlsAction::Log {
            message: format!("removing {} member(s) from group", pubkeys.len()),
        });

        Ok(actions)
    }

    /// Leave the group voluntarily. MLS requires another member to commit
    /// the resulting remove proposal; until then this client stays active.
    pub fn leave_group(&mut self) -> Result<Vec<MlsAction>, MlsError> {
        let mls_message_out = self
            .mls_group
            .leave_group(&self.provider, &self.signer)
            .map_err(|e| MlsError::Crypto(format!("failed to create leave proposal: {e}")))?;

        let proposal_payload = mls_message_out
            .tls_serialize_detached()
            .map_err(|e| MlsError::Serialization(format!("failed to serialize proposal: {e}")))?;

        Ok(vec![
            MlsAction::Publish(proposal_payload),
            MlsAction::Log { message: "published leave proposal".to_string() },
        ])
    }

    /// Advance the epoch after observing our own commit merged by all
    /// peers (confirmed by seeing application traffic at the new epoch, or
    /// by the handshake's idempotent retry policy).
    pub fn merge_pending_commit(&mut self) -> Result<(), MlsError> {
        let expected_epoch = self
            .pending_commit
            .as_ref()
            .map(|p| p.target_epoch)
            .ok_or_else(|| MlsError::Crypto("no pending commit to merge".to_string()))?;

        self.mls_group
            .merge_pending_commit(&self.provider)
            .map_err(|e| MlsError::Crypto(format!("failed to merge pending commit: {e}")))?;

        let actual_epoch = self.epoch();
        debug_assert_eq!(
            actual_epoch, expected_epoch,
            "epoch after merge ({actual_epoch}) doesn't match expected ({expected_epoch})"
        );

        self.pending_commit = None;
        Ok(())
    }

    /// Clear a pending commit without merging it (e.g. it was superseded by
    /// a commit from another member observed via `ingest_wrapper`).
    pub fn clear_pending_commit(&mut self) {
        self.pending_commit = None;
        let _ = self.mls_group.clear_pending_commit(self.provider.storage());
    }

    /// Whether a commit we authored is waiting to be merged.
    #[must_use]
    pub fn has_pending_commit(&self) -> bool {
        self.pending_commit.is_some()
    }

    /// Whether a pending commit has been outstanding longer than `timeout`.
    #[must_use]
    pub fn is_commit_timeout(&self, now: E::Instant, timeout: Duration) -> bool {
        self.pending_commit.as_ref().map(|pending| now - pending.sent_at >= timeout).unwrap_or(false)
    }

    /// Authoritative roster: every current member's public key and admin flag.
    pub fn list_members(&self) -> Result<Vec<Member>, MlsError> {
        self.mls_group
            .members()
            .map(|m| unpack_identity(&m.credential).map(|(pubkey, is_admin)| Member { pubkey, is_admin }))
            .collect()
    }

    /// MLS exporter secret: used to derive media track keys (§4.5).
    pub fn export_secret(&self, label: &str, context: &[u8], length: usize) -> Result<Vec<u8>, MlsError> {
        self.mls_group
            .export_secret(self.provider.crypto(), label, context, length)
            .map_err(|e| MlsError::Crypto(format!("failed to export secret: {e}")))
    }

    /// This client's own leaf node index, used as the `sender_leaf` input to
    /// `marmot_crypto::media_base_key_context` when publishing audio.
    #[must_use]
    pub fn own_leaf_index(&self) -> u32 {
        self.mls_group.own_leaf_index().u32()
    }

    /// The leaf node index of a roster member, used as the `sender_leaf`
    /// input to the media base key context when decrypting their audio.
    pub fn leaf_index_of(&self, pubkey: MemberPubkey) -> Result<u32, MlsError> {
        self.pubkeys_to_leaf_indices(&[pubkey]).map(|indices| indices[0].u32())
    }

    /// Stable `marmot/<hex>` prefix for this group's MoQ tracks.
    #[must_use]
    pub fn derive_group_root(&self) -> String {
        marmot_proto::track::group_root(&self.group_id_hex())
    }

    /// The group's 32-byte MLS group identifier.
    #[must_use]
    pub fn group_id(&self) -> GroupId {
        group_id_bytes(self.mls_group.group_id()).unwrap_or([0u8; 32])
    }

    fn group_id_hex(&self) -> String {
        hex_encode(&self.group_id())
    }

    /// Current epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.mls_group.epoch().as_u64()
    }

    /// This client's own public key.
    #[must_use]
    pub fn own_pubkey(&self) -> MemberPubkey {
        self.own_pubkey
    }

    fn publish_group_info(&self) -> Result<Vec<MlsAction>, MlsError> {
        let group_info_bytes = self.export_group_info()?;
        Ok(vec![MlsAction::PublishGroupInfo { epoch: self.epoch(), group_info_bytes }])
    }

    fn export_group_info(&self) -> Result<Vec<u8>, MlsError> {
        let group_info = self
            .mls_group
            .export_group_info(self.provider.crypto(), &self.signer, true)
            .map_err(|e| MlsError::Crypto(format!("failed to export group info: {e}")))?;

        group_info
            .tls_serialize_detached()
            .map_err(|e| MlsError::Serialization(format!("failed to serialize group info: {e}")))
    }

    fn pubkeys_to_leaf_indices(&self, pubkeys: &[MemberPubkey]) -> Result<Vec<LeafNodeIndex>, MlsError> {
        let mut indices = Vec::with_capacity(pubkeys.len());
        for target in pubkeys {
            let leaf_index = self
                .mls_group
                .members()
                .find_map(|m| match unpack_identity(&m.credential) {
                    Ok((pubkey, _)) if pubkey == *target => Some(m.index),
                    _ => None,
                })
                .ok_or_else(|| MlsError::MemberNotFound(hex_encode(target)))?;
            indices.push(leaf_index);
        }
        Ok(indices)
    }
}

fn group_id_bytes(group_id: &OpenMlsGroupId) -> Result<GroupId, MlsError> {
    group_id
        .as_slice()
        .try_into()
        .map_err(|_| MlsError::MalformedCredential("group id is not 32 bytes".to_string()))
}

fn is_transient_mls_error<Err: std::fmt::Display>(err: &Err) -> bool {
    let message = err.to_string().to_lowercase();
    message.contains("epoch") || message.contains("unknown proposal") || message.contains("future")
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::env::test_utils::MockEnv;

    fn pubkey(byte: u8) -> MemberPubkey {
        [byte; 32]
    }

    #[test]
    fn create_group_has_no_pending_commit() {
        let env = MockEnv::with_crypto_rng();
        let (group, actions) = MlsGroup::create_group(env, pubkey(1), &[]).unwrap();
        assert!(!group.has_pending_commit());
        assert!(actions.iter().any(|a| matches!(a, MlsAction::PublishGroupInfo { .. })));
    }

    #[test]
    fn creator_is_sole_admin_by_default() {
        let env = MockEnv::with_crypto_rng();
        let (group, _) = MlsGroup::create_group(env, pubkey(1), &[]).unwrap();
        let members = group.list_members().unwrap();
        assert_eq!(members.len(), 1);
        assert!(members[0].is_admin);
    }

    #[test]
    fn add_members_sets_pending_commit_and_welcome() {
        let env = MockEnv::with_crypto_rng();
        let (mut group, _) = MlsGroup::create_group(env.clone(), pubkey(1), &[]).unwrap();

        let (key_package_bytes, _pending_state) =
            MlsGroup::create_key_package(env, pubkey(2)).unwrap();

        let actions =
            group.add_members(&[Invitee { key_package_bytes, is_admin: false }]).unwrap();

        assert!(group.has_pending_commit());
        assert!(actions.iter().any(|a| matches!(a, MlsAction::Publish(_))));
        assert!(actions.iter().any(|a| matches!(a, MlsAction::DeliverWelcome { .. })));
    }

    #[test]
    fn merge_commit_advances_epoch_by_one() {
        let env = MockEnv::with_crypto_rng();
        let (mut group, _) = MlsGroup::create_group(env.clone(), pubkey(1), &[]).unwrap();
        let (key_package_bytes, _pending_state) =
            MlsGroup::create_key_package(env, pubkey(2)).unwrap();

        let epoch_before = group.epoch();
        group.add_members(&[Invitee { key_package_bytes, is_admin: false }]).unwrap();
        group.merge_pending_commit().unwrap();

        assert_eq!(group.epoch(), epoch_before + 1);
        assert!(!group.has_pending_commit());
    }

    #[test]
    fn invitee_joins_with_matching_group_id() {
        let env = MockEnv::with_crypto_rng();
        let (mut creator, _) = MlsGroup::create_group(env.clone(), pubkey(1), &[]).unwrap();
        let (key_package_bytes, pending_state) =
            MlsGroup::create_key_package(env, pubkey(2)).unwrap();

        let actions =
            creator.add_members(&[Invitee { key_package_bytes, is_admin: false }]).unwrap();
        creator.merge_pending_commit().unwrap();

        let welcome_wrapper = actions
            .into_iter()
            .find_map(|a| match a {
                MlsAction::DeliverWelcome { wrapper, .. } => Some(wrapper),
                _ => None,
            })
            .expect("a welcome was produced");

        let (invitee, _) = MlsGroup::accept_welcome(pubkey(2), &welcome_wrapper, pending_state).unwrap();
        assert_eq!(invitee.group_id(), creator.group_id());
        assert_eq!(invitee.derive_group_root(), creator.derive_group_root());
    }

    #[test]
    fn commit_timeout_detection() {
        let env = MockEnv::with_crypto_rng();
        let (mut group, _) = MlsGroup::create_group(env.clone(), pubkey(1), &[]).unwrap();
        let (key_package_bytes, _pending_state) =
            MlsGroup::create_key_package(env, pubkey(2)).unwrap();

        group.add_members(&[Invitee { key_package_bytes, is_admin: false }]).unwrap();

        let sent_at = group.pending_commit.as_ref().unwrap().sent_at;
        let _ = sent_at;
        let later = Instant::now() + Duration::from_secs(60);
        assert!(group.is_commit_timeout(later, Duration::from_secs(30)));
    }

    #[test]
    fn application_message_round_trips() {
        let env = MockEnv::with_crypto_rng();
        let (mut creator, _) = MlsGroup::create_group(env.clone(), pubkey(1), &[]).unwrap();
        let (key_package_bytes, pending_state) =
            MlsGroup::create_key_package(env, pubkey(2)).unwrap();

        let actions =
            creator.add_members(&[Invitee { key_package_bytes, is_admin: false }]).unwrap();
        creator.merge_pending_commit().unwrap();

        let welcome_wrapper = actions
            .into_iter()
            .find_map(|a| match a {
                MlsAction::DeliverWelcome { wrapper, .. } => Some(wrapper),
                _ => None,
            })
            .unwrap();
        let (mut invitee, _) =
            MlsGroup::accept_welcome(pubkey(2), &welcome_wrapper, pending_state).unwrap();

        let wrapper = creator.create_message(b"hello group").unwrap();
        let outcome = invitee.ingest_wrapper(&wrapper);

        match outcome {
            Outcome::Application { author, payload } => {
                assert_eq!(author, pubkey(1));
                assert_eq!(payload, b"hello group");
            },
            other => panic!("expected Application outcome, got {other:?}"),
        }
    }
}
