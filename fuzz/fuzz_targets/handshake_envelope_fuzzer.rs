//! Fuzz target for `Handshake::on_envelope` idempotency and dedup.
//!
//! Builds a creator-side handshake and a signed key-package envelope from a
//! fuzzed invitee identity, then feeds it in once, twice, and in arbitrary
//! mutated forms. The only hard invariant checked here: delivering the
//! exact same signed event twice must produce a state transition on the
//! first delivery and nothing on the second (event-id dedup), and no
//! malformed or adversarial envelope may ever panic the handshake.

#![no_main]

use std::time::{Duration, Instant};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use marmot_core::{
    env::Environment,
    handshake::{Handshake, HandshakeConfig},
    Identity,
};
use marmot_proto::{EnvelopeBody, HandshakeEnvelope, HandshakeRole, SignedEvent, HANDSHAKE_EVENT_KIND};

#[derive(Clone)]
struct FuzzEnv;

impl Environment for FuzzEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(0);
    }
}

#[derive(Debug, Arbitrary)]
struct Input {
    creator_seed: [u8; 32],
    invitee_seed: [u8; 32],
    session: [u8; 16],
    bundle: Vec<u8>,
    created_at: u64,
    deliver_twice: bool,
    corrupt_sig_byte: Option<u8>,
}

fuzz_target!(|input: Input| {
    let Ok(creator) = Identity::from_secret_bytes(&input.creator_seed) else { return };
    let Ok(invitee) = Identity::from_secret_bytes(&input.invitee_seed) else { return };
    if creator.public_key() == invitee.public_key() {
        return;
    }

    let mut handshake = Handshake::new_creator(
        FuzzEnv,
        input.session,
        creator.public_key(),
        HandshakeConfig::default(),
    );

    let envelope = HandshakeEnvelope {
        session: input.session,
        from_role: HandshakeRole::Invitee,
        created_at: input.created_at,
        body: EnvelopeBody::KeyPackage { bundle: input.bundle.clone(), pubkey: invitee.public_key() },
    };
    let content = serde_json::to_string(&envelope).expect("serializes");
    let tags = vec![vec!["t".to_string(), hex::encode(input.session)]];

    let unsigned = SignedEvent::new(
        invitee.public_key(),
        input.created_at,
        HANDSHAKE_EVENT_KIND,
        tags,
        content,
    );
    let sig = invitee.sign(unsigned.signing_data());
    let mut event = unsigned.with_signature(sig);

    if let Some(byte) = input.corrupt_sig_byte {
        let idx = usize::from(byte) % event.sig.len();
        event.sig[idx] ^= 0x01;
    }

    let first = handshake.on_envelope(&event);
    let second = handshake.on_envelope(&event);

    // Whatever the first delivery produced, a second delivery of the
    // identical event (same id) must be fully absorbed by dedup.
    assert!(second.is_empty());

    if input.deliver_twice {
        let third = handshake.on_envelope(&event);
        assert!(third.is_empty());
    }

    let _ = first;
});
