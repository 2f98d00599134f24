//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system resources (time, randomness). Enables
//! deterministic simulation with Turmoil (virtual clock, seeded RNG) and
//! production use with real system resources.

use std::time::Duration;

/// Abstract environment providing time, randomness, and async primitives.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion, incorrect simulation setup)
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`, while simulation
    /// environments use virtual time (e.g., `turmoil::Instant`).
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    ///
    /// # Invariants
    ///
    /// - This method MUST return values that never decrease within a single
    ///   execution context. Subsequent calls must return times >= previous
    ///   calls.
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it should only be used
    /// by driver code (not protocol logic).
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    /// - Uses cryptographically secure RNG
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// This is a convenience method for common use cases like generating
    /// session IDs or request IDs.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a random `u128`.
    ///
    /// Useful for UUIDs or group ids.
    fn random_u128(&self) -> u128 {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        u128::from_be_bytes(bytes)
    }
}

/// Minimal `Environment` impls for crate-local tests.
///
/// `marmot-harness` provides the full turmoil-backed simulation environment;
/// this module exists so unit tests in this crate don't need to depend on it.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use std::{
        sync::{Arc, Mutex},
        time::{Duration, Instant},
    };

    use rand::RngCore;

    use super::Environment;

    enum Source {
        Os,
        Seeded(Arc<Mutex<rand_chacha::ChaCha20Rng>>),
    }

    impl Clone for Source {
        fn clone(&self) -> Self {
            match self {
                Self::Os => Self::Os,
                Self::Seeded(rng) => Self::Seeded(Arc::clone(rng)),
            }
        }
    }

    /// A production-like environment backed by real time and OS randomness,
    /// or a seeded RNG for reproducible unit tests.
    ///
    /// Used in unit tests that only need a working `Environment`, not
    /// deterministic replay across a whole simulation (that's `marmot-harness`).
    #[derive(Clone)]
    pub struct MockEnv {
        source: Source,
    }

    impl MockEnv {
        /// An environment seeded from OS entropy (`rand::rngs::OsRng`).
        #[must_use]
        pub fn with_crypto_rng() -> Self {
            Self { source: Source::Os }
        }

        /// An environment whose randomness is reproducible across runs.
        #[must_use]
        pub fn with_seed(seed: u64) -> Self {
            use rand::SeedableRng;
            let rng = rand_chacha::ChaCha20Rng::seed_from_u64(seed);
            Self { source: Source::Seeded(Arc::new(Mutex::new(rng))) }
        }
    }

    impl Environment for MockEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            Instant::now()
        }

        fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            tokio::time::sleep(duration)
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            match &self.source {
                Source::Os => rand::rngs::OsRng.fill_bytes(buffer),
                Source::Seeded(rng) => {
                    let mut rng = rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    rng.fill_bytes(buffer);
                },
            }
        }
    }
}
