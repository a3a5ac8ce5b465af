//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples bank logic from system resources (time
//! and randomness). Production uses the OS clock and entropy; simulations
//! plug in a seeded RNG so every session id is reproducible.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence

use std::time::Instant;

use crate::participant::SessionId;

/// Abstract environment providing time and randomness.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current time. Must be monotonic.
    fn now(&self) -> Instant;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a teller session id in the 8-4-4-4-12 hex layout.
    ///
    /// Not a security boundary: collisions are negligible, not impossible.
    fn session_id(&self) -> SessionId {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        SessionId::from_bytes(bytes)
    }
}
