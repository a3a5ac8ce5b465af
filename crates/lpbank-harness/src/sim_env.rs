//! Simulation environment with virtual time and seeded randomness.

use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use lpbank_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Environment for simulations.
///
/// Time comes from tokio's clock, which turmoil drives virtually. Outside a
/// simulation it falls back to the system clock. Randomness comes from a
/// ChaCha8 stream seeded once, shared by every clone.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl SimEnv {
    /// Environment whose random stream is fixed by `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))) }
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl std::fmt::Debug for SimEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEnv").finish_non_exhaustive()
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        // A poisoned lock still holds a valid RNG.
        let mut rng = self.rng.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        rng.fill_bytes(buffer);
    }
}
