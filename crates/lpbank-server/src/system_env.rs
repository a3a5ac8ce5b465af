//! Production Environment implementation using system time and RNG.

use lpbank_core::Environment;

/// Production environment using the system clock and OS entropy.
///
/// Randomness comes from `getrandom`. Session ids are not a security
/// boundary here, but there is no reason to use a weaker source.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now(&self) -> std::time::Instant {
        std::time::Instant::now()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).unwrap_or_else(|e| {
            // Zeroed ids still work; they just stop being distinct.
            tracing::error!("getrandom failed: {}", e);
            buffer.fill(0);
        });
    }
}
