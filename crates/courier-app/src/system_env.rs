//! Production Environment implementation using system time and RNG.
//!
//! `SystemEnv` is the production implementation of the Environment trait using
//! real system time and the OS RNG.
//!
//! # Capabilities
//!
//! - Real system time (`std::time::Instant`) that advances naturally
//! - OS randomness (getrandom) for backoff jitter
//! - Tokio async sleep for actual wall-clock delays

use std::time::Duration;

use courier_core::env::Environment;

/// Production environment using system time and OS randomness.
///
/// Uses `std::time::Instant::now()` for time, `tokio::time::sleep()` for async
/// sleeping, and getrandom for jitter entropy.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        // Without entropy every delay is the lowest jittered value
        if let Err(error) = getrandom::fill(buffer) {
            tracing::warn!(%error, "OS RNG unavailable, jitter disabled");
            buffer.fill(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_is_monotonic() {
        let env = SystemEnv::new();
        let t1 = env.now();
        let t2 = env.now();

        assert!(t2 >= t1);
    }

    #[test]
    fn random_values_differ() {
        let env = SystemEnv::new();

        // 2^-64 collision chance
        assert_ne!(env.random_u64(), env.random_u64());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_waits_for_duration() {
        let env = SystemEnv::new();
        let start = tokio::time::Instant::now();

        env.sleep(Duration::from_secs(5)).await;

        assert!(tokio::time::Instant::now() - start >= Duration::from_secs(5));
    }
}
