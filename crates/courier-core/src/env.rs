//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system resources (time, randomness). Backoff
//! jitter draws from [`Environment::random_u64`], and the runtime's timers go
//! through [`Environment::sleep`], so a seeded simulation reproduces the exact
//! reconnect schedule of a failing run.

use std::time::Duration;

/// Abstract environment providing time, randomness, and async sleep.
///
/// # Invariants
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - Given the same seed, a simulated environment produces the same sequence
///   of random values
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`; simulations may use
    /// virtual time.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it should only be used
    /// by driver code (not state machines).
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Used as the entropy source for backoff jitter.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
