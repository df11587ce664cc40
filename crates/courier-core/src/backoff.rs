//! Exponential backoff with jitter.
//!
//! Delay for attempt `n` (zero based) is `base * 2^n`, capped at `cap`, then
//! spread by up to `±jitter_percent` and clamped back under `cap`. Jitter is
//! drawn from caller-supplied entropy so the policy itself stays pure.

use std::time::Duration;

/// Default first retry delay.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default upper bound on any single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default jitter spread, in percent of the nominal delay.
pub const DEFAULT_JITTER_PERCENT: u8 = 20;

/// Shape of a backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub base: Duration,
    /// Maximum delay between retries
    pub cap: Duration,
    /// Jitter spread in percent (0..=100)
    pub jitter_percent: u8,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { base: DEFAULT_BASE_DELAY, cap: DEFAULT_MAX_DELAY, jitter_percent: DEFAULT_JITTER_PERCENT }
    }
}

impl BackoffPolicy {
    /// Policy with no jitter, for tests that assert exact delays.
    pub fn fixed(base: Duration, cap: Duration) -> Self {
        Self { base, cap, jitter_percent: 0 }
    }

    /// Delay before the retry numbered `attempt` (zero based).
    ///
    /// `entropy` selects the jitter offset; the same inputs always produce the
    /// same delay.
    pub fn delay(&self, attempt: u32, entropy: u64) -> Duration {
        // 2^20 * 500ms is already far past any sane cap
        let factor = 1u32 << attempt.min(20);
        let nominal = self.base.saturating_mul(factor).min(self.cap);

        let nominal_ms = nominal.as_millis() as u64;
        let span_ms = nominal_ms * u64::from(self.jitter_percent.min(100)) / 100;
        if span_ms == 0 {
            return nominal;
        }

        let offset = entropy % (2 * span_ms + 1);
        let jittered_ms = nominal_ms - span_ms + offset;

        Duration::from_millis(jittered_ms).min(self.cap)
    }
}

/// Attempt counter over a [`BackoffPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff {
    /// Fresh schedule starting at attempt zero.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Number of delays handed out since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Delay for the next retry; advances the attempt counter.
    pub fn next_delay(&mut self, entropy: u64) -> Duration {
        let delay = self.policy.delay(self.attempt, entropy);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Start over after a success.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Policy this schedule follows.
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_cap() {
        let policy = BackoffPolicy::fixed(Duration::from_millis(500), Duration::from_secs(30));

        assert_eq!(policy.delay(0, 0), Duration::from_millis(500));
        assert_eq!(policy.delay(1, 0), Duration::from_secs(1));
        assert_eq!(policy.delay(2, 0), Duration::from_secs(2));
        assert_eq!(policy.delay(6, 0), Duration::from_secs(30));
        assert_eq!(policy.delay(u32::MAX, 0), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_within_twenty_percent() {
        let policy = BackoffPolicy::default();

        for entropy in [0, 1, 99, 200, 201, u64::MAX] {
            let delay = policy.delay(0, entropy);
            assert!(delay >= Duration::from_millis(400), "{delay:?}");
            assert!(delay <= Duration::from_millis(600), "{delay:?}");
        }
    }

    #[test]
    fn jitter_never_exceeds_cap() {
        let policy = BackoffPolicy::default();
        assert!(policy.delay(30, u64::MAX) <= policy.cap);
    }

    #[test]
    fn backoff_counts_and_resets() {
        let mut backoff =
            Backoff::new(BackoffPolicy::fixed(Duration::from_millis(100), Duration::from_secs(1)));

        assert_eq!(backoff.next_delay(0), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(0), Duration::from_millis(200));
        assert_eq!(backoff.attempts(), 2);

        backoff.reset();
        assert_eq!(backoff.next_delay(0), Duration::from_millis(100));
    }
}
