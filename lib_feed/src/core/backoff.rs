//! # Reconnection Backoff
//!
//! Exponential backoff with a ceiling and optional jitter. The nominal delay
//! starts at `initial`, doubles each time a scheduled retry actually fires, is
//! capped at `max`, and snaps back to `initial` on a successful connect. After
//! N consecutive failures the wait before attempt N+1 is therefore
//! `min(initial * 2^(N-1), max)`.
//!
//! Jitter only affects the sleep handed to the timer; the nominal sequence
//! above is never perturbed by it.

use std::time::Duration;

use rand::Rng;

/// Default first retry delay.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1_000);
/// Default ceiling for the retry delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);
/// Largest accepted jitter ratio; every sleep keeps at least a tenth of its
/// nominal delay.
pub const MAX_JITTER_RATIO: f64 = 0.9;

/// Backoff state for one connection manager.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    jitter_ratio: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl Backoff {
    /// Creates a policy without jitter. `max` is raised to `initial` if lower.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            current: initial,
            jitter_ratio: 0.0,
        }
    }

    /// Sets the jitter ratio, clamped to `[0, MAX_JITTER_RATIO]`.
    pub fn with_jitter(mut self, ratio: f64) -> Self {
        self.jitter_ratio = if ratio.is_finite() { ratio.clamp(0.0, MAX_JITTER_RATIO) } else { 0.0 };
        self
    }

    /// Nominal delay for the next scheduled retry.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Ceiling.
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Doubles the nominal delay, bounded by the ceiling.
    pub fn advance(&mut self) {
        self.current = self.current.saturating_mul(2).min(self.max);
    }

    /// Returns to the initial delay.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    /// The sleep to actually schedule: the nominal delay, shortened by up to
    /// `jitter_ratio` of itself.
    pub fn jittered(&self) -> Duration {
        if self.jitter_ratio <= 0.0 || self.current.is_zero() {
            return self.current;
        }
        let factor = 1.0 - rand::rng().random_range(0.0..=self.jitter_ratio);
        self.current.mul_f64(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_up_to_the_ceiling() {
        let mut backoff = Backoff::new(Duration::from_millis(1_000), Duration::from_millis(30_000));
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(backoff.current().as_millis());
            backoff.advance();
        }
        assert_eq!(seen, vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000]);
    }

    #[test]
    fn reset_returns_to_initial() {
        let mut backoff = Backoff::default();
        backoff.advance();
        backoff.advance();
        assert_eq!(backoff.current(), Duration::from_millis(4_000));
        backoff.reset();
        assert_eq!(backoff.current(), DEFAULT_INITIAL_DELAY);
    }

    #[test]
    fn max_below_initial_is_raised() {
        let backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(backoff.max(), Duration::from_secs(5));
    }

    #[test]
    fn no_jitter_means_exact_sleep() {
        let backoff = Backoff::default();
        assert_eq!(backoff.jittered(), backoff.current());
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let backoff = Backoff::new(Duration::from_millis(1_000), Duration::from_millis(1_000)).with_jitter(0.5);
        for _ in 0..200 {
            let sleep = backoff.jittered();
            assert!(sleep >= Duration::from_millis(500), "{:?}", sleep);
            assert!(sleep <= Duration::from_millis(1_000), "{:?}", sleep);
        }
        assert_eq!(Backoff::default().with_jitter(7.0).jitter_ratio, MAX_JITTER_RATIO);
        assert_eq!(Backoff::default().with_jitter(f64::NAN).jitter_ratio, 0.0);
    }

    #[test]
    fn full_jitter_never_collapses_the_sleep() {
        let backoff = Backoff::new(Duration::from_millis(1_000), Duration::from_millis(1_000)).with_jitter(1.0);
        for _ in 0..500 {
            let sleep = backoff.jittered();
            assert!(sleep >= Duration::from_millis(99), "{:?}", sleep);
        }
    }
}
