//! # Fibonacci Backoff
//!
//! Progressive retry delay for failed reconciliations. Grows more slowly than
//! exponential backoff, so a resource with a persistent problem (a policy that
//! will not compile, a malformed secret) is retried regularly without hammering
//! the API server.
//!
//! With the controller defaults (1m floor, 10m cap) the sequence is
//! 1m, 1m, 2m, 3m, 5m, 8m, 10m, 10m, ...
//!
//! ```rust
//! use attester_controller::controller::backoff::FibonacciBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = FibonacciBackoff::new(Duration::from_secs(60), Duration::from_secs(600));
//! assert_eq!(backoff.next_backoff_seconds(), 60);
//! assert_eq!(backoff.next_backoff_seconds(), 60);
//! assert_eq!(backoff.next_backoff_seconds(), 120);
//! assert_eq!(backoff.next_backoff_seconds(), 180);
//! assert_eq!(backoff.next_backoff_seconds(), 300);
//! ```

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each delay is the sum of the previous two, starting from `min` and capped at `max`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_secs: u64,
    prev_secs: u64,
    current_secs: u64,
    max_secs: u64,
}

impl FibonacciBackoff {
    /// Create a backoff whose first two delays are `min` and which never exceeds `max`
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        let min_secs = min.as_secs().max(1);
        Self {
            min_secs,
            prev_secs: 0,
            current_secs: min_secs,
            max_secs: max.as_secs().max(min_secs),
        }
    }

    /// Current delay in seconds; advances the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result = self.current_secs;
        let next = self.prev_secs.saturating_add(self.current_secs);
        self.prev_secs = self.current_secs;
        self.current_secs = next.min(self.max_secs);
        result
    }

    /// Current delay as a `Duration`; advances the sequence
    ///
    /// ```
    /// use attester_controller::controller::backoff::FibonacciBackoff;
    /// use std::time::Duration;
    ///
    /// let mut backoff = FibonacciBackoff::new(Duration::from_secs(1), Duration::from_secs(60));
    /// assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
    /// ```
    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }

    /// Start over from the floor, e.g. after a successful pass
    pub fn reset(&mut self) {
        self.prev_secs = 0;
        self.current_secs = self.min_secs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minutes(n: u64) -> Duration {
        Duration::from_secs(n * 60)
    }

    #[test]
    fn test_fibonacci_backoff_sequence_caps_at_max() {
        let mut backoff = FibonacciBackoff::new(minutes(1), minutes(10));

        let delays: Vec<u64> = (0..9).map(|_| backoff.next_backoff_seconds()).collect();
        assert_eq!(delays, vec![60, 60, 120, 180, 300, 480, 600, 600, 600]);
    }

    #[test]
    fn test_fibonacci_backoff_reset() {
        let mut backoff = FibonacciBackoff::new(minutes(1), minutes(10));
        for _ in 0..4 {
            backoff.next_backoff_seconds();
        }

        backoff.reset();

        assert_eq!(backoff.next_backoff(), minutes(1));
        assert_eq!(backoff.next_backoff(), minutes(1));
        assert_eq!(backoff.next_backoff(), minutes(2));
    }

    #[test]
    fn test_fibonacci_backoff_degenerate_bounds() {
        // Zero floor would never grow; max below min is lifted to min
        let mut backoff = FibonacciBackoff::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(backoff.next_backoff_seconds(), 1);
        assert_eq!(backoff.next_backoff_seconds(), 1);
        assert_eq!(backoff.next_backoff_seconds(), 1);
    }

    #[test]
    fn test_fibonacci_backoff_instances_are_independent() {
        let mut a = FibonacciBackoff::new(minutes(1), minutes(10));
        let mut b = a.clone();

        a.next_backoff_seconds();
        a.next_backoff_seconds();
        assert_eq!(a.next_backoff_seconds(), 120);
        assert_eq!(b.next_backoff_seconds(), 60);
    }
}
