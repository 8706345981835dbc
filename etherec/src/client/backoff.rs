//! Exponential reconnect backoff.

use std::time::Duration;

/// Delay between failed connection attempts: starts at one second, doubles
/// per failure, and saturates at the cap. Reset on any successful connect.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    cap: Duration,
    current: Duration,
}

impl Backoff {
    /// Creates a backoff with explicit bounds.
    #[must_use]
    pub const fn with_bounds(initial: Duration, cap: Duration) -> Self {
        Self {
            initial,
            cap,
            current: initial,
        }
    }

    /// Creates the standard 1 s → 32 s backoff.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_bounds(Duration::from_secs(1), Duration::from_secs(32))
    }

    /// Returns the delay to sleep before the next attempt and doubles the
    /// stored delay, saturating at the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.cap);
        delay
    }

    /// Restores the initial delay, called after a successful connect.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_and_caps() {
        let mut backoff = Backoff::new();
        let delays: Vec<u64> = (0..8).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, [1, 2, 4, 8, 16, 32, 32, 32]);
    }

    #[test]
    fn reset_restores_initial_delay() {
        let mut backoff = Backoff::new();
        for _ in 0..5 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }
}
