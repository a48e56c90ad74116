//! Reconnection policy.
//!
//! Pure exponential backoff with a bounded attempt budget. The policy only
//! decides; the manager owns the timer.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    base_delay: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
            attempts: 0,
        }
    }

    /// Delay before retry number `attempt` (1-based): `base × 2^(attempt−1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Record an abnormal closure.
    ///
    /// Returns the delay before the next attempt, or `None` once the budget is
    /// spent.
    pub fn on_abnormal_close(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        self.attempts += 1;
        Some(self.delay_for(self.attempts))
    }

    /// Forget past failures (successful open, explicit connect or disconnect).
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// True once no retry budget is left.
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn doubles_from_base() {
        let mut policy = ReconnectPolicy::new(ms(1000), 5);
        let delays: Vec<_> = std::iter::from_fn(|| policy.on_abnormal_close()).collect();
        assert_eq!(delays, vec![ms(1000), ms(2000), ms(4000), ms(8000), ms(16000)]);
        assert!(policy.is_exhausted());
        assert_eq!(policy.on_abnormal_close(), None);
    }

    #[test]
    fn reset_restarts_at_base() {
        let mut policy = ReconnectPolicy::new(ms(300), 4);
        policy.on_abnormal_close();
        policy.on_abnormal_close();
        policy.on_abnormal_close();
        policy.reset();
        assert_eq!(policy.attempts(), 0);
        assert_eq!(policy.on_abnormal_close(), Some(ms(300)));
    }

    #[test]
    fn zero_budget_never_retries() {
        let mut policy = ReconnectPolicy::new(ms(10), 0);
        assert!(policy.is_exhausted());
        assert_eq!(policy.on_abnormal_close(), None);
    }

    #[test]
    fn huge_attempt_saturates() {
        let policy = ReconnectPolicy::new(ms(1000), u32::MAX);
        assert!(policy.delay_for(200) >= policy.delay_for(31));
    }
}
