//! Circuit breaker bounding consecutive rollbacks.

use serde::{Deserialize, Serialize};

pub const DEFAULT_THRESHOLD: u32 = 3;

/// Run-scoped counter state machine.
///
/// Any iteration that completes without a rollback resets the counter;
/// every executed rollback increments it. Reaching the threshold halts
/// the loop regardless of remaining iteration budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CircuitBreaker {
    consecutive_rollbacks: u32,
    threshold: u32,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive_rollbacks: 0,
            threshold,
        }
    }

    /// An iteration ended in an executed rollback.
    pub fn record_rollback(&mut self) {
        self.consecutive_rollbacks += 1;
        tracing::debug!(
            consecutive = self.consecutive_rollbacks,
            threshold = self.threshold,
            "rollback recorded"
        );
    }

    /// An iteration completed without a rollback.
    pub fn reset(&mut self) {
        self.consecutive_rollbacks = 0;
    }

    pub fn tripped(&self) -> bool {
        self.consecutive_rollbacks >= self.threshold
    }

    pub fn consecutive_rollbacks(&self) -> u32 {
        self.consecutive_rollbacks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_at_threshold() {
        let mut breaker = CircuitBreaker::new(3);
        breaker.record_rollback();
        breaker.record_rollback();
        assert!(!breaker.tripped());
        breaker.record_rollback();
        assert!(breaker.tripped());
    }

    #[test]
    fn reset_clears_the_segment() {
        let mut breaker = CircuitBreaker::new(3);
        breaker.record_rollback();
        breaker.record_rollback();
        breaker.reset();
        assert_eq!(breaker.consecutive_rollbacks(), 0);
        breaker.record_rollback();
        assert!(!breaker.tripped());
    }

    #[test]
    fn default_threshold_is_three() {
        let breaker = CircuitBreaker::default();
        assert_eq!(breaker, CircuitBreaker::new(3));
    }

    #[test]
    fn threshold_one_trips_immediately() {
        let mut breaker = CircuitBreaker::new(1);
        breaker.record_rollback();
        assert!(breaker.tripped());
    }
}
