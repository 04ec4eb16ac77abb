//! Wall-clock budget shared across one research run.

use std::time::{Duration, Instant};

use spaces_core::defaults::RESEARCH_PHASE_FLOOR_SECS;

/// Tracks elapsed time against a hard total; every phase transition checks
/// it and short-circuits to synthesis when the floor is reached.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    start: Instant,
    total: Duration,
}

impl Budget {
    pub fn new(total: Duration) -> Self {
        Self {
            start: Instant::now(),
            total,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    pub fn remaining(&self) -> Duration {
        self.total.saturating_sub(self.start.elapsed())
    }

    /// Below the per-phase floor: stop starting new work.
    pub fn exhausted(&self) -> bool {
        self.remaining().as_secs_f64() < RESEARCH_PHASE_FLOOR_SECS
    }

    /// Deadline for one sub-call: the remaining budget, capped at `max`.
    pub fn sub_deadline(&self, max: Duration) -> Duration {
        self.remaining().min(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_budget_is_not_exhausted() {
        let b = Budget::new(Duration::from_secs(120));
        assert!(!b.exhausted());
        assert!(b.remaining() > Duration::from_secs(110));
    }

    #[test]
    fn zero_budget_is_exhausted() {
        let b = Budget::new(Duration::ZERO);
        assert!(b.exhausted());
        assert_eq!(b.remaining(), Duration::ZERO);
    }

    #[test]
    fn sub_deadline_caps_at_remaining() {
        let b = Budget::new(Duration::from_secs(2));
        let d = b.sub_deadline(Duration::from_secs(10));
        assert!(d <= Duration::from_secs(2));
        let d = b.sub_deadline(Duration::from_millis(100));
        assert_eq!(d, Duration::from_millis(100));
    }
}
