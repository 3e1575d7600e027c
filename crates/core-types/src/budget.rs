use std::time::{Duration, Instant};

use crate::clock::Clock;

/// Wall-clock allowance shared by a sequence of driver operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Budget {
    deadline: Option<Instant>,
}

impl Budget {
    pub fn unbounded() -> Self {
        Self { deadline: None }
    }

    pub fn starting_now(clock: &dyn Clock, total: Duration) -> Self {
        Self {
            deadline: Some(clock.now() + total),
        }
    }

    pub fn is_exhausted(&self, clock: &dyn Clock) -> bool {
        match self.deadline {
            Some(deadline) => clock.now() >= deadline,
            None => false,
        }
    }

    /// Time left before the deadline; `None` when unbounded.
    pub fn remaining(&self, clock: &dyn Clock) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(clock.now()))
    }

    /// Clamps a per-operation timeout so it never outlives the budget.
    pub fn clamp(&self, clock: &dyn Clock, timeout: Duration) -> Duration {
        match self.remaining(clock) {
            Some(left) => timeout.min(left),
            None => timeout,
        }
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::unbounded()
    }
}
