use std::time::Duration;

/// Per-operation limits used by [`crate::DismissalExecutor`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutorTimeouts {
    pub presence: Duration,
    pub visibility: Duration,
    pub enabled: Duration,
    pub click: Duration,
    /// Pause after a click before checking that the target went away.
    pub settle: Duration,
    /// Whole forced-dismissal routine.
    pub force: Duration,
    pub force_settle: Duration,
    pub multi_step_base: Duration,
    /// Added per step so later steps tolerate slower transitions.
    pub multi_step_increment: Duration,
    pub multi_step_max: Duration,
    pub multi_step_click: Duration,
    pub inter_step_pause: Duration,
    pub verify_settle: Duration,
    pub verify_body_click: Duration,
}

impl Default for ExecutorTimeouts {
    fn default() -> Self {
        Self {
            presence: Duration::from_secs(5),
            visibility: Duration::from_secs(1),
            enabled: Duration::from_secs(1),
            click: Duration::from_secs(5),
            settle: Duration::from_millis(500),
            force: Duration::from_secs(10),
            force_settle: Duration::from_millis(500),
            multi_step_base: Duration::from_secs(5),
            multi_step_increment: Duration::from_secs(1),
            multi_step_max: Duration::from_secs(15),
            multi_step_click: Duration::from_secs(3),
            inter_step_pause: Duration::from_millis(1500),
            verify_settle: Duration::from_secs(1),
            verify_body_click: Duration::from_secs(1),
        }
    }
}

impl ExecutorTimeouts {
    /// Wait allowed for step `index` (zero-based) of a multi-step sequence.
    pub fn multi_step_wait(&self, index: usize) -> Duration {
        let grown = self.multi_step_base + self.multi_step_increment * index as u32;
        grown.min(self.multi_step_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_waits_grow_then_cap() {
        let timeouts = ExecutorTimeouts::default();
        assert_eq!(timeouts.multi_step_wait(0), Duration::from_secs(5));
        assert_eq!(timeouts.multi_step_wait(3), Duration::from_secs(8));
        assert_eq!(timeouts.multi_step_wait(40), Duration::from_secs(15));
    }
}
