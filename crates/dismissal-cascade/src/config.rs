use std::time::Duration;

use dismissal_executor::TourStep;

pub const DEFAULT_TOTAL_BUDGET: Duration = Duration::from_secs(60);
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(10);

/// Fixed click sequence for a context known to host a tutorial overlay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuidedTour {
    pub context: String,
    pub steps: Vec<TourStep>,
}

impl GuidedTour {
    pub fn new(context: impl Into<String>, steps: Vec<TourStep>) -> Self {
        Self {
            context: context.into(),
            steps,
        }
    }

    /// Next/Continue, then Got it, then OK once the last animation settles.
    pub fn match_page_tour() -> Self {
        Self::new(
            "fb_match_page",
            vec![
                TourStep::new(
                    "Next",
                    [
                        r#"button:has-text("Next")"#,
                        r#"span:has-text("Next")"#,
                        r#"button:has-text("Continue")"#,
                        r#"span:has-text("Continue")"#,
                    ],
                ),
                TourStep::new(
                    "Got it",
                    [r#"button:has-text("Got it")"#, r#"span:has-text("Got it")"#],
                )
                .after(Duration::from_millis(1500)),
                TourStep::new(
                    "OK",
                    [r#"button:has-text("OK")"#, r#"span:has-text("OK")"#],
                )
                .after(Duration::from_secs(5)),
            ],
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CascadeConfig {
    /// Cap on the whole cascade; steps that would start after it are skipped.
    pub total_budget: Duration,
    pub guided_tours: Vec<GuidedTour>,
    pub monitor_interval: Duration,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            total_budget: DEFAULT_TOTAL_BUDGET,
            guided_tours: vec![GuidedTour::match_page_tour()],
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
        }
    }
}

impl CascadeConfig {
    pub fn tour_for(&self, context: &str) -> Option<&GuidedTour> {
        self.guided_tours.iter().find(|tour| tour.context == context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_match_page_has_a_tour_by_default() {
        let config = CascadeConfig::default();
        let tour = config.tour_for("fb_match_page").unwrap();
        assert_eq!(tour.steps.len(), 3);
        assert_eq!(tour.steps[2].pause_before, Duration::from_secs(5));
        assert!(config.tour_for("fb_general").is_none());
        assert!(config.tour_for("generic").is_none());
    }
}
