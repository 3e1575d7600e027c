use std::collections::HashSet;
use std::time::Duration;

use obstruction_analyzer::Diagnosis;
use page_driver::{recoverable, DriverError, ElementHandle, ElementState, PageDriver};
use pagewarden_core_types::{Budget, SharedClock, SystemClock};
use tokio::select;
use tracing::{debug, info, instrument, warn};

use crate::report::{
    CheckKind, ForceAction, ForceReport, MultiStepReport, StrategyReport, Verification,
    VerificationCheck,
};
use crate::scripts::{self, reported_click, routine_args, BLOCKER_SELECTORS};
use crate::timeouts::ExecutorTimeouts;

/// Selectors whose presence means an obstruction is still on the page.
pub const OBSTRUCTION_SELECTORS: [&str; 5] = [
    ".modal",
    ".popup",
    ".overlay",
    ".dialog",
    r#"[role="dialog"]"#,
];

const FORCE_PHASES: [ForceAction; 5] = [
    ForceAction::NeutralizeBlockers,
    ForceAction::CloseControl,
    ForceAction::OverlayClick,
    ForceAction::EscapeKey,
    ForceAction::OutsideClick,
];

const MARKUP_CHANGE_THRESHOLD: f64 = 0.95;

/// One step of a known multi-step flow: click the first visible candidate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TourStep {
    pub label: String,
    pub candidates: Vec<String>,
    pub pause_before: Duration,
}

impl TourStep {
    pub fn new<I, S>(label: impl Into<String>, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label: label.into(),
            candidates: candidates.into_iter().map(Into::into).collect(),
            pause_before: Duration::ZERO,
        }
    }

    pub fn after(mut self, pause: Duration) -> Self {
        self.pause_before = pause;
        self
    }
}

enum Attempt {
    Dismissed,
    Skipped(String),
    Failed(String),
}

/// Executes dismissal strategies against one page.
pub struct DismissalExecutor {
    clock: SharedClock,
    timeouts: ExecutorTimeouts,
}

impl Default for DismissalExecutor {
    fn default() -> Self {
        Self::new(SystemClock::shared())
    }
}

impl DismissalExecutor {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            timeouts: ExecutorTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: ExecutorTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn timeouts(&self) -> &ExecutorTimeouts {
        &self.timeouts
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Tries `selectors` in order until a click makes its target disappear.
    #[instrument(skip_all, fields(context = %context, candidates = selectors.len()))]
    pub async fn execute_dismissal(
        &self,
        page: &dyn PageDriver,
        selectors: &[String],
        context: &str,
        budget: Budget,
    ) -> Result<StrategyReport, DriverError> {
        let mut report = StrategyReport::default();
        if selectors.is_empty() {
            report.errors.push("no selectors provided".to_string());
            return Ok(report);
        }

        for selector in selectors {
            if budget.is_exhausted(self.clock.as_ref()) {
                report
                    .errors
                    .push(format!("budget exhausted before {selector}"));
                break;
            }
            report.selectors_tried.push(selector.clone());
            match self.attempt(page, selector, budget).await? {
                Attempt::Dismissed => {
                    info!(selector = %selector, "obstruction dismissed");
                    return Ok(report.succeeded(selector));
                }
                Attempt::Skipped(reason) => {
                    debug!(selector = %selector, reason = %reason, "candidate skipped");
                    report.skipped.push(selector.clone());
                }
                Attempt::Failed(reason) => {
                    debug!(selector = %selector, reason = %reason, "candidate failed");
                    report.errors.push(format!("{selector}: {reason}"));
                }
            }
        }

        report.errors.push(format!(
            "none of {} candidate(s) dismissed the obstruction",
            report.selectors_tried.len()
        ));
        Ok(report)
    }

    async fn attempt(
        &self,
        page: &dyn PageDriver,
        selector: &str,
        budget: Budget,
    ) -> Result<Attempt, DriverError> {
        let clock = self.clock.as_ref();
        let handle = match self.present(page, selector, budget).await? {
            Ok(handle) => handle,
            Err(reason) => return Ok(Attempt::Failed(reason)),
        };

        match recoverable(page.is_visible(&handle, self.timeouts.visibility).await)? {
            Ok(true) => {}
            Ok(false) => return Ok(Attempt::Skipped("not visible".to_string())),
            Err(err) => return Ok(Attempt::Failed(err.to_string())),
        }

        let enabled = select! {
            biased;
            result = page.is_enabled(&handle) => recoverable(result)?,
            _ = clock.sleep(self.timeouts.enabled) => {
                Err(DriverError::timeout("is_enabled", self.timeouts.enabled))
            }
        };
        match enabled {
            Ok(true) => {}
            Ok(false) => return Ok(Attempt::Skipped("not enabled".to_string())),
            Err(err) => return Ok(Attempt::Failed(err.to_string())),
        }

        let click_timeout = budget.clamp(clock, self.timeouts.click);
        if let Err(err) = recoverable(page.click(&handle, click_timeout, false).await)? {
            return Ok(Attempt::Failed(format!("click failed: {err}")));
        }
        clock.sleep(self.timeouts.settle).await;

        match recoverable(page.is_visible(&handle, self.timeouts.visibility).await)? {
            Ok(false) | Err(DriverError::Detached(_)) | Err(DriverError::NotFound(_)) => {
                Ok(Attempt::Dismissed)
            }
            Ok(true) => Ok(Attempt::Failed("still visible after click".to_string())),
            Err(err) => Ok(Attempt::Failed(format!("post-click check failed: {err}"))),
        }
    }

    /// First handle for `selector`.
    ///
    /// The obstruction is already rendered when a cascade runs, so a candidate
    /// the page cannot locate right now fails at once. The presence timeout
    /// only applies when the page could not answer the lookup.
    async fn present(
        &self,
        page: &dyn PageDriver,
        selector: &str,
        budget: Budget,
    ) -> Result<Result<ElementHandle, String>, DriverError> {
        match recoverable(page.locate(selector).await)? {
            Ok(handles) => {
                return Ok(handles
                    .into_iter()
                    .next()
                    .ok_or_else(|| "not present".to_string()))
            }
            Err(err) => debug!(selector, error = %err, "lookup failed; waiting for presence"),
        }

        let presence = budget.clamp(self.clock.as_ref(), self.timeouts.presence);
        match recoverable(page.wait_for(selector, ElementState::Attached, presence).await)? {
            Ok(true) => {}
            Ok(false) => {
                return Ok(Err(format!(
                    "not present within {}ms",
                    presence.as_millis()
                )))
            }
            Err(err) => return Ok(Err(err.to_string())),
        }
        Ok(match recoverable(page.locate(selector).await)? {
            Ok(handles) => handles
                .into_iter()
                .next()
                .ok_or_else(|| "no element located".to_string()),
            Err(err) => Err(err.to_string()),
        })
    }

    /// Script-level dismissal for layered or pointer-blocking overlays.
    ///
    /// Phases run in order until one clears every visible blocker. A page
    /// with no visible blocker is left untouched.
    #[instrument(skip_all, fields(layers = diagnosis.layer_count, pointer_blocking = diagnosis.pointer_blocking))]
    pub async fn execute_force_dismissal(
        &self,
        page: &dyn PageDriver,
        diagnosis: &Diagnosis,
    ) -> Result<ForceReport, DriverError> {
        let clock = self.clock.as_ref();
        let budget = Budget::starting_now(clock, self.timeouts.force);
        let mut report = ForceReport::default();
        if !self.blockers_visible(page).await? {
            debug!("no visible blocker; nothing to force");
            report
                .errors
                .push("no visible blocker to force away".to_string());
            return Ok(report);
        }

        for action in FORCE_PHASES {
            if budget.is_exhausted(clock) {
                report.errors.push(format!(
                    "force dismissal exceeded {}ms",
                    self.timeouts.force.as_millis()
                ));
                break;
            }
            if action == ForceAction::NeutralizeBlockers && !diagnosis.pointer_blocking {
                continue;
            }

            match self.run_phase(page, action).await? {
                Ok(clicked) => debug!(action = %action, clicked, "force phase ran"),
                Err(err) => {
                    report.errors.push(format!("{action}: {err}"));
                    continue;
                }
            }
            report.actions_taken.push(action);
            clock.sleep(self.timeouts.force_settle).await;

            if !self.blockers_visible(page).await? {
                info!(action = %action, "forced dismissal cleared the page");
                report.success = true;
                report.winning_action = Some(action);
                return Ok(report);
            }
            report
                .errors
                .push(format!("{action}: obstruction still present"));
        }

        warn!(
            actions = report.actions_taken.len(),
            "forced dismissal did not clear the page"
        );
        Ok(report)
    }

    async fn run_phase(
        &self,
        page: &dyn PageDriver,
        action: ForceAction,
    ) -> Result<Result<bool, DriverError>, DriverError> {
        let args = routine_args(action.as_str());
        let outcome = match action {
            ForceAction::NeutralizeBlockers => page
                .evaluate_script(scripts::NEUTRALIZE_BLOCKERS, args)
                .await
                .map(|_| false),
            ForceAction::CloseControl => page
                .evaluate_script(scripts::CLOSE_CONTROL, args)
                .await
                .map(|result| reported_click(&result)),
            ForceAction::OverlayClick => page
                .evaluate_script(scripts::OVERLAY_CLICK, args)
                .await
                .map(|result| reported_click(&result)),
            ForceAction::EscapeKey => page.keyboard_press("Escape").await.map(|_| false),
            ForceAction::OutsideClick => page.click_at(10.0, 10.0).await.map(|_| false),
        };
        recoverable(outcome)
    }

    async fn blockers_visible(&self, page: &dyn PageDriver) -> Result<bool, DriverError> {
        for selector in BLOCKER_SELECTORS {
            let handles = match recoverable(page.locate(selector).await)? {
                Ok(handles) => handles,
                Err(err) => {
                    debug!(selector, error = %err, "blocker lookup failed");
                    continue;
                }
            };
            for handle in handles {
                if let Ok(true) =
                    recoverable(page.is_visible(&handle, self.timeouts.visibility).await)?
                {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Clicks `selectors` in sequence, stopping at the first step that fails.
    ///
    /// `steps == 0` means every selector. Waits grow per step to ride out
    /// animated transitions.
    #[instrument(skip_all, fields(steps = steps))]
    pub async fn execute_multi_step(
        &self,
        page: &dyn PageDriver,
        selectors: &[String],
        steps: usize,
    ) -> Result<MultiStepReport, DriverError> {
        let planned = if steps == 0 {
            selectors.len()
        } else {
            steps.min(selectors.len())
        };
        let mut report = MultiStepReport::planned(planned);
        if planned == 0 {
            report
                .errors
                .push("no selectors provided for multi-step dismissal".to_string());
            return Ok(report.finish());
        }

        for (index, selector) in selectors.iter().take(planned).enumerate() {
            let wait = self.timeouts.multi_step_wait(index);
            if let Err(reason) = self.click_step(page, selector, wait).await? {
                report.errors.push(format!(
                    "step {}/{planned} ({selector}): {reason}",
                    index + 1
                ));
                break;
            }
            report.selectors_used.push(selector.clone());
            report.steps_completed = index + 1;
            debug!(step = index + 1, selector = %selector, "multi-step click");
            if index + 1 < planned {
                self.clock.sleep(self.timeouts.inter_step_pause).await;
            }
        }

        let report = report.finish();
        if report.is_partial() {
            info!(
                completed = report.steps_completed,
                planned, "multi-step dismissal partially completed"
            );
        }
        Ok(report)
    }

    async fn click_step(
        &self,
        page: &dyn PageDriver,
        selector: &str,
        wait: Duration,
    ) -> Result<Result<(), String>, DriverError> {
        match recoverable(page.wait_for(selector, ElementState::Visible, wait).await)? {
            Ok(true) => {}
            Ok(false) => return Ok(Err(format!("not visible within {}ms", wait.as_millis()))),
            Err(err) => return Ok(Err(err.to_string())),
        }
        let handle = ElementHandle::first(selector);
        Ok(
            recoverable(page.click(&handle, self.timeouts.multi_step_click, false).await)?
                .map_err(|err| err.to_string()),
        )
    }

    /// Runs a known flow, clicking the first visible candidate of each step.
    #[instrument(skip_all, fields(steps = steps.len()))]
    pub async fn execute_sequence(
        &self,
        page: &dyn PageDriver,
        steps: &[TourStep],
    ) -> Result<MultiStepReport, DriverError> {
        let mut report = MultiStepReport::planned(steps.len());
        for (index, step) in steps.iter().enumerate() {
            if !step.pause_before.is_zero() {
                self.clock.sleep(step.pause_before).await;
            }
            match self.click_first_visible(page, &step.candidates).await? {
                Some(selector) => {
                    debug!(step = %step.label, selector = %selector, "sequence step clicked");
                    report.selectors_used.push(selector);
                    report.steps_completed = index + 1;
                }
                None => {
                    report
                        .errors
                        .push(format!("could not find the '{}' control", step.label));
                    break;
                }
            }
        }
        Ok(report.finish())
    }

    async fn click_first_visible(
        &self,
        page: &dyn PageDriver,
        candidates: &[String],
    ) -> Result<Option<String>, DriverError> {
        for candidate in candidates {
            let handle = match recoverable(page.locate(candidate).await)? {
                Ok(handles) => match handles.into_iter().next() {
                    Some(handle) => handle,
                    None => continue,
                },
                Err(_) => continue,
            };
            if !matches!(
                recoverable(page.is_visible(&handle, self.timeouts.visibility).await)?,
                Ok(true)
            ) {
                continue;
            }
            match recoverable(page.click(&handle, self.timeouts.multi_step_click, false).await)? {
                Ok(()) => return Ok(Some(candidate.clone())),
                Err(err) => debug!(selector = %candidate, error = %err, "sequence click failed"),
            }
        }
        Ok(None)
    }

    /// Composite check that the page is usable again.
    #[instrument(skip_all, fields(with_snapshot = before.is_some()))]
    pub async fn verify(
        &self,
        page: &dyn PageDriver,
        before: Option<&str>,
    ) -> Result<Verification, DriverError> {
        self.clock.sleep(self.timeouts.verify_settle).await;
        let mut checks = Vec::with_capacity(3);

        let mut present = 0usize;
        for selector in OBSTRUCTION_SELECTORS {
            if let Ok(handles) = recoverable(page.locate(selector).await)? {
                present += handles.len();
            }
        }
        checks.push(VerificationCheck {
            kind: CheckKind::ObstructionSelectors,
            passed: present == 0,
            detail: format!("{present} obstruction element(s) present"),
        });

        let body = ElementHandle::first("body");
        let clicked = recoverable(
            page.click(&body, self.timeouts.verify_body_click, false)
                .await,
        )?;
        checks.push(VerificationCheck {
            kind: CheckKind::BodyClickable,
            passed: clicked.is_ok(),
            detail: match &clicked {
                Ok(()) => "body accepted a click".to_string(),
                Err(err) => err.to_string(),
            },
        });

        if let Some(before) = before {
            let check = match recoverable(page.content().await)? {
                Ok(after) => {
                    let similarity = token_similarity(before, &after);
                    VerificationCheck {
                        kind: CheckKind::MarkupChanged,
                        passed: similarity < MARKUP_CHANGE_THRESHOLD,
                        detail: format!("token similarity {similarity:.3}"),
                    }
                }
                Err(err) => VerificationCheck {
                    kind: CheckKind::MarkupChanged,
                    passed: false,
                    detail: err.to_string(),
                },
            };
            checks.push(check);
        }

        let verification = Verification::from_checks(checks);
        debug!(
            dismissed = verification.dismissed,
            confidence = verification.confidence,
            "dismissal verified"
        );
        Ok(verification)
    }
}

/// Jaccard similarity of the whitespace-separated tokens of two documents.
pub fn token_similarity(a: &str, b: &str) -> f64 {
    let left: HashSet<&str> = a.split_whitespace().collect();
    let right: HashSet<&str> = b.split_whitespace().collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 1.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_is_token_jaccard() {
        assert_eq!(token_similarity("", ""), 1.0);
        assert_eq!(token_similarity("a b", "a b"), 1.0);
        assert!((token_similarity("a b c", "a b d") - 0.5).abs() < f64::EPSILON);
        assert_eq!(token_similarity("a", "b"), 0.0);
    }

    #[test]
    fn tour_step_builder() {
        let step = TourStep::new("OK", ["#ok"]).after(Duration::from_secs(5));
        assert_eq!(step.candidates, vec!["#ok".to_string()]);
        assert_eq!(step.pause_before, Duration::from_secs(5));
    }
}
