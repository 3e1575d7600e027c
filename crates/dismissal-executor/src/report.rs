use serde::{Deserialize, Serialize};

/// Result of trying an ordered list of selectors.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyReport {
    pub success: bool,
    pub selector_used: Option<String>,
    pub selectors_tried: Vec<String>,
    /// Candidates that were present but hidden or disabled.
    pub skipped: Vec<String>,
    pub errors: Vec<String>,
}

impl StrategyReport {
    pub(crate) fn succeeded(mut self, selector: &str) -> Self {
        self.success = true;
        self.selector_used = Some(selector.to_string());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceAction {
    NeutralizeBlockers,
    CloseControl,
    OverlayClick,
    EscapeKey,
    OutsideClick,
}

impl ForceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForceAction::NeutralizeBlockers => "neutralize_blockers",
            ForceAction::CloseControl => "close_control",
            ForceAction::OverlayClick => "overlay_click",
            ForceAction::EscapeKey => "escape_key",
            ForceAction::OutsideClick => "outside_click",
        }
    }
}

impl std::fmt::Display for ForceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceReport {
    pub success: bool,
    /// Phase that cleared the page.
    pub winning_action: Option<ForceAction>,
    pub actions_taken: Vec<ForceAction>,
    pub errors: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiStepOutcome {
    Complete,
    Partial,
    NotStarted,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiStepReport {
    pub outcome: MultiStepOutcome,
    pub steps_planned: usize,
    pub steps_completed: usize,
    pub selectors_used: Vec<String>,
    pub errors: Vec<String>,
}

impl MultiStepReport {
    pub(crate) fn planned(steps: usize) -> Self {
        Self {
            outcome: MultiStepOutcome::NotStarted,
            steps_planned: steps,
            steps_completed: 0,
            selectors_used: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub(crate) fn finish(mut self) -> Self {
        self.outcome = if self.steps_planned > 0 && self.steps_completed == self.steps_planned {
            MultiStepOutcome::Complete
        } else if self.steps_completed > 0 {
            MultiStepOutcome::Partial
        } else {
            MultiStepOutcome::NotStarted
        };
        self
    }

    pub fn is_complete(&self) -> bool {
        self.outcome == MultiStepOutcome::Complete
    }

    pub fn is_partial(&self) -> bool {
        self.outcome == MultiStepOutcome::Partial
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    ObstructionSelectors,
    BodyClickable,
    MarkupChanged,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationCheck {
    pub kind: CheckKind,
    pub passed: bool,
    pub detail: String,
}

/// Composite post-dismissal check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub dismissed: bool,
    /// Fraction of checks that passed.
    pub confidence: f64,
    pub checks: Vec<VerificationCheck>,
}

impl Verification {
    pub(crate) fn from_checks(checks: Vec<VerificationCheck>) -> Self {
        let passed = checks.iter().filter(|check| check.passed).count();
        let confidence = if checks.is_empty() {
            0.0
        } else {
            passed as f64 / checks.len() as f64
        };
        Self {
            dismissed: confidence > 0.6,
            confidence,
            checks,
        }
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &VerificationCheck> {
        self.checks.iter().filter(|check| !check.passed)
    }
}
