use dismissal_executor::{ForceAction, Verification};
use serde::{Deserialize, Serialize};

/// Cascade step, in the order the cascade runs them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DismissMethod {
    GuidedTour,
    Standard,
    OracleAssisted,
    Forced,
    Comprehensive,
    /// Nothing worked.
    None,
}

impl DismissMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DismissMethod::GuidedTour => "guided_tour",
            DismissMethod::Standard => "standard",
            DismissMethod::OracleAssisted => "oracle_assisted",
            DismissMethod::Forced => "forced",
            DismissMethod::Comprehensive => "comprehensive",
            DismissMethod::None => "none",
        }
    }

    /// Steps whose winning selector is fed back into the knowledge store.
    pub fn learns(&self) -> bool {
        matches!(self, DismissMethod::Standard | DismissMethod::Comprehensive)
    }
}

impl std::fmt::Display for DismissMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one cascade run. Failures live in `errors`, never in a `Result`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DismissalResult {
    pub success: bool,
    pub method: DismissMethod,
    pub context: String,
    pub selector_used: Option<String>,
    pub selectors_tried: Vec<String>,
    /// Every step's errors, each prefixed with the step name.
    pub errors: Vec<String>,
    pub steps_run: Vec<DismissMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_action: Option<ForceAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
    pub learned: bool,
}

impl DismissalResult {
    pub(crate) fn started(context: impl Into<String>) -> Self {
        Self {
            success: false,
            method: DismissMethod::None,
            context: context.into(),
            selector_used: None,
            selectors_tried: Vec::new(),
            errors: Vec::new(),
            steps_run: Vec::new(),
            force_action: None,
            verification: None,
            learned: false,
        }
    }

    pub(crate) fn run(&mut self, method: DismissMethod) {
        self.steps_run.push(method);
    }

    pub(crate) fn record<I, S>(&mut self, method: DismissMethod, errors: I)
    where
        I: IntoIterator<Item = S>,
        S: std::fmt::Display,
    {
        self.errors
            .extend(errors.into_iter().map(|err| format!("{method}: {err}")));
    }

    pub(crate) fn tried<I>(&mut self, selectors: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.selectors_tried.extend(selectors);
    }

    pub(crate) fn succeed(&mut self, method: DismissMethod, selector: Option<String>) {
        self.success = true;
        self.method = method;
        self.selector_used = selector;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_carry_the_step_name() {
        let mut result = DismissalResult::started("generic");
        result.record(DismissMethod::Forced, ["nothing moved"]);
        assert_eq!(result.errors, vec!["forced: nothing moved".to_string()]);
        assert!(!result.success);
        assert_eq!(result.method, DismissMethod::None);
    }

    #[test]
    fn only_selector_steps_learn() {
        assert!(DismissMethod::Standard.learns());
        assert!(DismissMethod::Comprehensive.learns());
        assert!(!DismissMethod::OracleAssisted.learns());
        assert!(!DismissMethod::GuidedTour.learns());
    }
}
