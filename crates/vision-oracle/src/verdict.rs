use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::recovery::recover_json;

pub const MAX_VERDICT_SELECTORS: usize = 5;

const PLACEHOLDER_FRAGMENTS: [&str; 4] = ["skeleton", "loading", "spinner", "progress"];
const TARGETING_TOKENS: [&str; 7] = ["#", ".", "[", ":", "button", "div", "span"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    Modal,
    Tooltip,
    Guide,
    Tour,
    Consent,
    Ad,
    None,
    #[default]
    #[serde(other)]
    Unknown,
}

impl VerdictKind {
    fn parse(raw: &str) -> Self {
        serde_json::from_value(Value::String(raw.trim().to_ascii_lowercase()))
            .unwrap_or(VerdictKind::Unknown)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VerdictElement {
    pub selector: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
}

/// Validated oracle answer. Every field is always populated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OracleVerdict {
    pub has_popup: bool,
    pub selectors: Vec<String>,
    pub multi_click: bool,
    pub steps: u32,
    #[serde(rename = "type")]
    pub kind: VerdictKind,
    pub confidence: f64,
    pub reason: String,
    pub elements: Vec<VerdictElement>,
}

impl OracleVerdict {
    /// Safe "nothing found" answer used whenever a response cannot be salvaged.
    pub fn fallback() -> Self {
        Self {
            has_popup: false,
            selectors: Vec::new(),
            multi_click: false,
            steps: 0,
            kind: VerdictKind::None,
            confidence: 0.0,
            reason: "Analysis failed, using fallback".to_string(),
            elements: Vec::new(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        *self == Self::fallback()
    }

    /// Whether the verdict gives the executor anything to try.
    pub fn is_actionable(&self) -> bool {
        self.has_popup && !self.selectors.is_empty()
    }

    /// Fills missing fields, prepends `priority` selectors for popups and drops
    /// implausible candidates, keeping at most [`MAX_VERDICT_SELECTORS`].
    pub fn from_value(value: &Value, priority: &[String]) -> Self {
        let raw_selectors: Vec<String> = value
            .get("selectors")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let has_popup = value
            .get("has_popup")
            .and_then(as_bool)
            .unwrap_or(!raw_selectors.is_empty());
        let confidence = value
            .get("confidence")
            .and_then(as_f64)
            .unwrap_or(if raw_selectors.is_empty() { 0.0 } else { 0.5 })
            .clamp(0.0, 1.0);
        let multi_click = value
            .get("multi_click")
            .and_then(as_bool)
            .unwrap_or(raw_selectors.len() > 1);
        let steps = value
            .get("steps")
            .and_then(as_u32)
            .unwrap_or(raw_selectors.len() as u32);
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .map(VerdictKind::parse)
            .unwrap_or_default();
        let reason = value
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("AI analysis")
            .to_string();
        let elements = value
            .get("elements")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        let mut selectors: Vec<String> = Vec::new();
        if has_popup {
            for selector in priority {
                if !raw_selectors.contains(selector) && !selectors.contains(selector) {
                    selectors.push(selector.clone());
                }
            }
        }
        selectors.extend(raw_selectors);
        let before = selectors.len();
        selectors.retain(|selector| is_plausible_selector(selector));
        if selectors.len() < before {
            debug!(dropped = before - selectors.len(), "dropped implausible oracle selectors");
        }
        selectors.truncate(MAX_VERDICT_SELECTORS);

        Self {
            has_popup,
            selectors,
            multi_click,
            steps,
            kind,
            confidence,
            reason,
            elements,
        }
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    as_f64(value)
        .filter(|n| *n >= 0.0)
        .map(|n| n.round().min(f64::from(u32::MAX)) as u32)
}

/// Rejects loading placeholders and strings with no CSS targeting at all.
pub fn is_plausible_selector(selector: &str) -> bool {
    let trimmed = selector.trim();
    if trimmed.is_empty() {
        return false;
    }
    let lowered = trimmed.to_ascii_lowercase();
    if PLACEHOLDER_FRAGMENTS
        .iter()
        .any(|fragment| lowered.contains(fragment))
    {
        return false;
    }
    TARGETING_TOKENS.iter().any(|token| trimmed.contains(token))
}

/// Recovers and validates an oracle response; never fails.
pub fn parse_verdict(raw: &str, priority: &[String]) -> OracleVerdict {
    match recover_json(raw) {
        Some(value) => OracleVerdict::from_value(&value, priority),
        None => {
            warn!(
                response_len = raw.len(),
                "oracle response unrecoverable; using fallback verdict"
            );
            OracleVerdict::fallback()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tour_priority() -> Vec<String> {
        vec![
            "button:has-text(\"Next\")".to_string(),
            "button:has-text(\"Got it\")".to_string(),
        ]
    }

    #[test]
    fn scenario_fragment_yields_popup_without_selectors() {
        let verdict = parse_verdict("```json {has_popup: true ``` ", &[]);
        assert!(verdict.has_popup);
        assert!(verdict.selectors.is_empty());
        assert!(!verdict.is_actionable());
        assert_eq!(verdict.kind, VerdictKind::Unknown);
        assert_eq!(verdict.reason, "AI analysis");
    }

    #[test]
    fn unrecoverable_text_is_fallback() {
        let verdict = parse_verdict("model overloaded, try later", &tour_priority());
        assert!(verdict.is_fallback());
        assert!(!verdict.has_popup);
    }

    #[test]
    fn missing_fields_are_derived_from_selectors() {
        let verdict = OracleVerdict::from_value(&json!({ "selectors": ["#a", ".b"] }), &[]);
        assert!(verdict.has_popup);
        assert!(verdict.multi_click);
        assert_eq!(verdict.steps, 2);
        assert!((verdict.confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn priority_selectors_lead_for_popups_only() {
        let value = json!({ "has_popup": true, "selectors": ["button:has-text(\"Got it\")", "svg.close"] });
        let verdict = OracleVerdict::from_value(&value, &tour_priority());
        assert_eq!(
            verdict.selectors,
            vec![
                "button:has-text(\"Next\")",
                "button:has-text(\"Got it\")",
                "svg.close"
            ]
        );

        let value = json!({ "has_popup": false, "selectors": [] });
        let verdict = OracleVerdict::from_value(&value, &tour_priority());
        assert!(verdict.selectors.is_empty());
    }

    #[test]
    fn implausible_selectors_are_dropped_and_capped() {
        let value = json!({
            "has_popup": true,
            "selectors": ["Close", "div.skeleton-card", ".spinner", "#a", "#b", "#c", "#d", "#e", "#f"],
            "confidence": "1.7",
            "steps": "3",
            "type": "Consent"
        });
        let verdict = OracleVerdict::from_value(&value, &[]);
        assert_eq!(verdict.selectors, vec!["#a", "#b", "#c", "#d", "#e"]);
        assert!((verdict.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(verdict.steps, 3);
        assert_eq!(verdict.kind, VerdictKind::Consent);
    }

    #[test]
    fn elements_tolerate_partial_entries() {
        let value = json!({
            "has_popup": true,
            "selectors": ["button.close"],
            "elements": [{ "selector": "button.close", "type": "button" }, { "text": "no selector" }]
        });
        let verdict = OracleVerdict::from_value(&value, &[]);
        assert_eq!(verdict.elements.len(), 1);
        assert_eq!(verdict.elements[0].kind.as_deref(), Some("button"));
    }
}
