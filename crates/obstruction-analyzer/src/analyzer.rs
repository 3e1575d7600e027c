use std::collections::BTreeSet;

use regex::Regex;

use crate::diagnosis::{Diagnosis, ObstructionKind, Recommendation};
use crate::patterns::{
    LAYER_PATTERNS, MULTI_STEP_PATTERNS, OVERLAY_PATTERNS, POINTER_BLOCKING, POPUP_PATTERNS,
};

const OVERLAY_WEIGHT: u32 = 40;
const POPUP_WEIGHT: u32 = 30;
const MULTI_STEP_WEIGHT: u32 = 20;
const POINTER_BLOCKING_WEIGHT: u32 = 30;

const IMMEDIATE_THRESHOLD: u32 = 80;
const STANDARD_THRESHOLD: u32 = 50;
const AI_THRESHOLD: u32 = 20;

fn any_match(patterns: &[Regex], markup: &str) -> bool {
    patterns.iter().any(|pattern| pattern.is_match(markup))
}

fn layer_count(markup: &str) -> usize {
    let mut layers = BTreeSet::new();
    for pattern in LAYER_PATTERNS.iter() {
        for found in pattern.find_iter(markup) {
            let normalized: String = found
                .as_str()
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_ascii_lowercase();
            layers.insert(normalized);
        }
    }
    layers.len()
}

/// Stateless classifier over markup text.
#[derive(Clone, Copy, Debug, Default)]
pub struct ObstructionAnalyzer;

impl ObstructionAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, markup: &str) -> Diagnosis {
        let mut diagnosis = Diagnosis::clear();

        if any_match(&OVERLAY_PATTERNS, markup) {
            diagnosis.has_overlay = true;
            diagnosis.kinds.push(ObstructionKind::Overlay);
            diagnosis.score += OVERLAY_WEIGHT;
        }
        if any_match(&POPUP_PATTERNS, markup) {
            diagnosis.has_popup = true;
            diagnosis.kinds.push(ObstructionKind::Modal);
            diagnosis.score += POPUP_WEIGHT;
        }
        if any_match(&MULTI_STEP_PATTERNS, markup) {
            diagnosis.is_multi_step = true;
            diagnosis.kinds.push(ObstructionKind::GuidedTour);
            diagnosis.score += MULTI_STEP_WEIGHT;
        }

        diagnosis.layer_count = layer_count(markup);

        if any_match(&POINTER_BLOCKING, markup) {
            diagnosis.pointer_blocking = true;
            diagnosis.score += POINTER_BLOCKING_WEIGHT;
            diagnosis.recommendations.push(Recommendation::ForceDismissal);
        }

        if diagnosis.score >= IMMEDIATE_THRESHOLD {
            diagnosis
                .recommendations
                .push(Recommendation::ImmediateDismissal);
        } else if diagnosis.score >= STANDARD_THRESHOLD {
            diagnosis
                .recommendations
                .push(Recommendation::StandardDismissal);
        } else if diagnosis.score >= AI_THRESHOLD {
            diagnosis.recommendations.push(Recommendation::AiAnalysis);
        }

        diagnosis.confidence = f64::from(diagnosis.score) / 100.0;
        diagnosis
    }
}

/// Shorthand for [`ObstructionAnalyzer::analyze`].
pub fn analyze(markup: &str) -> Diagnosis {
    ObstructionAnalyzer.analyze(markup)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_markup_has_no_signal() {
        let diagnosis = analyze("<html><body><p>Welcome</p></body></html>");
        assert_eq!(diagnosis, Diagnosis::clear());
        assert!(!diagnosis.is_obstructed());
    }

    #[test]
    fn overlay_alone_recommends_ai_analysis() {
        let diagnosis = analyze(r#"<div class="page modal-backdrop fade"></div>"#);
        assert!(diagnosis.has_overlay);
        assert!(!diagnosis.has_popup);
        // "backdrop" is also a tour-wrapper keyword.
        assert!(diagnosis.is_multi_step);
        assert_eq!(diagnosis.score, 60);
        assert_eq!(
            diagnosis.recommendations,
            vec![Recommendation::StandardDismissal]
        );
    }

    #[test]
    fn pointer_blocking_forces_and_tops_confidence() {
        let markup = r#"<div class="dialog-wrapper" style="pointer-events: none; z-index: 1000; position: fixed"><div class="m-popOver-wrapper"></div></div>"#;
        let diagnosis = analyze(markup);
        assert!(diagnosis.has_overlay && diagnosis.has_popup && diagnosis.is_multi_step);
        assert!(diagnosis.pointer_blocking);
        assert_eq!(diagnosis.score, 120);
        assert!((diagnosis.confidence - 1.2).abs() < f64::EPSILON);
        assert_eq!(diagnosis.layer_count, 2);
        assert_eq!(
            diagnosis.recommendations,
            vec![
                Recommendation::ForceDismissal,
                Recommendation::ImmediateDismissal
            ]
        );
        assert!(diagnosis.needs_force());
    }

    #[test]
    fn thresholds_are_inclusive() {
        // Popup (30) plus tour keyword (20) lands exactly on the standard threshold.
        let diagnosis = analyze(r#"<div id="welcome-popup">Next</div>"#);
        assert_eq!(diagnosis.score, 50);
        assert!(diagnosis.recommends(Recommendation::StandardDismissal));

        let diagnosis = analyze("<button>Continue</button>");
        assert_eq!(diagnosis.score, 20);
        assert!(diagnosis.recommends(Recommendation::AiAnalysis));
    }

    #[test]
    fn layer_count_dedupes_equivalent_declarations() {
        let markup = r#"<div style="z-index: 10"></div><div style="z-index:10"></div><div style="Z-INDEX: 20; position: absolute"></div><i style="position:absolute"></i>"#;
        assert_eq!(analyze(markup).layer_count, 3);
    }

    #[test]
    fn analysis_is_pure() {
        let markup = r#"<div class="overlay" style="pointer-events:none"><button>Got it</button></div>"#;
        let first = serde_json::to_vec(&analyze(markup)).unwrap();
        let second = serde_json::to_vec(&ObstructionAnalyzer::new().analyze(markup)).unwrap();
        assert_eq!(first, second);
    }
}
