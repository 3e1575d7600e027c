use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstructionKind {
    Overlay,
    Modal,
    GuidedTour,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    ForceDismissal,
    ImmediateDismissal,
    StandardDismissal,
    AiAnalysis,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::ForceDismissal => "force_dismissal",
            Recommendation::ImmediateDismissal => "immediate_dismissal",
            Recommendation::StandardDismissal => "standard_dismissal",
            Recommendation::AiAnalysis => "ai_analysis",
        }
    }
}

/// Structural reading of one markup snapshot. Never cached or persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub has_overlay: bool,
    pub has_popup: bool,
    pub is_multi_step: bool,
    /// Distinct z-index/position declarations; a coarse stacking-depth proxy.
    pub layer_count: usize,
    pub pointer_blocking: bool,
    pub kinds: Vec<ObstructionKind>,
    /// Sum of triggered weights in hundredths.
    pub score: u32,
    pub confidence: f64,
    pub recommendations: Vec<Recommendation>,
}

impl Diagnosis {
    pub fn clear() -> Self {
        Self {
            has_overlay: false,
            has_popup: false,
            is_multi_step: false,
            layer_count: 0,
            pointer_blocking: false,
            kinds: Vec::new(),
            score: 0,
            confidence: 0.0,
            recommendations: Vec::new(),
        }
    }

    /// Any overlay, popup or tour signal at all.
    pub fn has_any_signal(&self) -> bool {
        self.has_overlay || self.has_popup || self.is_multi_step
    }

    /// Something is physically in the way. Tour keywords alone do not count.
    pub fn is_obstructed(&self) -> bool {
        self.has_overlay || self.has_popup || self.pointer_blocking
    }

    /// Layered or pointer-blocking structures that plain clicks tend to miss.
    pub fn needs_force(&self) -> bool {
        self.layer_count > 1 || self.pointer_blocking
    }

    pub fn recommends(&self, recommendation: Recommendation) -> bool {
        self.recommendations.contains(&recommendation)
    }

    /// Stable identity of the obstruction shape, ignoring nothing but scoring.
    pub fn signature(&self) -> (bool, bool, bool, usize, bool) {
        (
            self.has_overlay,
            self.has_popup,
            self.is_multi_step,
            self.layer_count,
            self.pointer_blocking,
        )
    }
}
