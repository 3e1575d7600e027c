//! Obstruction analysis.
//!
//! [`ObstructionAnalyzer::analyze`] is a pure function of the markup it is
//! given: no live DOM access, no caching, identical input yields identical
//! output. [`ContextRules`] maps URLs to context tags and checks page markers.

pub mod analyzer;
pub mod context;
pub mod diagnosis;
mod patterns;

pub use analyzer::{analyze, ObstructionAnalyzer};
pub use context::{detect_context, ContextCheck, ContextRule, ContextRules, GENERIC_CONTEXT};
pub use diagnosis::{Diagnosis, ObstructionKind, Recommendation};
