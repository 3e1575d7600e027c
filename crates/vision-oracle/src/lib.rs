//! Vision oracle boundary.
//!
//! An oracle receives a screenshot, a markup snippet and a prompt and answers
//! with text that is supposed to be JSON. Responses are routinely malformed, so
//! [`parse_verdict`] runs a recovery pass and falls back to a "no popup"
//! verdict instead of failing.

pub mod errors;
pub mod http;
pub mod oracle;
pub mod prompt;
pub mod recovery;
pub mod verdict;

#[cfg(any(test, feature = "fake"))]
pub mod fake;

pub use errors::OracleError;
pub use http::{HttpVisionOracle, OracleConfig};
pub use oracle::{OracleRequest, SharedOracle, VisionOracle};
pub use prompt::{PromptBuilder, PromptProfile, DEFAULT_SNIPPET_CHARS};
pub use recovery::{extract_json_object, recover_json};
pub use verdict::{
    is_plausible_selector, parse_verdict, OracleVerdict, VerdictElement, VerdictKind,
    MAX_VERDICT_SELECTORS,
};
