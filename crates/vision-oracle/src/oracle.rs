use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::OracleError;

/// Everything an oracle sees about the page.
#[derive(Clone, Debug, Default)]
pub struct OracleRequest {
    /// PNG bytes; empty when no capture is available.
    pub screenshot: Vec<u8>,
    pub markup_snippet: String,
    pub prompt: String,
}

impl OracleRequest {
    pub fn new(screenshot: Vec<u8>, markup_snippet: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            screenshot,
            markup_snippet: markup_snippet.into(),
            prompt: prompt.into(),
        }
    }
}

/// External service that proposes selectors from what the page looks like.
///
/// Implementations return the raw response text; callers run it through
/// [`crate::parse_verdict`].
#[async_trait]
pub trait VisionOracle: Send + Sync {
    fn name(&self) -> &str {
        "oracle"
    }

    async fn analyze(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

pub type SharedOracle = Arc<dyn VisionOracle>;
