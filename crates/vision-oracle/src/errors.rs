use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("oracle is not configured: {0}")]
    NotConfigured(String),

    #[error("oracle request failed: {0}")]
    Transport(String),

    #[error("oracle returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("oracle rate limited on all {keys} API keys")]
    RateLimited { keys: usize },

    #[error("oracle response missing content")]
    EmptyResponse,
}

impl OracleError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OracleError::Transport(_) | OracleError::RateLimited { .. }
        ) || matches!(self, OracleError::Status { status, .. } if *status >= 500)
    }
}
