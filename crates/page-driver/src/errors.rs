use thiserror::Error;

/// Failures reported by a [`crate::PageDriver`].
///
/// Only [`DriverError::SessionClosed`] is fatal: the page or browser is gone and
/// no further resolution or dismissal work is possible. Everything else is a
/// transient condition that callers record and move past.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("page session closed: {0}")]
    SessionClosed(String),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("element not found: {0}")]
    NotFound(String),

    #[error("element detached: {0}")]
    Detached(String),

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("driver i/o failure: {0}")]
    Io(String),
}

impl DriverError {
    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        DriverError::Timeout {
            operation: operation.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Session loss is the only error that must reach the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverError::SessionClosed(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DriverError::Timeout { .. } | DriverError::Detached(_) | DriverError::Io(_)
        )
    }
}

/// Splits a driver result into the fatal outer layer and a recoverable inner one.
///
/// `recoverable(call.await)?` propagates session loss and hands back every
/// other outcome, error or not, for local handling.
pub fn recoverable<T>(result: Result<T, DriverError>) -> Result<Result<T, DriverError>, DriverError> {
    match result {
        Err(err) if err.is_fatal() => Err(err),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_session_loss_is_fatal() {
        assert!(DriverError::SessionClosed("gone".into()).is_fatal());
        assert!(!DriverError::NotFound("button.close".into()).is_fatal());
        assert!(!DriverError::timeout("click", std::time::Duration::from_secs(5)).is_fatal());
    }

    #[test]
    fn recoverable_keeps_transient_errors_inside() {
        let transient: Result<bool, _> = Err(DriverError::Detached("x".into()));
        assert!(matches!(recoverable(transient), Ok(Err(DriverError::Detached(_)))));

        let fatal: Result<bool, _> = Err(DriverError::SessionClosed("tab closed".into()));
        assert!(recoverable(fatal).is_err());

        assert_eq!(recoverable(Ok::<_, DriverError>(3)), Ok(Ok(3)));
    }

    #[test]
    fn timeout_message_names_operation() {
        let err = DriverError::timeout("wait_for .modal", std::time::Duration::from_millis(1500));
        assert_eq!(err.to_string(), "wait_for .modal timed out after 1500ms");
    }
}
