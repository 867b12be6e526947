// Backend errors

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Service unreachable, overloaded, or returned a non-success status.
    #[error("backend unavailable: {reason}")]
    Unavailable { reason: String, retryable: bool },

    /// No response within the per-call deadline.
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),

    /// `reason` was asked for structured output and the reply did not parse.
    #[error("structured output did not match the requested schema: {0}")]
    SchemaMismatch(String),
}

impl BackendError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
            retryable: true,
        }
    }

    /// A rejection the service will repeat on every attempt (bad key, bad request).
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
            retryable: false,
        }
    }

    /// Transient failures are eligible for raw retries; schema mismatches never are.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable { retryable, .. } => *retryable,
            Self::Timeout(_) => true,
            Self::SchemaMismatch(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::unavailable("503").is_transient());
        assert!(BackendError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!BackendError::rejected("401").is_transient());
        assert!(!BackendError::SchemaMismatch("bad json".into()).is_transient());
    }
}
