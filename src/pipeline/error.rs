// Pipeline errors and the reportable error taxonomy

use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::Phase;
use crate::backend::BackendError;
use crate::store::StoreError;

/// Error category recorded on a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ContractViolation,
    BackendTimeout,
    BackendUnavailable,
    InvalidInput,
    Store,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContractViolation => "contract_violation",
            Self::BackendTimeout => "backend_timeout",
            Self::BackendUnavailable => "backend_unavailable",
            Self::InvalidInput => "invalid_input",
            Self::Store => "store",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The backend answered, but not in the shape the phase requires
    #[error("{phase}: contract violation: {reason}")]
    ContractViolation { phase: Phase, reason: String },

    #[error("{phase}: backend call failed: {source}")]
    Backend {
        phase: Phase,
        #[source]
        source: BackendError,
    },

    #[error("{phase}: invalid input: {reason}")]
    InvalidInput { phase: Phase, reason: String },

    #[error("{phase}: artifact store error: {source}")]
    Store {
        phase: Phase,
        #[source]
        source: StoreError,
    },

    #[error("run cancelled before {phase}")]
    Cancelled { phase: Phase },
}

impl PipelineError {
    pub fn contract(phase: Phase, reason: impl Into<String>) -> Self {
        Self::ContractViolation {
            phase,
            reason: reason.into(),
        }
    }

    pub fn invalid_input(phase: Phase, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            phase,
            reason: reason.into(),
        }
    }

    /// Backend failures, with schema mismatches reported as contract violations.
    pub fn backend(phase: Phase, source: BackendError) -> Self {
        match source {
            BackendError::SchemaMismatch(reason) => Self::ContractViolation {
                phase,
                reason: format!("reply does not match the requested schema: {}", reason),
            },
            source => Self::Backend { phase, source },
        }
    }

    pub fn store(phase: Phase, source: StoreError) -> Self {
        Self::Store { phase, source }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Self::ContractViolation { phase, .. }
            | Self::Backend { phase, .. }
            | Self::InvalidInput { phase, .. }
            | Self::Store { phase, .. }
            | Self::Cancelled { phase } => *phase,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ContractViolation { .. } => ErrorKind::ContractViolation,
            Self::Backend { source, .. } => match source {
                BackendError::Timeout(_) => ErrorKind::BackendTimeout,
                BackendError::Unavailable { .. } => ErrorKind::BackendUnavailable,
                BackendError::SchemaMismatch(_) => ErrorKind::ContractViolation,
            },
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::Store { .. } => ErrorKind::Store,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_schema_mismatch_becomes_contract_violation() {
        let err = PipelineError::backend(Phase::Retriever, BackendError::SchemaMismatch("x".into()));
        assert_eq!(err.kind(), ErrorKind::ContractViolation);
        assert_eq!(err.phase(), Phase::Retriever);
    }

    #[test]
    fn test_backend_kinds() {
        let timeout = PipelineError::backend(Phase::Visualizer, BackendError::Timeout(Duration::from_secs(1)));
        assert_eq!(timeout.kind(), ErrorKind::BackendTimeout);
        let down = PipelineError::backend(Phase::Critic, BackendError::unavailable("503"));
        assert_eq!(down.kind(), ErrorKind::BackendUnavailable);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::ContractViolation).unwrap(),
            "\"contract_violation\""
        );
    }
}
