use migrator_core::{CoreError, MigrationId};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid run kind: {0}")]
    InvalidRunKind(String),

    #[error("Invalid run request: {0}")]
    InvalidRunRequest(String),

    #[error("No migration registered for identity: {0}")]
    IdentityResolution(String),

    #[error("Migration {identity} failed: {reason}")]
    UnitExecution { identity: MigrationId, reason: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Duplicate migration version {version}: {first} and {second}")]
    DuplicateVersion {
        version: i64,
        first: MigrationId,
        second: MigrationId,
    },

    #[error("Catalog is empty, cannot run migration: {0}")]
    EmptyCatalog(MigrationId),

    #[error("One-shot call {call_id} timed out after {timeout:?}")]
    Timeout { call_id: String, timeout: Duration },

    #[error("Invocation already in progress: {0}")]
    InvocationInProgress(String),

    #[error("Substrate error: {0}")]
    Substrate(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrchestratorError {
    pub fn unit_failed(identity: MigrationId, reason: impl Into<String>) -> Self {
        Self::UnitExecution {
            identity,
            reason: reason.into(),
        }
    }

    /// Whether the substrate may retry the invocation that produced this error.
    ///
    /// Only unit faults and substrate-level failures are transient. Request,
    /// identity and sequencing errors fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UnitExecution { .. } | Self::Timeout { .. } | Self::Substrate(_)
        )
    }
}

impl From<CoreError> for OrchestratorError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::InvalidRunKind(kind) => Self::InvalidRunKind(kind),
            CoreError::Validation(reason) => Self::InvalidRunRequest(reason),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
