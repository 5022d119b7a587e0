use db::DbError;
use orchestrator::OrchestratorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubstrateError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] DbError),

    #[error(transparent)]
    Workflow(#[from] OrchestratorError),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Run already in progress: {0}")]
    RunInProgress(String),

    #[error("Run task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl SubstrateError {
    /// The workflow error that ended the run, if that is what happened.
    pub fn workflow_error(&self) -> Option<&OrchestratorError> {
        match self {
            Self::Workflow(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SubstrateError>;

/// Claim failures of a top-level run.
pub(crate) fn claim_failure(error: DbError) -> SubstrateError {
    match error {
        DbError::RunInProgress(run_id) => SubstrateError::RunInProgress(run_id),
        other => SubstrateError::Ledger(other),
    }
}

/// Claim failures of a child invocation. An invocation that is already
/// running is not retried.
pub(crate) fn child_claim_failure(error: DbError) -> OrchestratorError {
    match error {
        DbError::RunInProgress(run_id) => OrchestratorError::InvocationInProgress(run_id),
        other => ledger_failure(other),
    }
}

/// Ledger failures seen from inside a run surface as substrate errors of the
/// workflow, which makes them retryable.
pub(crate) fn ledger_failure(error: DbError) -> OrchestratorError {
    OrchestratorError::Substrate(error.to_string())
}
