use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Fault reported by a migration unit.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MigrationFault {
    #[error("Migration cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

impl MigrationFault {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// A single versioned migration unit.
///
/// Implementations may run more than once (the substrate retries failed units),
/// so `execute` has to be idempotent. It should return
/// [`MigrationFault::Cancelled`] before doing any work when the token is
/// already cancelled; [`ensure_not_cancelled`] does exactly that.
#[async_trait]
pub trait Migration: Send + Sync {
    async fn execute(&self, cancellation: &CancellationToken) -> Result<(), MigrationFault>;
}

/// Constructor for a fresh migration unit.
pub type MigrationFactory = Arc<dyn Fn() -> Box<dyn Migration> + Send + Sync>;

/// Factory for a unit type that can be built with `Default`.
pub fn factory_of<M>() -> MigrationFactory
where
    M: Migration + Default + 'static,
{
    Arc::new(|| -> Box<dyn Migration> { Box::new(M::default()) })
}

pub fn ensure_not_cancelled(cancellation: &CancellationToken) -> Result<(), MigrationFault> {
    if cancellation.is_cancelled() {
        Err(MigrationFault::Cancelled)
    } else {
        Ok(())
    }
}
