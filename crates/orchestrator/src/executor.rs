use migrator_core::{MigrationDescriptor, MigrationFault};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::error::{OrchestratorError, Result};

/// Runs the business logic of exactly one migration unit.
pub struct UnitExecutor;

impl UnitExecutor {
    pub async fn execute(
        descriptor: &MigrationDescriptor,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        if cancellation.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }

        let span = info_span!(
            "migration",
            unit = %descriptor.label(),
            identity = %descriptor.identity(),
            version = descriptor.version()
        );

        async {
            info!("Executing migration");
            let migration = descriptor.instantiate();

            match migration.execute(cancellation).await {
                Ok(()) => {
                    info!("Migration completed");
                    Ok(())
                }
                Err(MigrationFault::Cancelled) => {
                    warn!("Migration cancelled");
                    Err(OrchestratorError::Cancelled)
                }
                Err(MigrationFault::Failed(reason)) => {
                    error!(error = %reason, "Migration failed");
                    Err(OrchestratorError::unit_failed(
                        descriptor.identity().clone(),
                        reason,
                    ))
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use migrator_core::{ensure_not_cancelled, Migration};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        hits: Arc<AtomicUsize>,
        fail_with: Option<&'static str>,
    }

    #[async_trait]
    impl Migration for Counting {
        async fn execute(&self, cancellation: &CancellationToken) -> std::result::Result<(), MigrationFault> {
            ensure_not_cancelled(cancellation)?;
            self.hits.fetch_add(1, Ordering::SeqCst);
            match self.fail_with {
                Some(reason) => Err(MigrationFault::failed(reason)),
                None => Ok(()),
            }
        }
    }

    fn descriptor(hits: &Arc<AtomicUsize>, fail_with: Option<&'static str>) -> MigrationDescriptor {
        let hits = Arc::clone(hits);
        MigrationDescriptor::new(
            "app::Counting",
            1,
            Arc::new(move || -> Box<dyn Migration> {
                Box::new(Counting {
                    hits: Arc::clone(&hits),
                    fail_with,
                })
            }),
        )
    }

    #[tokio::test]
    async fn test_executes_unit() {
        let hits = Arc::new(AtomicUsize::new(0));
        UnitExecutor::execute(&descriptor(&hits, None), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_does_not_instantiate() {
        let hits = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();
        token.cancel();

        let err = UnitExecutor::execute(&descriptor(&hits, None), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Cancelled));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fault_is_attributed_to_unit() {
        let hits = Arc::new(AtomicUsize::new(0));
        let err = UnitExecutor::execute(&descriptor(&hits, Some("disk full")), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            OrchestratorError::UnitExecution { identity, reason } => {
                assert_eq!(identity.as_str(), "app::Counting");
                assert_eq!(reason, "disk full");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
