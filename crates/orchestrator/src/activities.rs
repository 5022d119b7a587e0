//! One-shot calls made by the orchestrator.

use futures::FutureExt;
use migrator_core::MigrationId;
use std::sync::Arc;
use tracing::info;

use crate::catalog::{Catalog, DiscoveryScope, Registry};
use crate::codec::IdentityCodec;
use crate::error::{OrchestratorError, Result};
use crate::sequencer::VersionSequencer;
use crate::substrate::OneShotCall;

/// Discover and sequence the catalog, returning the ordered identities.
pub fn discover_ordered(
    registry: &Registry,
    scope: &DiscoveryScope,
    sequencer: VersionSequencer,
) -> Result<Vec<MigrationId>> {
    let report = Catalog::discover(registry, scope);
    let ordered = sequencer.sequence(&report.catalog)?;
    info!(
        migrations = ordered.len(),
        skipped = report.issues.len(),
        "Migration catalog resolved"
    );
    Ok(ordered)
}

/// The discovery call body handed to [`DurableContext::execute_once`].
///
/// [`DurableContext::execute_once`]: crate::substrate::DurableContext::execute_once
pub fn discovery_activity(
    registry: Arc<Registry>,
    scope: DiscoveryScope,
    sequencer: VersionSequencer,
) -> OneShotCall {
    Arc::new(move || {
        let registry = Arc::clone(&registry);
        let scope = scope.clone();
        async move {
            // Sources load synchronously; run them off the executor so the
            // caller's timeout can fire while a load hangs.
            let joined = tokio::task::spawn_blocking(move || {
                discover_ordered(&registry, &scope, sequencer)
                    .and_then(|ordered| IdentityCodec::encode_list(&ordered))
            })
            .await;
            match joined {
                Ok(result) => result,
                Err(e) => Err(OrchestratorError::Substrate(format!("discovery task failed: {e}"))),
            }
        }
        .boxed()
    })
}
