use async_trait::async_trait;
use events::Event;
use migrator_core::RunRequest;
use orchestrator::{DurableContext, OneShotCall, OneShotOptions, OrchestratorError, Result};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ledger_failure;
use crate::local::LocalSubstrate;
use crate::retry::retry_with;

/// [`DurableContext`] of one run or child invocation on the local substrate.
pub(crate) struct LocalContext {
    substrate: LocalSubstrate,
    run_id: String,
    cancellation: CancellationToken,
}

impl LocalContext {
    pub(crate) fn new(
        substrate: LocalSubstrate,
        run_id: impl Into<String>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            substrate,
            run_id: run_id.into(),
            cancellation,
        }
    }
}

#[async_trait]
impl DurableContext for LocalContext {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    async fn execute_once(&self, options: OneShotOptions, call: OneShotCall) -> Result<Value> {
        let one_shots = self.substrate.one_shots();

        if let Some(recorded) = one_shots
            .find(&self.run_id, &options.call_id)
            .await
            .map_err(ledger_failure)?
        {
            debug!(run_id = %self.run_id, call_id = %options.call_id, "Replaying recorded one-shot result");
            self.substrate.emit_event(Event::OneShotReplayed {
                run_id: self.run_id.clone(),
                call_id: options.call_id.clone(),
            });
            return Ok(recorded);
        }

        let timeout = options.timeout;
        let call_id = options.call_id.as_str();
        let value = retry_with(
            &self.substrate.config().retry,
            call_id,
            &self.cancellation,
            |attempt, delay| self.substrate.emit_retry(call_id, attempt, delay),
            |_| {
                let call = call.clone();
                async move {
                    match tokio::time::timeout(timeout, call()).await {
                        Ok(result) => result,
                        Err(_) => Err(OrchestratorError::Timeout {
                            call_id: call_id.to_string(),
                            timeout,
                        }),
                    }
                }
            },
        )
        .await?;

        let stored = one_shots
            .record(&self.run_id, call_id, &value)
            .await
            .map_err(ledger_failure)?;
        debug!(run_id = %self.run_id, call_id = %call_id, "Recorded one-shot result");
        self.substrate.emit_event(Event::OneShotRecorded {
            run_id: self.run_id.clone(),
            call_id: call_id.to_string(),
        });

        Ok(stored)
    }

    async fn execute_child(&self, invocation_id: &str, request: RunRequest) -> Result<()> {
        self.substrate
            .run_child(&self.run_id, invocation_id, request, &self.cancellation)
            .await
    }
}
