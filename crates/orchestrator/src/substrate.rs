//! Seam between the orchestrator and the durable execution substrate.
//!
//! The substrate owns checkpointing, replay and retries. The orchestrator only
//! sees a [`DurableContext`] and exposes itself as a [`Workflow`].

use async_trait::async_trait;
use futures::future::BoxFuture;
use migrator_core::RunRequest;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Body of a one-shot call. It may be invoked more than once if an attempt
/// fails or times out, but its result is recorded only once.
pub type OneShotCall = Arc<dyn Fn() -> BoxFuture<'static, Result<Value>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneShotOptions {
    /// Key of the recorded result within the run.
    pub call_id: String,
    /// Limit for a single attempt.
    pub timeout: Duration,
}

impl OneShotOptions {
    pub fn new(call_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            call_id: call_id.into(),
            timeout,
        }
    }
}

/// Replay-consistent execution context of one run.
#[async_trait]
pub trait DurableContext: Send + Sync {
    /// Identifier of the current run; stable across resumes.
    fn run_id(&self) -> &str;

    /// Token of the current run, propagated into every nested invocation.
    fn cancellation(&self) -> CancellationToken;

    /// Run `call` outside replay and record its result. Later calls with the
    /// same `call_id` in the same run return the recorded value unchanged.
    async fn execute_once(&self, options: OneShotOptions, call: OneShotCall) -> Result<Value>;

    /// Run an isolated nested invocation keyed by `invocation_id` and wait for
    /// it. An id that already completed is not executed again.
    async fn execute_child(&self, invocation_id: &str, request: RunRequest) -> Result<()>;
}

/// Entry point the substrate drives.
#[async_trait]
pub trait Workflow: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: Arc<dyn DurableContext>, request: RunRequest) -> Result<()>;
}
