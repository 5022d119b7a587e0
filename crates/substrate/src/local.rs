use db::{open_ledger, DbError, OneShotRecord, OneShotRepository, RunRecord, RunRepository};
use events::{Event, EventBus, EventEnvelope};
use migrator_core::RunRequest;
use orchestrator::{DurableContext, Workflow};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SubstrateConfig;
use crate::context::LocalContext;
use crate::error::{child_claim_failure, claim_failure, ledger_failure, Result, SubstrateError};
use crate::retry::retry_with;

/// Durable substrate backed by the SQLite ledger, executing runs in-process.
///
/// Submitting a run id that already exists resumes it: recorded one-shot
/// results are replayed and completed child invocations are skipped.
/// Top-level runs execute once per submission; child invocations are retried
/// according to [`SubstrateConfig::retry`].
///
/// A run id is executed by at most one caller at a time. Entering a run that
/// is already executing fails with [`SubstrateError::RunInProgress`], whether
/// the other execution lives in this process or in another one sharing the
/// ledger. A run left `running` by a worker that died must be released with
/// [`LocalSubstrate::take_over`] before it can be resubmitted.
#[derive(Clone)]
pub struct LocalSubstrate {
    workflow: Arc<dyn Workflow>,
    config: Arc<SubstrateConfig>,
    runs: RunRepository,
    one_shots: OneShotRepository,
    in_flight: InFlight,
    event_bus: Option<EventBus>,
}

/// Run ids executing in this process.
#[derive(Clone, Default)]
struct InFlight(Arc<Mutex<HashSet<String>>>);

impl InFlight {
    fn enter(&self, run_id: &str) -> Option<InFlightGuard> {
        let mut ids = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if !ids.insert(run_id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            ids: Arc::clone(&self.0),
            run_id: run_id.to_string(),
        })
    }

    fn contains(&self, run_id: &str) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(run_id)
    }
}

struct InFlightGuard {
    ids: Arc<Mutex<HashSet<String>>>,
    run_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.run_id);
    }
}

/// Ledger view of one run.
#[derive(Debug, Clone)]
pub struct RunHistory {
    pub run: RunRecord,
    pub children: Vec<RunRecord>,
    pub one_shots: Vec<OneShotRecord>,
}

/// A run executing in the background.
pub struct RunHandle {
    run_id: String,
    cancellation: CancellationToken,
    join: JoinHandle<Result<()>>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Request cancellation. The run observes it at its next checkpoint.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub async fn join(self) -> Result<()> {
        self.join.await?
    }
}

impl LocalSubstrate {
    pub fn new(pool: SqlitePool, workflow: Arc<dyn Workflow>, config: SubstrateConfig) -> Self {
        Self {
            workflow,
            config: Arc::new(config),
            runs: RunRepository::new(pool.clone()),
            one_shots: OneShotRepository::new(pool),
            in_flight: InFlight::default(),
            event_bus: None,
        }
    }

    /// Open the ledger named by `config.database_url` and build a substrate on it.
    pub async fn connect(config: SubstrateConfig, workflow: Arc<dyn Workflow>) -> Result<Self> {
        let pool = open_ledger(&config.database_url).await?;
        info!(
            workflow = %workflow.name(),
            task_queue = %config.task_queue,
            namespace = %config.namespace,
            target_host = %config.target_host,
            build_id = ?config.build_id,
            "Local substrate connected"
        );
        Ok(Self::new(pool, workflow, config))
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn config(&self) -> &SubstrateConfig {
        &self.config
    }

    pub(crate) fn one_shots(&self) -> &OneShotRepository {
        &self.one_shots
    }

    /// Fresh run id of the form `{workflow}-{uuid}`.
    pub fn new_run_id(&self) -> String {
        format!("{}-{}", self.workflow.name(), Uuid::new_v4())
    }

    /// Execute or resume `run_id` and wait for it to finish.
    pub async fn execute(&self, run_id: &str, request: RunRequest) -> Result<()> {
        self.execute_with_cancellation(run_id, request, CancellationToken::new())
            .await
    }

    pub async fn execute_with_cancellation(
        &self,
        run_id: &str,
        request: RunRequest,
        cancellation: CancellationToken,
    ) -> Result<()> {
        info!(run_id = %run_id, kind = %request.kind, "Submitting run");
        let (_guard, record) = self
            .claim(run_id, None, &request)
            .await
            .map_err(claim_failure)?;
        self.attempt(run_id, None, request, cancellation, record.attempts)
            .await?;
        Ok(())
    }

    /// Release `run_id` and its child invocations from a worker that stopped
    /// without finishing them, so the run can be resubmitted.
    ///
    /// Records still marked `running` are marked failed. Runs executing in
    /// this process cannot be taken over. Returns how many records were
    /// released.
    pub async fn take_over(&self, run_id: &str) -> Result<u64> {
        if self.in_flight.contains(run_id) {
            return Err(SubstrateError::RunInProgress(run_id.to_string()));
        }
        let released = self
            .runs
            .abandon(run_id, "abandoned by its worker")
            .await?;
        warn!(run_id = %run_id, released, "Took over run");
        Ok(released)
    }

    /// Execute or resume `run_id` on a background task.
    pub fn start(&self, run_id: impl Into<String>, request: RunRequest) -> RunHandle {
        let run_id = run_id.into();
        let cancellation = CancellationToken::new();
        let substrate = self.clone();
        let task_run_id = run_id.clone();
        let task_token = cancellation.clone();

        let join = tokio::spawn(async move {
            substrate
                .execute_with_cancellation(&task_run_id, request, task_token)
                .await
        });

        RunHandle {
            run_id,
            cancellation,
            join,
        }
    }

    pub async fn history(&self, run_id: &str) -> Result<RunHistory> {
        let run = self
            .runs
            .find(run_id)
            .await?
            .ok_or_else(|| SubstrateError::RunNotFound(run_id.to_string()))?;
        let children = self.runs.find_children(run_id).await?;
        let one_shots = self.one_shots.find_by_run(run_id).await?;

        Ok(RunHistory {
            run,
            children,
            one_shots,
        })
    }

    /// Top-level runs, newest first.
    pub async fn runs(&self) -> Result<Vec<RunRecord>> {
        Ok(self.runs.find_roots().await?)
    }

    pub(crate) async fn run_child(
        &self,
        parent_run_id: &str,
        invocation_id: &str,
        request: RunRequest,
        parent_cancellation: &CancellationToken,
    ) -> orchestrator::Result<()> {
        let existing = self.runs.find(invocation_id).await.map_err(ledger_failure)?;
        if existing.as_ref().is_some_and(RunRecord::is_completed) {
            debug!(
                run_id = %parent_run_id,
                invocation_id = %invocation_id,
                "Child invocation already completed, skipping"
            );
            self.emit_event(Event::InvocationReplayed {
                run_id: invocation_id.to_string(),
            });
            return Ok(());
        }

        let cancellation = parent_cancellation.child_token();
        retry_with(
            &self.config.retry,
            invocation_id,
            &cancellation,
            |attempt, delay| self.emit_retry(invocation_id, attempt, delay),
            |_| self.child_attempt(parent_run_id, invocation_id, request.clone(), cancellation.clone()),
        )
        .await
    }

    async fn child_attempt(
        &self,
        parent_run_id: &str,
        invocation_id: &str,
        request: RunRequest,
        cancellation: CancellationToken,
    ) -> orchestrator::Result<()> {
        let (_guard, record) = self
            .claim(invocation_id, Some(parent_run_id), &request)
            .await
            .map_err(child_claim_failure)?;
        self.attempt(
            invocation_id,
            Some(parent_run_id),
            request,
            cancellation,
            record.attempts,
        )
        .await
    }

    /// Take exclusive ownership of `run_id` for one attempt. The run stays
    /// claimed in this process until the guard is dropped.
    async fn claim(
        &self,
        run_id: &str,
        parent_run_id: Option<&str>,
        request: &RunRequest,
    ) -> std::result::Result<(InFlightGuard, RunRecord), DbError> {
        let Some(guard) = self.in_flight.enter(run_id) else {
            warn!(run_id = %run_id, "Run is already executing in this process");
            return Err(DbError::RunInProgress(run_id.to_string()));
        };
        match self.runs.begin_attempt(run_id, parent_run_id, request).await {
            Ok(record) => Ok((guard, record)),
            Err(e) => {
                if matches!(e, DbError::RunInProgress(_)) {
                    warn!(run_id = %run_id, "Run is marked running in the ledger");
                }
                Err(e)
            }
        }
    }

    /// One attempt of a claimed run or child invocation, bracketed by ledger
    /// updates.
    async fn attempt(
        &self,
        run_id: &str,
        parent_run_id: Option<&str>,
        request: RunRequest,
        cancellation: CancellationToken,
        attempt: i64,
    ) -> orchestrator::Result<()> {
        self.emit_event(Event::RunStarted {
            run_id: run_id.to_string(),
            parent_run_id: parent_run_id.map(str::to_string),
            kind: request.kind.clone(),
            attempt,
        });

        let ctx: Arc<dyn DurableContext> =
            Arc::new(LocalContext::new(self.clone(), run_id, cancellation));
        let outcome = self.workflow.run(ctx, request).await;

        match &outcome {
            Ok(()) => {
                self.runs
                    .mark_completed(run_id)
                    .await
                    .map_err(ledger_failure)?;
                self.emit_event(Event::RunCompleted {
                    run_id: run_id.to_string(),
                });
            }
            Err(e) => {
                warn!(run_id = %run_id, attempt, error = %e, "Run attempt failed");
                if let Err(ledger_error) = self.runs.mark_failed(run_id, &e.to_string()).await {
                    error!(
                        run_id = %run_id,
                        error = %ledger_error,
                        "Failed to record run failure in the ledger"
                    );
                    self.emit_event(Event::Error {
                        message: ledger_error.to_string(),
                        context: Some(format!("recording failure of run {run_id}")),
                    });
                }
                self.emit_event(Event::RunFailed {
                    run_id: run_id.to_string(),
                    error: e.to_string(),
                    retryable: e.is_retryable(),
                });
            }
        }

        outcome
    }

    pub(crate) fn emit_event(&self, event: Event) {
        if let Some(ref bus) = self.event_bus {
            bus.publish(EventEnvelope::new(event));
        }
    }

    pub(crate) fn emit_retry(&self, run_id: &str, attempt: u32, delay: Duration) {
        self.emit_event(Event::InvocationRetrying {
            run_id: run_id.to_string(),
            attempt,
            delay_ms: delay.as_millis() as u64,
        });
    }
}

impl std::fmt::Debug for LocalSubstrate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSubstrate")
            .field("workflow", &self.workflow.name())
            .field("config", &self.config)
            .field("event_bus", &self.event_bus)
            .finish()
    }
}
