//! The migration orchestrator.
//!
//! One workflow type serves both run kinds. A bootstrap run resolves the
//! catalog once through a recorded one-shot call, sequences it, and runs each
//! migration as an isolated child keyed by `{run_id}_{identity}`. A unit run
//! resolves one identity and executes it. Children run strictly one after the
//! other and the first failure stops the sequence.

use async_trait::async_trait;
use migrator_core::{MigrationId, RunKind, RunRequest};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::activities::discovery_activity;
use crate::catalog::{Catalog, Registry};
use crate::codec::IdentityCodec;
use crate::config::{EmptyCatalogPolicy, OrchestratorConfig};
use crate::error::{OrchestratorError, Result};
use crate::executor::UnitExecutor;
use crate::sequencer::VersionSequencer;
use crate::substrate::{DurableContext, OneShotOptions, Workflow};

pub const WORKFLOW_NAME: &str = "migration";

/// What a run has to do once its request is understood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    /// Run these migrations in order, each as its own child invocation.
    Sequence(Vec<MigrationId>),
    /// Run this one migration in the current invocation.
    Single(MigrationId),
}

pub struct MigrationWorkflow {
    registry: Arc<Registry>,
    config: OrchestratorConfig,
    codec: IdentityCodec,
}

impl MigrationWorkflow {
    pub fn new(registry: Arc<Registry>, config: OrchestratorConfig) -> Self {
        let codec = IdentityCodec::new(Arc::clone(&registry), config.scope.clone());
        Self {
            registry,
            config,
            codec,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn codec(&self) -> &IdentityCodec {
        &self.codec
    }

    /// Child invocation id of `identity` within `run_id`.
    pub fn unit_invocation_id(run_id: &str, identity: &MigrationId) -> String {
        format!("{}_{}", run_id, identity)
    }

    /// Call id of the recorded discovery result within `run_id`.
    pub fn discovery_call_id(run_id: &str) -> String {
        format!("{}_discovery", run_id)
    }

    /// Resolve the ordered catalog through the substrate's one-shot boundary.
    ///
    /// Discovery runs at most once per run; every resume reads the recorded
    /// list back instead of scanning again.
    pub async fn resolve_catalog(&self, ctx: &dyn DurableContext) -> Result<Vec<MigrationId>> {
        let options = OneShotOptions::new(
            Self::discovery_call_id(ctx.run_id()),
            self.config.discovery_timeout(),
        );
        let call = discovery_activity(
            Arc::clone(&self.registry),
            self.config.scope.clone(),
            VersionSequencer::new(self.config.tie_break),
        );

        let recorded = ctx.execute_once(options, call).await?;
        IdentityCodec::decode_list(recorded)
    }

    pub async fn plan(&self, ctx: &dyn DurableContext, request: &RunRequest) -> Result<WorkItem> {
        match request.run_kind()? {
            RunKind::Bootstrap => {
                if !request.targets.is_empty() {
                    return Err(OrchestratorError::InvalidRunRequest(
                        "bootstrap runs take no targets".to_string(),
                    ));
                }
                Ok(WorkItem::Sequence(self.resolve_catalog(ctx).await?))
            }
            RunKind::Unit => match request.targets.as_slice() {
                [identity] => Ok(WorkItem::Single(identity.clone())),
                targets => Err(OrchestratorError::InvalidRunRequest(format!(
                    "unit runs take exactly one target, got {}",
                    targets.len()
                ))),
            },
        }
    }

    pub async fn drive(&self, ctx: &dyn DurableContext, item: WorkItem) -> Result<()> {
        match item {
            WorkItem::Sequence(ordered) => self.run_sequence(ctx, &ordered).await,
            WorkItem::Single(identity) => self.run_single(ctx, &identity).await,
        }
    }

    async fn run_sequence(&self, ctx: &dyn DurableContext, ordered: &[MigrationId]) -> Result<()> {
        let run_id = ctx.run_id().to_string();
        info!(run_id = %run_id, migrations = ordered.len(), "Running migration sequence");

        for (position, identity) in ordered.iter().enumerate() {
            let invocation_id = Self::unit_invocation_id(&run_id, identity);
            debug!(
                run_id = %run_id,
                invocation_id = %invocation_id,
                position = position + 1,
                total = ordered.len(),
                "Submitting migration"
            );

            if let Err(e) = ctx
                .execute_child(&invocation_id, RunRequest::unit(identity.clone()))
                .await
            {
                error!(
                    run_id = %run_id,
                    identity = %identity,
                    error = %e,
                    "Migration sequence halted"
                );
                return Err(e);
            }
        }

        info!(run_id = %run_id, "Migration sequence completed");
        Ok(())
    }

    async fn run_single(&self, ctx: &dyn DurableContext, identity: &MigrationId) -> Result<()> {
        let cancellation = ctx.cancellation();
        if cancellation.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }

        let catalog = Catalog::discover(&self.registry, self.codec.scope()).catalog;
        if catalog.is_empty() {
            return match self.config.empty_catalog {
                EmptyCatalogPolicy::Warn => {
                    warn!(identity = %identity, "No migration was found for identity, catalog is empty");
                    Ok(())
                }
                EmptyCatalogPolicy::Fail => Err(OrchestratorError::EmptyCatalog(identity.clone())),
            };
        }

        let descriptor = IdentityCodec::resolve_in(&catalog, identity.as_str())?;
        UnitExecutor::execute(&descriptor, &cancellation).await
    }
}

#[async_trait]
impl Workflow for MigrationWorkflow {
    fn name(&self) -> &str {
        WORKFLOW_NAME
    }

    async fn run(&self, ctx: Arc<dyn DurableContext>, request: RunRequest) -> Result<()> {
        let span = info_span!("workflow", run_id = %ctx.run_id(), kind = %request.kind);

        async {
            if ctx.cancellation().is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }

            let item = self.plan(ctx.as_ref(), &request).await?;
            self.drive(ctx.as_ref(), item).await
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DiscoveryScope, StaticSource};
    use crate::sequencer::TieBreak;
    use crate::substrate::OneShotCall;
    use migrator_core::{ensure_not_cancelled, Migration, MigrationFactory, MigrationFault};
    use serde_json::Value;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    /// Minimal in-memory context: records one-shot results, remembers
    /// completed children and runs children inline through the same workflow.
    struct TestContext {
        run_id: String,
        token: CancellationToken,
        workflow: Arc<MigrationWorkflow>,
        state: Arc<Mutex<TestState>>,
    }

    #[derive(Default)]
    struct TestState {
        recorded: HashMap<String, Value>,
        one_shot_calls: usize,
        completed: HashSet<String>,
        submitted: Vec<String>,
    }

    impl TestContext {
        fn root(run_id: &str, workflow: Arc<MigrationWorkflow>, state: Arc<Mutex<TestState>>) -> Arc<Self> {
            Arc::new(Self {
                run_id: run_id.to_string(),
                token: CancellationToken::new(),
                workflow,
                state,
            })
        }
    }

    #[async_trait]
    impl DurableContext for TestContext {
        fn run_id(&self) -> &str {
            &self.run_id
        }

        fn cancellation(&self) -> CancellationToken {
            self.token.clone()
        }

        async fn execute_once(&self, options: OneShotOptions, call: OneShotCall) -> Result<Value> {
            let key = format!("{}/{}", self.run_id, options.call_id);
            let recorded = self.state.lock().unwrap().recorded.get(&key).cloned();
            if let Some(value) = recorded {
                return Ok(value);
            }
            let value = call().await?;
            let mut state = self.state.lock().unwrap();
            state.one_shot_calls += 1;
            Ok(state.recorded.entry(key).or_insert(value).clone())
        }

        async fn execute_child(&self, invocation_id: &str, request: RunRequest) -> Result<()> {
            {
                let mut state = self.state.lock().unwrap();
                state.submitted.push(invocation_id.to_string());
                if state.completed.contains(invocation_id) {
                    return Ok(());
                }
            }
            let child: Arc<dyn DurableContext> = Arc::new(TestContext {
                run_id: invocation_id.to_string(),
                token: self.token.child_token(),
                workflow: Arc::clone(&self.workflow),
                state: Arc::clone(&self.state),
            });
            self.workflow.run(child, request).await?;
            self.state
                .lock()
                .unwrap()
                .completed
                .insert(invocation_id.to_string());
            Ok(())
        }
    }

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        failures_left: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Migration for Recorder {
        async fn execute(&self, cancellation: &CancellationToken) -> std::result::Result<(), MigrationFault> {
            ensure_not_cancelled(cancellation)?;
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(MigrationFault::failed(format!("{} exploded", self.name)));
            }
            self.log.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    fn recorder(
        name: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
        failures: &Arc<AtomicUsize>,
    ) -> MigrationFactory {
        let log = Arc::clone(log);
        let failures = Arc::clone(failures);
        Arc::new(move || -> Box<dyn Migration> {
            Box::new(Recorder {
                name,
                log: Arc::clone(&log),
                failures_left: Arc::clone(&failures),
            })
        })
    }

    struct Fixture {
        workflow: Arc<MigrationWorkflow>,
        state: Arc<Mutex<TestState>>,
        log: Arc<Mutex<Vec<&'static str>>>,
        b_failures: Arc<AtomicUsize>,
    }

    fn fixture(config: OrchestratorConfig) -> Fixture {
        let log = Arc::new(Mutex::new(Vec::new()));
        let never = Arc::new(AtomicUsize::new(0));
        let b_failures = Arc::new(AtomicUsize::new(0));
        let registry = Registry::new().with_source(
            StaticSource::new("app")
                .migration("app::B", 2, recorder("B", &log, &b_failures))
                .migration("app::A", 1, recorder("A", &log, &never))
                .migration("app::C", 3, recorder("C", &log, &never)),
        );
        Fixture {
            workflow: Arc::new(MigrationWorkflow::new(Arc::new(registry), config)),
            state: Arc::new(Mutex::new(TestState::default())),
            log,
            b_failures,
        }
    }

    impl Fixture {
        async fn run(&self, run_id: &str, request: RunRequest) -> Result<()> {
            let ctx = TestContext::root(run_id, Arc::clone(&self.workflow), Arc::clone(&self.state));
            self.workflow.run(ctx, request).await
        }

        fn log(&self) -> Vec<&'static str> {
            self.log.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn test_bootstrap_runs_in_version_order() {
        let fx = fixture(OrchestratorConfig::default());
        fx.run("R", RunRequest::bootstrap()).await.unwrap();

        assert_eq!(fx.log(), vec!["A", "B", "C"]);
        let state = fx.state.lock().unwrap();
        assert_eq!(state.submitted, vec!["R_app::A", "R_app::B", "R_app::C"]);
        assert_eq!(state.one_shot_calls, 1);
    }

    #[tokio::test]
    async fn test_failure_halts_and_resume_continues() {
        let fx = fixture(OrchestratorConfig::default());
        fx.b_failures.store(1, Ordering::SeqCst);

        let err = fx.run("R", RunRequest::bootstrap()).await.unwrap_err();
        assert!(matches!(&err, OrchestratorError::UnitExecution { identity, .. } if identity.as_str() == "app::B"));
        assert_eq!(fx.log(), vec!["A"]);

        fx.run("R", RunRequest::bootstrap()).await.unwrap();
        assert_eq!(fx.log(), vec!["A", "B", "C"]);
        assert_eq!(fx.state.lock().unwrap().one_shot_calls, 1);
    }

    #[tokio::test]
    async fn test_unit_run_executes_one_migration() {
        let fx = fixture(OrchestratorConfig::default());
        fx.run("U", RunRequest::unit("app::C")).await.unwrap();
        assert_eq!(fx.log(), vec!["C"]);
    }

    #[tokio::test]
    async fn test_unit_run_with_unknown_identity() {
        let fx = fixture(OrchestratorConfig::default());
        let err = fx.run("U", RunRequest::unit("app::Z")).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::IdentityResolution(id) if id == "app::Z"));
        assert!(fx.log().is_empty());
    }

    #[tokio::test]
    async fn test_unit_run_on_empty_catalog_warns() {
        let fx = fixture(OrchestratorConfig::default().with_scope(DiscoveryScope::only(["nothing"])));
        fx.run("U", RunRequest::unit("app::A")).await.unwrap();
        assert!(fx.log().is_empty());
    }

    #[tokio::test]
    async fn test_unit_run_on_empty_catalog_can_fail() {
        let fx = fixture(
            OrchestratorConfig::default()
                .with_scope(DiscoveryScope::only(["nothing"]))
                .with_empty_catalog(EmptyCatalogPolicy::Fail),
        );
        let err = fx.run("U", RunRequest::unit("app::A")).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::EmptyCatalog(_)));
    }

    #[tokio::test]
    async fn test_invalid_kind_is_rejected() {
        let fx = fixture(OrchestratorConfig::default());
        let request = RunRequest {
            kind: "rollback".to_string(),
            targets: Vec::new(),
        };
        let err = fx.run("R", request).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidRunKind(kind) if kind == "rollback"));
        assert_eq!(fx.state.lock().unwrap().one_shot_calls, 0);
    }

    #[tokio::test]
    async fn test_malformed_requests() {
        let fx = fixture(OrchestratorConfig::default());

        let unit_without_target = RunRequest {
            kind: "unit".to_string(),
            targets: Vec::new(),
        };
        assert!(matches!(
            fx.run("U", unit_without_target).await,
            Err(OrchestratorError::InvalidRunRequest(_))
        ));

        let bootstrap_with_target = RunRequest {
            kind: "bootstrap".to_string(),
            targets: vec![MigrationId::from("app::A")],
        };
        assert!(matches!(
            fx.run("R", bootstrap_with_target).await,
            Err(OrchestratorError::InvalidRunRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_reject_tie_break_fails_bootstrap() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let never = Arc::new(AtomicUsize::new(0));
        let registry = Registry::new().with_source(
            StaticSource::new("app")
                .migration("app::X", 1, recorder("X", &log, &never))
                .migration("app::Y", 1, recorder("Y", &log, &never)),
        );
        let workflow = Arc::new(MigrationWorkflow::new(
            Arc::new(registry),
            OrchestratorConfig::default().with_tie_break(TieBreak::Reject),
        ));
        let state = Arc::new(Mutex::new(TestState::default()));
        let ctx = TestContext::root("R", Arc::clone(&workflow), state);

        let err = workflow.run(ctx, RunRequest::bootstrap()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateVersion { .. }));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_does_nothing() {
        let fx = fixture(OrchestratorConfig::default());
        let ctx = TestContext::root("R", Arc::clone(&fx.workflow), Arc::clone(&fx.state));
        ctx.token.cancel();

        let err = fx.workflow.run(ctx, RunRequest::bootstrap()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Cancelled));
        assert!(fx.log().is_empty());
        assert_eq!(fx.state.lock().unwrap().one_shot_calls, 0);
    }

    #[test]
    fn test_invocation_ids() {
        assert_eq!(
            MigrationWorkflow::unit_invocation_id("R", &MigrationId::from("app::A")),
            "R_app::A"
        );
        assert_eq!(MigrationWorkflow::discovery_call_id("R"), "R_discovery");
    }
}
