//! Release manager driving preview, apply, and destroy.
//!
//! Every operation creates a new release at the next revision, carrying the
//! state of the latest terminal release as its baseline, and persists the
//! release at each phase change. Operations on one key through the same
//! manager run one at a time, from reading the baseline to the final save. Backend failures end in a failed release
//! returned as `Ok`; only failures that prevent planning are returned as
//! errors, after the failed release has been saved.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::lifecycle::OperationType;
use super::types::{FailureRecord, FailureStage, Release, ReleaseKey, ReleasePhase};
use crate::error::{BackendError, KeelError, ReleaseError, Result};
use crate::generator::{GenerationContext, Pipeline};
use crate::planner::{DiffEngine, DriftReport, ExecutionResult, ExecutorOptions, Plan, PlanExecutor};
use crate::resource::{Resource, Spec, State};
use crate::runtime::RuntimeRegistry;
use crate::state::ReleaseStore;

/// Drives releases for one store and runtime registry.
pub struct ReleaseManager<'a, S: ReleaseStore> {
    /// Release store.
    store: &'a S,
    /// Runtime adapters.
    runtimes: &'a RuntimeRegistry,
    /// Diff engine.
    diff_engine: DiffEngine,
    /// Executor options.
    options: ExecutorOptions,
    /// One lock per release key.
    locks: Mutex<HashMap<ReleaseKey, Arc<Mutex<()>>>>,
}

/// Result of a release operation.
#[derive(Debug, Clone)]
pub struct ReleaseOutcome {
    /// The release in its terminal phase.
    pub release: Release,
    /// The plan that was computed.
    pub plan: Plan,
    /// Execution details for apply and destroy.
    pub execution: Option<ExecutionResult>,
    /// Drift found during a live preview.
    pub drift: Option<DriftReport>,
}

impl ReleaseOutcome {
    /// Returns true if the release succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.release.phase == ReleasePhase::Succeeded
    }
}

impl<'a, S: ReleaseStore> ReleaseManager<'a, S> {
    /// Creates a new release manager.
    #[must_use]
    pub fn new(store: &'a S, runtimes: &'a RuntimeRegistry) -> Self {
        Self {
            store,
            runtimes,
            diff_engine: DiffEngine::new(),
            options: ExecutorOptions::default(),
            locks: Mutex::default(),
        }
    }

    /// Sets the executor options.
    #[must_use]
    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the latest release that reached a terminal phase.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn last_terminal_release(&self, key: &ReleaseKey) -> Result<Option<Release>> {
        for revision in self.store.list_revisions(key).await?.into_iter().rev() {
            let release = self.store.get_release(key, revision).await?;
            if release.is_terminal() {
                return Ok(Some(release));
            }
            debug!("Ignoring unfinished release {revision} of {key}");
        }
        Ok(None)
    }

    /// Computes a plan without touching any backend.
    ///
    /// With `live` set, every baseline resource is read through its runtime
    /// and differences are reported as drift.
    ///
    /// # Errors
    ///
    /// Returns an error if generation, planning, or a live read fails.
    pub async fn preview(
        &self,
        key: &ReleaseKey,
        pipeline: &Pipeline,
        ctx: &GenerationContext<'_>,
        live: bool,
    ) -> Result<ReleaseOutcome> {
        let _guard = self.lock(key).await;
        let (revision, last) = self.allocate(key).await?;
        let mut release = self.begin(key, revision, last.as_ref(), OperationType::Preview).await?;
        let (spec, plan) = self.generate(&mut release, pipeline, ctx).await?;

        self.enter(&mut release, OperationType::Preview).await?;
        let baseline = release.state.clone();

        let drift = if live {
            match self.read_live(&baseline).await {
                Ok(observed) => Some(self.diff_engine.detect_drift(&baseline, &observed)),
                Err(e) => {
                    return Err(self.abort(&mut release, FailureStage::Preview, e.into()).await);
                }
            }
        } else {
            None
        };

        debug!("Previewed {} resources", spec.len());
        release.succeed(baseline)?;
        self.save(&release).await?;

        Ok(ReleaseOutcome {
            release,
            plan,
            execution: None,
            drift,
        })
    }

    /// Generates a spec and applies it.
    ///
    /// # Errors
    ///
    /// Returns an error if generation or planning fails or the store cannot
    /// be written. Backend failures produce a failed release instead.
    pub async fn apply(
        &self,
        key: &ReleaseKey,
        pipeline: &Pipeline,
        ctx: &GenerationContext<'_>,
        cancel: &CancellationToken,
    ) -> Result<ReleaseOutcome> {
        let _guard = self.lock(key).await;
        let (revision, last) = self.allocate(key).await?;
        let mut release = self.begin(key, revision, last.as_ref(), OperationType::Apply).await?;
        let (spec, plan) = self.generate(&mut release, pipeline, ctx).await?;

        self.enter(&mut release, OperationType::Apply).await?;
        self.execute(release, plan, &spec, cancel).await
    }

    /// Deletes every resource recorded by the latest terminal release.
    ///
    /// # Errors
    ///
    /// Returns `NoBaselineState` if the key has no terminal release, or an
    /// error if planning fails or the store cannot be written.
    pub async fn destroy(&self, key: &ReleaseKey, cancel: &CancellationToken) -> Result<ReleaseOutcome> {
        let _guard = self.lock(key).await;
        let (revision, last) = self.allocate(key).await?;
        let last = last.ok_or_else(|| ReleaseError::NoBaselineState { key: key.to_string() })?;

        let mut release = self.begin(key, revision, Some(&last), OperationType::Destroy).await?;
        if let Some(spec) = last.spec {
            release.set_spec(spec)?;
        }

        let desired = Spec::default();
        let plan = match self.diff_engine.plan(&desired, &release.state) {
            Ok(plan) => plan,
            Err(e) => return Err(self.abort(&mut release, FailureStage::Generation, e.into()).await),
        };

        self.enter(&mut release, OperationType::Destroy).await?;
        self.execute(release, plan, &desired, cancel).await
    }

    /// Holds the key until the guard is dropped.
    async fn lock(&self, key: &ReleaseKey) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.locks.lock().await.entry(key.clone()).or_default());
        match Arc::clone(&lock).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                info!("Waiting for another operation on {key}");
                lock.lock_owned().await
            }
        }
    }

    /// Allocates a revision, then reads the baseline release.
    async fn allocate(&self, key: &ReleaseKey) -> Result<(u64, Option<Release>)> {
        key.validate()?;
        let revision = self.store.allocate_revision(key).await?;
        let last = self.last_terminal_release(key).await?;
        Ok((revision, last))
    }

    /// Saves a new release in `generating`.
    async fn begin(
        &self,
        key: &ReleaseKey,
        revision: u64,
        last: Option<&Release>,
        operation: OperationType,
    ) -> Result<Release> {
        let baseline = last.map(|r| r.state.clone()).unwrap_or_default();
        let release = Release::new(key, revision, baseline);
        self.save(&release).await?;
        info!(
            "Started {operation} release {revision} for {key} ({} baseline resources)",
            release.state.len()
        );
        Ok(release)
    }

    /// Runs the pipeline and plans the generated spec against the baseline.
    async fn generate(
        &self,
        release: &mut Release,
        pipeline: &Pipeline,
        ctx: &GenerationContext<'_>,
    ) -> Result<(Spec, Plan)> {
        let spec = match pipeline.run(ctx).await {
            Ok(spec) => spec,
            Err(e) => return Err(self.abort(release, FailureStage::Generation, e).await),
        };
        let plan = match self.diff_engine.plan(&spec, &release.state) {
            Ok(plan) => plan,
            Err(e) => return Err(self.abort(release, FailureStage::Generation, e.into()).await),
        };

        info!("{}", plan);
        release.set_spec(spec.clone())?;
        Ok((spec, plan))
    }

    async fn enter(&self, release: &mut Release, operation: OperationType) -> Result<()> {
        release.transition(operation.working_phase())?;
        info!("Release {} entered {}", release.revision, release.phase);
        self.save(release).await
    }

    async fn execute(
        &self,
        mut release: Release,
        plan: Plan,
        desired: &Spec,
        cancel: &CancellationToken,
    ) -> Result<ReleaseOutcome> {
        let execution = PlanExecutor::new(self.runtimes)
            .with_options(self.options)
            .execute(&plan, desired, &release.state, cancel)
            .await;

        if execution.success {
            release.succeed(execution.state.clone())?;
            info!("Release {} succeeded", release.revision);
        } else {
            release.fail(execution.state.clone(), FailureRecord::from_execution(&execution))?;
            error!("Release {} failed: {}", release.revision, execution);
        }
        self.save(&release).await?;

        Ok(ReleaseOutcome {
            release,
            plan,
            execution: Some(execution),
            drift: None,
        })
    }

    /// Reads the live version of every resource in `state`.
    async fn read_live(&self, state: &State) -> std::result::Result<HashMap<String, Resource>, BackendError> {
        let mut observed = HashMap::new();
        for resource in &state.resources {
            let runtime = self.runtimes.get(resource.resource_type)?;
            let live = tokio::time::timeout(self.options.action_timeout, runtime.read(resource))
                .await
                .map_err(|_| BackendError::Timeout {
                    id: resource.id.clone(),
                    action: String::from("read"),
                    timeout: self.options.action_timeout,
                })??;
            if let Some(live) = live {
                observed.insert(resource.id.clone(), live);
            }
        }
        Ok(observed)
    }

    /// Marks the release failed, saves it, and hands back the cause.
    async fn abort(&self, release: &mut Release, stage: FailureStage, cause: KeelError) -> KeelError {
        error!("Release {} failed during {:?}: {}", release.revision, stage, cause);
        let state = release.state.clone();
        if let Err(e) = release.fail(state, FailureRecord::new(stage, cause.to_string())) {
            warn!("Could not mark release {} failed: {}", release.revision, e);
            return cause;
        }
        if let Err(e) = self.save(release).await {
            error!("Failed to save failed release {}: {}", release.revision, e);
        }
        cause
    }

    async fn save(&self, release: &Release) -> Result<()> {
        self.store.save_release(release).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{Map, json};

    use super::*;
    use crate::config::Workspace;
    use crate::error::{GenerationError, GraphError, StateError};
    use crate::generator::{Generator, Intent};
    use crate::planner::{ActionStatus, ActionType, DriftKind};
    use crate::resource::{ResourceGraph, ResourceType};
    use crate::runtime::Runtime;
    use crate::runtime::testing::FakeRuntime;
    use crate::secrets::SecretResolver;
    use crate::state::MemoryReleaseStore;

    struct StaticGenerator(Vec<Resource>);

    #[async_trait]
    impl Generator for StaticGenerator {
        fn name(&self) -> &str {
            "static"
        }

        async fn generate(
            &self,
            intent: &mut Intent,
            _ctx: &GenerationContext<'_>,
        ) -> std::result::Result<(), GenerationError> {
            intent.extend(self.0.clone());
            Ok(())
        }
    }

    fn tf(name: &str, size: i64) -> Resource {
        let mut attributes = Map::new();
        attributes.insert(String::from("size"), json!(size));
        Resource::new(
            format!("hashicorp:aws:aws_ebs_volume:{name}"),
            ResourceType::Terraform,
            attributes,
        )
    }

    fn id(name: &str) -> String {
        format!("hashicorp:aws:aws_ebs_volume:{name}")
    }

    fn a_and_b() -> Vec<Resource> {
        vec![tf("a", 1), tf("b", 2).with_dependency(id("a"))]
    }

    fn pipeline(resources: Vec<Resource>) -> Pipeline {
        Pipeline::new().with_generator(StaticGenerator(resources))
    }

    fn registry(runtime: &Arc<FakeRuntime>) -> RuntimeRegistry {
        let adapter: Arc<dyn Runtime> = runtime.clone();
        RuntimeRegistry::new().with_runtime(ResourceType::Terraform, adapter)
    }

    fn key() -> ReleaseKey {
        ReleaseKey::new("app", "dev", "main")
    }

    struct Env {
        workspace: Workspace,
        secrets: SecretResolver,
    }

    impl Env {
        fn new() -> Self {
            Self {
                workspace: Workspace::default(),
                secrets: SecretResolver::default(),
            }
        }

        fn ctx(&self) -> GenerationContext<'_> {
            GenerationContext::new("app", "main", &self.workspace, &self.secrets)
        }
    }

    #[tokio::test]
    async fn test_apply_creates_in_dependency_order() {
        let store = MemoryReleaseStore::new();
        let runtime = Arc::new(FakeRuntime::new());
        let runtimes = registry(&runtime);
        let env = Env::new();
        let manager = ReleaseManager::new(&store, &runtimes);

        let outcome = manager
            .apply(&key(), &pipeline(a_and_b()), &env.ctx(), &CancellationToken::new())
            .await
            .expect("applied");

        assert!(outcome.succeeded());
        assert_eq!(outcome.release.revision, 1);
        assert_eq!(outcome.release.state.len(), 2);
        assert_eq!(runtime.calls(), vec![format!("apply:{}", id("a")), format!("apply:{}", id("b"))]);

        let stored = store.get_release(&key(), 1).await.expect("stored");
        assert_eq!(stored.phase, ReleasePhase::Succeeded);
        assert!(stored.spec.is_some());
    }

    #[tokio::test]
    async fn test_failed_dependency_skips_dependent() {
        let store = MemoryReleaseStore::new();
        let runtime = Arc::new(FakeRuntime::new().fail_on(&id("a")));
        let runtimes = registry(&runtime);
        let env = Env::new();
        let manager = ReleaseManager::new(&store, &runtimes);

        let outcome = manager
            .apply(&key(), &pipeline(a_and_b()), &env.ctx(), &CancellationToken::new())
            .await
            .expect("release recorded");

        assert_eq!(outcome.release.phase, ReleasePhase::Failed);
        assert!(outcome.release.state.is_empty());

        let failure = outcome.release.failure.expect("failure record");
        assert_eq!(failure.stage, FailureStage::Execution);
        let statuses: Vec<(String, ActionStatus)> =
            failure.actions.iter().map(|a| (a.id.clone(), a.status)).collect();
        assert_eq!(
            statuses,
            vec![(id("a"), ActionStatus::Failed), (id("b"), ActionStatus::Skipped)]
        );
        assert_eq!(runtime.calls(), vec![format!("apply:{}", id("a"))]);
    }

    #[tokio::test]
    async fn test_next_release_resumes_from_partial_state() {
        let store = MemoryReleaseStore::new();
        let env = Env::new();

        let failing = Arc::new(FakeRuntime::new().fail_on(&id("b")));
        let runtimes = registry(&failing);
        let first = ReleaseManager::new(&store, &runtimes)
            .apply(&key(), &pipeline(a_and_b()), &env.ctx(), &CancellationToken::new())
            .await
            .expect("release recorded");
        assert_eq!(first.release.phase, ReleasePhase::Failed);
        assert_eq!(first.release.state.ids().collect::<Vec<_>>(), vec![id("a")]);

        let healthy = Arc::new(FakeRuntime::new());
        let runtimes = registry(&healthy);
        let second = ReleaseManager::new(&store, &runtimes)
            .apply(&key(), &pipeline(a_and_b()), &env.ctx(), &CancellationToken::new())
            .await
            .expect("applied");

        assert!(second.succeeded());
        assert_eq!(second.release.revision, 2);
        assert_eq!(second.plan.count(ActionType::NoOp), 1);
        assert_eq!(second.plan.count(ActionType::Create), 1);
        assert_eq!(healthy.calls(), vec![format!("apply:{}", id("b"))]);
    }

    #[tokio::test]
    async fn test_destroy_deletes_dependents_first() {
        let store = MemoryReleaseStore::new();
        let runtime = Arc::new(FakeRuntime::new());
        let runtimes = registry(&runtime);
        let env = Env::new();
        let manager = ReleaseManager::new(&store, &runtimes);

        manager
            .apply(&key(), &pipeline(a_and_b()), &env.ctx(), &CancellationToken::new())
            .await
            .expect("applied");
        let outcome = manager
            .destroy(&key(), &CancellationToken::new())
            .await
            .expect("destroyed");

        assert!(outcome.succeeded());
        assert_eq!(outcome.release.revision, 2);
        assert!(outcome.release.state.is_empty());
        assert!(outcome.release.spec.is_some());
        assert_eq!(
            runtime.calls()[2..].to_vec(),
            vec![format!("delete:{}", id("b")), format!("delete:{}", id("a"))]
        );
        assert!(runtime.live_ids().is_empty());
    }

    #[tokio::test]
    async fn test_failed_move_keeps_history_recoverable() {
        let store = MemoryReleaseStore::new();
        let env = Env::new();
        let moved = || vec![tf("y", 3)];

        let healthy = Arc::new(FakeRuntime::new());
        let runtimes = registry(&healthy);
        let first = ReleaseManager::new(&store, &runtimes)
            .apply(
                &key(),
                &pipeline(vec![tf("x", 1), tf("y", 2).with_dependency(id("x"))]),
                &env.ctx(),
                &CancellationToken::new(),
            )
            .await
            .expect("applied");
        assert!(first.succeeded());

        let failing = Arc::new(FakeRuntime::new().fail_on(&id("y")));
        let runtimes = registry(&failing);
        let second = ReleaseManager::new(&store, &runtimes)
            .apply(&key(), &pipeline(moved()), &env.ctx(), &CancellationToken::new())
            .await
            .expect("release recorded");
        assert_eq!(second.release.phase, ReleasePhase::Failed);
        assert_eq!(failing.calls(), vec![format!("apply:{}", id("y"))]);
        assert_eq!(second.release.state.len(), 2);
        assert!(ResourceGraph::build(&second.release.state.resources).is_ok());

        let runtimes = registry(&healthy);
        let manager = ReleaseManager::new(&store, &runtimes);
        let third = manager
            .apply(&key(), &pipeline(moved()), &env.ctx(), &CancellationToken::new())
            .await
            .expect("applied");
        assert!(third.succeeded());
        assert_eq!(third.release.state.ids().collect::<Vec<_>>(), vec![id("y")]);
        assert_eq!(
            healthy.calls()[2..].to_vec(),
            vec![format!("apply:{}", id("y")), format!("delete:{}", id("x"))]
        );

        let destroyed = manager
            .destroy(&key(), &CancellationToken::new())
            .await
            .expect("destroyed");
        assert!(destroyed.succeeded());
        assert_eq!(destroyed.release.revision, 4);
        assert!(healthy.live_ids().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_key_operations_run_in_turn() {
        let store = MemoryReleaseStore::new();
        let runtime = Arc::new(FakeRuntime::new().delay(&id("a"), Duration::from_millis(50)));
        let runtimes = registry(&runtime);
        let env = Env::new();
        let manager = ReleaseManager::new(&store, &runtimes);
        let pipeline = pipeline(vec![tf("a", 1)]);
        let (ctx, cancel) = (env.ctx(), CancellationToken::new());

        let key = key();
        let (left, right) = tokio::join!(
            manager.apply(&key, &pipeline, &ctx, &cancel),
            manager.apply(&key, &pipeline, &ctx, &cancel),
        );
        let mut outcomes = vec![left.expect("applied"), right.expect("applied")];
        outcomes.sort_by_key(|o| o.release.revision);

        assert!(outcomes.iter().all(ReleaseOutcome::succeeded));
        assert_eq!(outcomes[0].plan.count(ActionType::Create), 1);
        assert_eq!(outcomes[1].plan.count(ActionType::NoOp), 1);
        assert_eq!(outcomes[1].release.state.len(), 1);
        assert_eq!(runtime.calls(), vec![format!("apply:{}", id("a"))]);
        assert_eq!(runtime.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_destroy_without_history() {
        let store = MemoryReleaseStore::new();
        let runtimes = RuntimeRegistry::new();
        let manager = ReleaseManager::new(&store, &runtimes);

        let err = manager
            .destroy(&key(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, KeelError::Release(ReleaseError::NoBaselineState { .. })));
        assert!(store.list_revisions(&key()).await.expect("listed").is_empty());
    }

    #[tokio::test]
    async fn test_generation_failure_records_failed_release() {
        let store = MemoryReleaseStore::new();
        let runtime = Arc::new(FakeRuntime::new());
        let runtimes = registry(&runtime);
        let env = Env::new();
        let manager = ReleaseManager::new(&store, &runtimes);

        let cyclic = vec![
            tf("a", 1).with_dependency(id("b")),
            tf("b", 2).with_dependency(id("a")),
        ];
        let err = manager
            .apply(&key(), &pipeline(cyclic), &env.ctx(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, KeelError::Graph(GraphError::CyclicDependency { .. })));

        let stored = store.get_release(&key(), 1).await.expect("stored");
        assert_eq!(stored.phase, ReleasePhase::Failed);
        assert_eq!(stored.failure.map(|f| f.stage), Some(FailureStage::Generation));
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_preview_never_mutates() {
        let store = MemoryReleaseStore::new();
        let runtime = Arc::new(FakeRuntime::new());
        let runtimes = registry(&runtime);
        let env = Env::new();
        let manager = ReleaseManager::new(&store, &runtimes);

        let outcome = manager
            .preview(&key(), &pipeline(a_and_b()), &env.ctx(), false)
            .await
            .expect("previewed");

        assert!(outcome.succeeded());
        assert_eq!(outcome.plan.count(ActionType::Create), 2);
        assert!(outcome.release.state.is_empty());
        assert!(outcome.drift.is_none());
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_live_preview_reports_drift() {
        let store = MemoryReleaseStore::new();
        let runtime = Arc::new(FakeRuntime::new());
        let runtimes = registry(&runtime);
        let env = Env::new();
        let manager = ReleaseManager::new(&store, &runtimes);

        manager
            .apply(&key(), &pipeline(a_and_b()), &env.ctx(), &CancellationToken::new())
            .await
            .expect("applied");

        // Someone resizes a and deletes b behind our back.
        let drifted = Arc::new(FakeRuntime::new().with_live(tf("a", 5)));
        let runtimes = registry(&drifted);
        let outcome = ReleaseManager::new(&store, &runtimes)
            .preview(&key(), &pipeline(a_and_b()), &env.ctx(), true)
            .await
            .expect("previewed");

        let drift = outcome.drift.expect("drift report");
        assert!(drift.has_drift);
        let kinds: Vec<(String, DriftKind)> = drift.entries.iter().map(|e| (e.id.clone(), e.kind)).collect();
        assert_eq!(
            kinds,
            vec![(id("a"), DriftKind::Modified), (id("b"), DriftKind::Missing)]
        );
        assert!(!outcome.plan.has_changes());
    }

    #[tokio::test]
    async fn test_unfinished_release_is_not_a_baseline() {
        let store = MemoryReleaseStore::new();
        let runtime = Arc::new(FakeRuntime::new());
        let runtimes = registry(&runtime);
        let env = Env::new();
        let manager = ReleaseManager::new(&store, &runtimes);

        manager
            .apply(&key(), &pipeline(vec![tf("a", 1)]), &env.ctx(), &CancellationToken::new())
            .await
            .expect("applied");

        let revision = store.allocate_revision(&key()).await.expect("allocated");
        store
            .save_release(&Release::new(&key(), revision, State::default()))
            .await
            .expect("saved");

        let last = manager
            .last_terminal_release(&key())
            .await
            .expect("read")
            .expect("exists");
        assert_eq!(last.revision, 1);
        assert_eq!(last.state.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_key_creates_nothing() {
        let store = MemoryReleaseStore::new();
        let runtimes = RuntimeRegistry::new();
        let env = Env::new();
        let manager = ReleaseManager::new(&store, &runtimes);

        let bad = ReleaseKey::new("app", "", "main");
        let err = manager
            .preview(&bad, &pipeline(Vec::new()), &env.ctx(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, KeelError::State(StateError::InvalidKey { .. })));
    }
}
