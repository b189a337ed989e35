//! Plan executor for applying release plans.
//!
//! Actions run as soon as every action they depend on has succeeded, up to a
//! concurrency limit. A failed action skips everything that transitively
//! depends on it while independent branches keep going. Cancellation stops
//! new actions from starting; actions already in flight run to completion.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::plan::{ActionType, Plan, PlannedAction};
use crate::error::BackendError;
use crate::resource::{Resource, Spec, State};
use crate::runtime::RuntimeRegistry;

/// Default per-action timeout.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(600);

/// Default number of actions allowed in flight.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Tuning for plan execution.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorOptions {
    /// Maximum time a single action may take before it counts as failed.
    pub action_timeout: Duration,
    /// Maximum number of actions in flight.
    pub max_concurrency: usize,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            action_timeout: DEFAULT_ACTION_TIMEOUT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

/// Executor for release plans.
#[derive(Debug)]
pub struct PlanExecutor<'a> {
    /// Runtime adapters.
    runtimes: &'a RuntimeRegistry,
    /// Execution tuning.
    options: ExecutorOptions,
}

/// Final status of a single action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    /// The backend accepted the action.
    Succeeded,
    /// The backend rejected the action or it timed out.
    Failed,
    /// Not started because a dependency failed.
    Skipped,
    /// Not started because execution was cancelled.
    Cancelled,
}

/// Result of executing a single action.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    /// Action index in the plan.
    pub index: usize,
    /// Resource ID.
    pub resource_id: String,
    /// Action type.
    pub action_type: ActionType,
    /// Final status.
    pub status: ActionStatus,
    /// Error message (if failed or skipped).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall time spent in the backend call.
    pub duration_ms: u64,
}

/// Result of executing the entire plan.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Individual action results, ordered by plan index.
    pub results: Vec<ActionResult>,
    /// State after execution: baseline plus every succeeded action.
    pub state: State,
    /// Number of successful actions.
    pub successful: usize,
    /// Number of failed actions.
    pub failed: usize,
    /// Number of skipped actions (due to dependency failures).
    pub skipped: usize,
    /// Number of actions never started due to cancellation.
    pub cancelled: usize,
    /// Whether every action succeeded.
    pub success: bool,
}

#[derive(Debug, Clone)]
struct Outcome {
    status: ActionStatus,
    error: Option<String>,
    applied: Option<Resource>,
    elapsed: Duration,
}

impl Outcome {
    fn succeeded(applied: Option<Resource>, elapsed: Duration) -> Self {
        Self {
            status: ActionStatus::Succeeded,
            error: None,
            applied,
            elapsed,
        }
    }

    fn not_run(status: ActionStatus, error: Option<String>) -> Self {
        Self {
            status,
            error,
            applied: None,
            elapsed: Duration::ZERO,
        }
    }
}

impl<'a> PlanExecutor<'a> {
    /// Creates a new plan executor with default options.
    #[must_use]
    pub fn new(runtimes: &'a RuntimeRegistry) -> Self {
        Self {
            runtimes,
            options: ExecutorOptions::default(),
        }
    }

    /// Sets the execution options.
    #[must_use]
    pub const fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Executes a plan against the registered runtimes.
    ///
    /// `desired` fixes the order of the resulting state and `baseline` is the
    /// state the plan was computed against. Backend failures are reported per
    /// action, never as an error of the whole call.
    pub async fn execute(
        &self,
        plan: &Plan,
        desired: &Spec,
        baseline: &State,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let total = plan.actions.len();
        info!("Executing plan with {} actions", total);

        let mut pending: Vec<usize> = plan.actions.iter().map(|a| a.dependencies.len()).collect();
        let mut dependents = vec![Vec::new(); total];
        for (index, action) in plan.actions.iter().enumerate() {
            for &dependency in &action.dependencies {
                if let Some(list) = dependents.get_mut(dependency) {
                    list.push(index);
                }
            }
        }

        let mut outcomes: Vec<Option<Outcome>> = vec![None; total];
        let mut ready: BTreeSet<usize> = (0..total).filter(|&i| pending[i] == 0).collect();
        let mut in_flight = FuturesUnordered::new();
        let max_concurrency = self.options.max_concurrency.max(1);

        loop {
            while in_flight.len() < max_concurrency && !cancel.is_cancelled() {
                let Some(index) = ready.pop_first() else {
                    break;
                };
                let action = &plan.actions[index];
                if action.action_type == ActionType::NoOp {
                    outcomes[index] = Some(Outcome::succeeded(Some(action.resource.clone()), Duration::ZERO));
                    release(index, &dependents, &mut pending, &mut ready);
                    continue;
                }
                in_flight.push(self.run_action(index, action));
            }

            let Some((index, result, elapsed)) = in_flight.next().await else {
                break;
            };

            match result {
                Ok(applied) => {
                    debug!("Action {} completed in {:?}", index, elapsed);
                    outcomes[index] = Some(Outcome::succeeded(applied, elapsed));
                    release(index, &dependents, &mut pending, &mut ready);
                }
                Err(e) => {
                    error!("Action {} failed: {}", index, e);
                    outcomes[index] = Some(Outcome {
                        status: ActionStatus::Failed,
                        error: Some(e.to_string()),
                        applied: None,
                        elapsed,
                    });
                    skip_dependents(plan, index, &dependents, &mut outcomes);
                }
            }
        }

        let was_cancelled = cancel.is_cancelled();
        if was_cancelled {
            warn!("Execution cancelled; unstarted actions will not run");
        }

        let outcomes: Vec<Outcome> = outcomes
            .into_iter()
            .map(|outcome| {
                outcome.unwrap_or_else(|| {
                    if was_cancelled {
                        Outcome::not_run(ActionStatus::Cancelled, None)
                    } else {
                        Outcome::not_run(
                            ActionStatus::Skipped,
                            Some(String::from("Dependencies never completed")),
                        )
                    }
                })
            })
            .collect();

        let state = resulting_state(plan, &outcomes, desired, baseline);
        let results: Vec<ActionResult> = plan
            .actions
            .iter()
            .zip(outcomes)
            .enumerate()
            .map(|(index, (action, outcome))| ActionResult {
                index,
                resource_id: action.resource_id.clone(),
                action_type: action.action_type,
                status: outcome.status,
                error: outcome.error,
                duration_ms: u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
            })
            .collect();

        let count = |status: ActionStatus| results.iter().filter(|r| r.status == status).count();
        let successful = count(ActionStatus::Succeeded);
        let failed = count(ActionStatus::Failed);
        let skipped = count(ActionStatus::Skipped);
        let cancelled = count(ActionStatus::Cancelled);

        let result = ExecutionResult {
            success: successful == total,
            results,
            state,
            successful,
            failed,
            skipped,
            cancelled,
        };
        info!("{}", result);
        result
    }

    async fn run_action(
        &self,
        index: usize,
        action: &PlannedAction,
    ) -> (usize, Result<Option<Resource>, BackendError>, Duration) {
        let started = Instant::now();
        let result = self.invoke(action).await;
        (index, result, started.elapsed())
    }

    async fn invoke(&self, action: &PlannedAction) -> Result<Option<Resource>, BackendError> {
        let runtime = self.runtimes.get(action.resource.resource_type)?;
        info!("Executing action: {}", action.description());

        let call = async {
            match action.action_type {
                ActionType::Create | ActionType::Update => runtime.apply(&action.resource).await.map(Some),
                ActionType::Delete => runtime.delete(&action.resource).await.map(|()| None),
                ActionType::NoOp => Ok(Some(action.resource.clone())),
            }
        };

        tokio::time::timeout(self.options.action_timeout, call)
            .await
            .map_err(|_| BackendError::Timeout {
                id: action.resource_id.clone(),
                action: action.action_type.to_string(),
                timeout: self.options.action_timeout,
            })?
    }
}

fn release(
    index: usize,
    dependents: &[Vec<usize>],
    pending: &mut [usize],
    ready: &mut BTreeSet<usize>,
) {
    for &dependent in &dependents[index] {
        pending[dependent] = pending[dependent].saturating_sub(1);
        if pending[dependent] == 0 {
            ready.insert(dependent);
        }
    }
}

fn skip_dependents(
    plan: &Plan,
    failed: usize,
    dependents: &[Vec<usize>],
    outcomes: &mut [Option<Outcome>],
) {
    let reason = format!("Dependency '{}' failed", plan.actions[failed].resource_id);
    let mut stack = dependents[failed].clone();
    while let Some(index) = stack.pop() {
        if outcomes[index].is_some() {
            continue;
        }
        warn!("Skipping action {} due to failed dependencies", index);
        outcomes[index] = Some(Outcome::not_run(ActionStatus::Skipped, Some(reason.clone())));
        stack.extend(dependents[index].iter().copied());
    }
}

/// Applies the succeeded actions to the baseline.
///
/// Resources in the desired spec come first in spec order, followed by
/// baseline resources that are still recorded.
fn resulting_state(plan: &Plan, outcomes: &[Outcome], desired: &Spec, baseline: &State) -> State {
    let mut records: HashMap<&str, Resource> = baseline
        .resources
        .iter()
        .map(|r| (r.id.as_str(), r.clone()))
        .collect();

    for (action, outcome) in plan.actions.iter().zip(outcomes) {
        if outcome.status != ActionStatus::Succeeded {
            continue;
        }
        match action.action_type {
            ActionType::Delete => {
                records.remove(action.resource_id.as_str());
            }
            ActionType::Create | ActionType::Update | ActionType::NoOp => {
                if let Some(applied) = &outcome.applied {
                    records.insert(action.resource_id.as_str(), applied.clone());
                }
            }
        }
    }

    let mut resources = Vec::with_capacity(records.len());
    for id in desired.ids().chain(baseline.ids()) {
        if let Some(resource) = records.remove(id) {
            resources.push(resource);
        }
    }

    // Recorded edges may only point at recorded resources.
    let recorded: HashSet<String> = resources.iter().map(|r| r.id.clone()).collect();
    for resource in &mut resources {
        let before = resource.depends_on.len();
        resource.depends_on.retain(|dependency| recorded.contains(dependency));
        if resource.depends_on.len() != before {
            warn!("Dropped dependencies of '{}' on resources no longer recorded", resource.id);
        }
    }
    State::new(resources)
}

impl ExecutionResult {
    /// Returns true if all actions were successful.
    #[must_use]
    pub const fn all_successful(&self) -> bool {
        self.success
    }

    /// Returns results that did not succeed.
    #[must_use]
    pub fn unsuccessful(&self) -> Vec<&ActionResult> {
        self.results
            .iter()
            .filter(|r| r.status != ActionStatus::Succeeded)
            .collect()
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executed {} actions: {} successful, {} failed, {} skipped, {} cancelled",
            self.results.len(),
            self.successful,
            self.failed,
            self.skipped,
            self.cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::planner::DiffEngine;
    use crate::resource::ResourceType;
    use crate::runtime::testing::FakeRuntime;
    use serde_json::Map;

    fn resource(id: &str, deps: &[&str]) -> Resource {
        deps.iter().fold(
            Resource::new(id, ResourceType::Terraform, Map::new()),
            |r, d| r.with_dependency(*d),
        )
    }

    fn registry(runtime: &Arc<FakeRuntime>) -> RuntimeRegistry {
        RuntimeRegistry::new().with_runtime(ResourceType::Terraform, runtime.clone())
    }

    fn statuses(result: &ExecutionResult) -> Vec<(&str, ActionStatus)> {
        result
            .results
            .iter()
            .map(|r| (r.resource_id.as_str(), r.status))
            .collect()
    }

    #[tokio::test]
    async fn test_apply_in_dependency_order() {
        let runtime = Arc::new(FakeRuntime::new());
        let registry = registry(&runtime);
        let desired = Spec::new(vec![resource("b", &["a"]), resource("a", &[])]);
        let plan = DiffEngine::new().plan(&desired, &State::default()).expect("plan");

        let result = PlanExecutor::new(&registry)
            .execute(&plan, &desired, &State::default(), &CancellationToken::new())
            .await;

        assert!(result.success);
        assert_eq!(runtime.calls(), vec!["apply:a", "apply:b"]);
        assert_eq!(result.state.resources, desired.resources);
    }

    #[tokio::test]
    async fn test_failure_skips_dependents_only() {
        let runtime = Arc::new(FakeRuntime::new().fail_on("a"));
        let registry = registry(&runtime);
        let desired = Spec::new(vec![
            resource("a", &[]),
            resource("b", &["a"]),
            resource("c", &["b"]),
            resource("d", &[]),
        ]);
        let plan = DiffEngine::new().plan(&desired, &State::default()).expect("plan");

        let result = PlanExecutor::new(&registry)
            .execute(&plan, &desired, &State::default(), &CancellationToken::new())
            .await;

        assert!(!result.success);
        assert_eq!(
            statuses(&result),
            vec![
                ("a", ActionStatus::Failed),
                ("b", ActionStatus::Skipped),
                ("c", ActionStatus::Skipped),
                ("d", ActionStatus::Succeeded),
            ]
        );
        assert_eq!(result.state.ids().collect::<Vec<_>>(), vec!["d"]);
        assert_eq!(result.skipped, 2);
    }

    fn moved_off_x() -> (State, Spec) {
        let baseline = State::new(vec![resource("x", &[]), resource("y", &["x"])]);
        let mut moved = resource("y", &[]);
        moved.attributes.insert("owner".to_string(), serde_json::json!("self"));
        (baseline, Spec::new(vec![moved]))
    }

    #[tokio::test]
    async fn test_failed_update_keeps_removed_dependency() {
        let runtime = Arc::new(FakeRuntime::new().fail_on("y"));
        let registry = registry(&runtime);
        let (baseline, desired) = moved_off_x();
        let plan = DiffEngine::new().plan(&desired, &baseline).expect("plan");

        let result = PlanExecutor::new(&registry)
            .execute(&plan, &desired, &baseline, &CancellationToken::new())
            .await;

        assert_eq!(runtime.calls(), vec!["apply:y"]);
        assert_eq!(
            statuses(&result),
            vec![("x", ActionStatus::Skipped), ("y", ActionStatus::Failed)]
        );
        assert_eq!(result.state.ids().collect::<Vec<_>>(), vec!["y", "x"]);
        assert!(crate::resource::ResourceGraph::build(&result.state.resources).is_ok());
    }

    #[tokio::test]
    async fn test_state_drops_edges_to_deleted_resources() {
        let runtime = Arc::new(FakeRuntime::new().fail_on("y"));
        let registry = registry(&runtime);
        let (baseline, desired) = moved_off_x();
        let mut plan = DiffEngine::new().plan(&desired, &baseline).expect("plan");
        plan.actions[0].dependencies.clear();

        let result = PlanExecutor::new(&registry)
            .execute(&plan, &desired, &baseline, &CancellationToken::new())
            .await;

        assert_eq!(result.state.ids().collect::<Vec<_>>(), vec!["y"]);
        assert!(result.state.resources[0].depends_on.is_empty());
        assert!(crate::resource::ResourceGraph::build(&result.state.resources).is_ok());
    }

    #[tokio::test]
    async fn test_concurrency_limit() {
        let delay = Duration::from_millis(20);
        let runtime = Arc::new(
            FakeRuntime::new()
                .delay("a", delay)
                .delay("b", delay)
                .delay("c", delay)
                .delay("d", delay),
        );
        let registry = registry(&runtime);
        let desired = Spec::new(vec![
            resource("a", &[]),
            resource("b", &[]),
            resource("c", &[]),
            resource("d", &[]),
        ]);
        let plan = DiffEngine::new().plan(&desired, &State::default()).expect("plan");

        let result = PlanExecutor::new(&registry)
            .with_options(ExecutorOptions {
                max_concurrency: 2,
                ..ExecutorOptions::default()
            })
            .execute(&plan, &desired, &State::default(), &CancellationToken::new())
            .await;

        assert!(result.success);
        assert_eq!(runtime.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_independent_actions_run_concurrently() {
        let delay = Duration::from_millis(20);
        let runtime = Arc::new(FakeRuntime::new().delay("a", delay).delay("b", delay).delay("c", delay));
        let registry = registry(&runtime);
        let desired = Spec::new(vec![resource("a", &[]), resource("b", &[]), resource("c", &[])]);
        let plan = DiffEngine::new().plan(&desired, &State::default()).expect("plan");

        PlanExecutor::new(&registry)
            .execute(&plan, &desired, &State::default(), &CancellationToken::new())
            .await;

        assert_eq!(runtime.max_in_flight(), 3);
    }

    #[tokio::test]
    async fn test_timeout_fails_action() {
        let runtime = Arc::new(FakeRuntime::new().delay("slow", Duration::from_millis(500)));
        let registry = registry(&runtime);
        let desired = Spec::new(vec![resource("slow", &[])]);
        let plan = DiffEngine::new().plan(&desired, &State::default()).expect("plan");

        let result = PlanExecutor::new(&registry)
            .with_options(ExecutorOptions {
                action_timeout: Duration::from_millis(20),
                ..ExecutorOptions::default()
            })
            .execute(&plan, &desired, &State::default(), &CancellationToken::new())
            .await;

        assert_eq!(result.failed, 1);
        let message = result.results[0].error.as_deref().unwrap_or_default();
        assert!(message.contains("Timed out"), "unexpected error: {message}");
        assert!(result.state.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_stops_new_actions() {
        let cancel = CancellationToken::new();
        let runtime = Arc::new(FakeRuntime::new().cancel_on("x", cancel.clone()));
        let registry = registry(&runtime);
        let desired = Spec::new(vec![resource("x", &[]), resource("y", &["x"]), resource("z", &[])]);
        let plan = DiffEngine::new().plan(&desired, &State::default()).expect("plan");

        let result = PlanExecutor::new(&registry)
            .with_options(ExecutorOptions {
                max_concurrency: 1,
                ..ExecutorOptions::default()
            })
            .execute(&plan, &desired, &State::default(), &cancel)
            .await;

        assert_eq!(
            statuses(&result),
            vec![
                ("x", ActionStatus::Succeeded),
                ("y", ActionStatus::Cancelled),
                ("z", ActionStatus::Cancelled),
            ]
        );
        assert_eq!(result.state.ids().collect::<Vec<_>>(), vec!["x"]);
    }

    #[tokio::test]
    async fn test_destroy_removes_from_state() {
        let baseline = State::new(vec![resource("a", &[]), resource("b", &["a"])]);
        let runtime = Arc::new(
            FakeRuntime::new()
                .with_live(resource("a", &[]))
                .with_live(resource("b", &["a"])),
        );
        let registry = registry(&runtime);
        let plan = DiffEngine::new().plan(&Spec::default(), &baseline).expect("plan");

        let result = PlanExecutor::new(&registry)
            .execute(&plan, &Spec::default(), &baseline, &CancellationToken::new())
            .await;

        assert!(result.success);
        assert_eq!(runtime.calls(), vec!["delete:b", "delete:a"]);
        assert!(result.state.is_empty());
        assert!(runtime.live_ids().is_empty());
    }

    #[tokio::test]
    async fn test_partial_destroy_keeps_remaining() {
        let baseline = State::new(vec![resource("a", &[]), resource("b", &["a"])]);
        let runtime = Arc::new(FakeRuntime::new().fail_on("b"));
        let registry = registry(&runtime);
        let plan = DiffEngine::new().plan(&Spec::default(), &baseline).expect("plan");

        let result = PlanExecutor::new(&registry)
            .execute(&plan, &Spec::default(), &baseline, &CancellationToken::new())
            .await;

        assert_eq!(result.state, baseline);
        assert_eq!(result.unsuccessful().len(), 2);
    }

    #[tokio::test]
    async fn test_noop_needs_no_runtime() {
        let resources = vec![resource("a", &[])];
        let registry = RuntimeRegistry::new();
        let desired = Spec::new(resources.clone());
        let baseline = State::new(resources);
        let plan = DiffEngine::new().plan(&desired, &baseline).expect("plan");

        let result = PlanExecutor::new(&registry)
            .execute(&plan, &desired, &baseline, &CancellationToken::new())
            .await;

        assert!(result.success);
        assert_eq!(result.state, baseline);
    }

    #[tokio::test]
    async fn test_missing_runtime_fails_action() {
        let registry = RuntimeRegistry::new();
        let desired = Spec::new(vec![resource("a", &[])]);
        let plan = DiffEngine::new().plan(&desired, &State::default()).expect("plan");

        let result = PlanExecutor::new(&registry)
            .execute(&plan, &desired, &State::default(), &CancellationToken::new())
            .await;

        assert_eq!(result.failed, 1);
        assert!(result.state.is_empty());
    }
}
