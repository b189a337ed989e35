//! Planning module for release operations.
//!
//! This module compares the desired spec with the recorded state, turns the
//! difference into an ordered plan, and executes that plan concurrently
//! against the registered runtimes.

mod diff;
mod plan;
mod executor;

pub use diff::{DiffDetail, DiffEngine, DiffResult, DiffType, DriftEntry, DriftKind, DriftReport, ResourceDiff};
pub use plan::{ActionType, Plan, PlannedAction};
pub use executor::{
    ActionResult, ActionStatus, DEFAULT_ACTION_TIMEOUT, DEFAULT_MAX_CONCURRENCY, ExecutionResult,
    ExecutorOptions, PlanExecutor,
};
