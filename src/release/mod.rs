//! Releases and their lifecycle.
//!
//! A release moves from `generating` through one working phase to either
//! `succeeded` or `failed`, and is persisted through a `ReleaseStore` at
//! every step.

mod lifecycle;
mod manager;
mod types;

pub use lifecycle::{OperationType, validate_transition};
pub use manager::{ReleaseManager, ReleaseOutcome};
pub use types::{ActionFailure, FailureRecord, FailureStage, Release, ReleaseKey, ReleasePhase};
