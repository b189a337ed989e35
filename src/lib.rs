// ============================================================================
// Linting
// ============================================================================

#![forbid(unsafe_code)]               // Unsafe code is forbidden
#![warn(missing_docs)]                // Public items should be documented
#![warn(unused_must_use)]             // Handle Result and Option explicitly
#![warn(nonstandard_style)]           // Naming follows Rust conventions

// Clippy lints
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(clippy::print_stdout)]
#![warn(clippy::todo)]
#![warn(clippy::unimplemented)]
#![warn(clippy::unwrap_in_result)]
#![warn(clippy::redundant_clone)]
#![warn(clippy::cognitive_complexity)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Keel
//!
//! A declarative release engine for Kubernetes and Terraform resources.
//!
//! ## Overview
//!
//! A release moves one stack from the state recorded by its last finished
//! release to the resources a generator pipeline produces:
//!
//! 1. **Generate**: generators build an intent, patchers adjust it, and the
//!    result is frozen as the release spec.
//! 2. **Plan**: the spec is diffed against the recorded state into create,
//!    update, delete and no-op actions ordered by the dependency graph.
//! 3. **Execute**: independent actions run concurrently against runtimes;
//!    dependents of a failed action are skipped.
//! 4. **Record**: every phase change is saved as a numbered revision.
//!
//! ## Modules
//!
//! - [`resource`]: resource model, IDs, dependency graph and hashing
//! - [`config`]: workspace and extension configuration
//! - [`secrets`]: secret store providers and resolution
//! - [`generator`]: generator and patcher pipeline
//! - [`planner`]: diff, plan and concurrent executor
//! - [`runtime`]: the runtime seam actions execute through
//! - [`release`]: release lifecycle and orchestration
//! - [`state`]: release stores (memory, local, S3)
//! - [`cli`]: command-line interface
//!
//! ## Example
//!
//! ```yaml
//! resources:
//!   - id: v1:Namespace::shop
//!     type: Kubernetes
//!     attributes:
//!       apiVersion: v1
//!       kind: Namespace
//!       metadata:
//!         name: shop
//!   - id: apps/v1:Deployment:shop:web
//!     type: Kubernetes
//!     attributes:
//!       apiVersion: apps/v1
//!       kind: Deployment
//!     dependsOn:
//!       - v1:Namespace::shop
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod generator;
pub mod planner;
pub mod release;
pub mod resource;
pub mod runtime;
pub mod secrets;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, Workspace};
pub use error::{KeelError, Result};
pub use generator::{GenerationContext, Generator, Patcher, Pipeline};
pub use planner::{DiffEngine, ExecutionResult, Plan, PlanExecutor};
pub use release::{Release, ReleaseKey, ReleaseManager, ReleasePhase};
pub use resource::{Resource, ResourceGraph, ResourceType, Spec, State};
pub use runtime::{Runtime, RuntimeRegistry};
pub use secrets::{SecretResolver, SecretStore};
pub use state::{LocalReleaseStore, MemoryReleaseStore, ReleaseStore, S3ReleaseStore};
