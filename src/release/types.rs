//! Release records.
//!
//! A release is one versioned attempt to reconcile a spec with the backends
//! for a (project, workspace, stack) triple. Releases are persisted with
//! stable camelCase field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lifecycle::validate_transition;
use crate::error::{ReleaseError, StateError};
use crate::planner::{ActionStatus, ActionType, ExecutionResult};
use crate::resource::{Spec, State};

/// Identifies the release history of one stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReleaseKey {
    /// Project name.
    pub project: String,
    /// Workspace name.
    pub workspace: String,
    /// Stack name.
    pub stack: String,
}

impl ReleaseKey {
    /// Creates a key.
    #[must_use]
    pub fn new(project: impl Into<String>, workspace: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            workspace: workspace.into(),
            stack: stack.into(),
        }
    }

    /// Checks that every component can be used as a storage path segment.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for empty segments or segments containing `/` or `..`.
    pub fn validate(&self) -> Result<(), StateError> {
        for (field, value) in [
            ("project", &self.project),
            ("workspace", &self.workspace),
            ("stack", &self.stack),
        ] {
            if value.is_empty() {
                return Err(StateError::InvalidKey {
                    message: format!("{field} cannot be empty"),
                });
            }
            if value.contains('/') || value.contains('\\') || value.contains("..") {
                return Err(StateError::InvalidKey {
                    message: format!("{field} '{value}' contains a path separator or '..'"),
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for ReleaseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.project, self.workspace, self.stack)
    }
}

/// Phase of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleasePhase {
    /// The spec is being generated.
    Generating,
    /// A read-only plan is being computed.
    Previewing,
    /// Resources are being created or updated.
    Applying,
    /// Resources are being deleted.
    Destroying,
    /// The operation completed.
    Succeeded,
    /// The operation failed.
    Failed,
}

impl ReleasePhase {
    /// Returns the serialized name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Generating => "generating",
            Self::Previewing => "previewing",
            Self::Applying => "applying",
            Self::Destroying => "destroying",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Returns true for `succeeded` and `failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for ReleasePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a failed release stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    /// Spec generation or graph validation failed.
    Generation,
    /// Reading live resources during preview failed.
    Preview,
    /// At least one plan action did not succeed.
    Execution,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generation => write!(f, "generation"),
            Self::Preview => write!(f, "preview"),
            Self::Execution => write!(f, "execution"),
        }
    }
}

/// Per-resource entry of a failure record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFailure {
    /// Resource ID.
    pub id: String,
    /// Planned action.
    pub action: ActionType,
    /// How the action ended.
    pub status: ActionStatus,
    /// Error message, if the action ran and failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Details kept on a failed release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Stage that failed.
    pub stage: FailureStage,
    /// Summary message.
    pub message: String,
    /// Every action that did not succeed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionFailure>,
}

impl FailureRecord {
    /// Creates a record with no per-action entries.
    #[must_use]
    pub fn new(stage: FailureStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            actions: Vec::new(),
        }
    }

    /// Builds an execution failure from the unsuccessful actions of a run.
    #[must_use]
    pub fn from_execution(result: &ExecutionResult) -> Self {
        let actions = result
            .unsuccessful()
            .into_iter()
            .map(|r| ActionFailure {
                id: r.resource_id.clone(),
                action: r.action_type,
                status: r.status,
                error: r.error.clone(),
            })
            .collect();
        Self {
            stage: FailureStage::Execution,
            message: result.to_string(),
            actions,
        }
    }
}

/// A persisted release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    /// Project name.
    pub project: String,
    /// Workspace name.
    pub workspace: String,
    /// Stack name.
    pub stack: String,
    /// Revision, starting at 1 for each triple.
    pub revision: u64,
    /// Spec produced by generation. Frozen once the release leaves `generating`.
    #[serde(default)]
    pub spec: Option<Spec>,
    /// Resources confirmed in the backends.
    #[serde(default)]
    pub state: State,
    /// Current phase.
    pub phase: ReleasePhase,
    /// When the release was created.
    pub create_time: DateTime<Utc>,
    /// When the release was last modified.
    pub modified_time: DateTime<Utc>,
    /// Failure details, present only on failed releases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureRecord>,
}

impl Release {
    /// Creates a release in `generating` carrying the baseline state.
    #[must_use]
    pub fn new(key: &ReleaseKey, revision: u64, baseline: State) -> Self {
        let now = Utc::now();
        Self {
            project: key.project.clone(),
            workspace: key.workspace.clone(),
            stack: key.stack.clone(),
            revision,
            spec: None,
            state: baseline,
            phase: ReleasePhase::Generating,
            create_time: now,
            modified_time: now,
            failure: None,
        }
    }

    /// Returns the key of this release.
    #[must_use]
    pub fn key(&self) -> ReleaseKey {
        ReleaseKey::new(&self.project, &self.workspace, &self.stack)
    }

    /// Returns true once the release reached a terminal phase.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Attaches the generated spec.
    ///
    /// # Errors
    ///
    /// Returns `SpecFrozen` outside the `generating` phase.
    pub fn set_spec(&mut self, spec: Spec) -> Result<(), ReleaseError> {
        if self.phase != ReleasePhase::Generating {
            return Err(ReleaseError::SpecFrozen {
                phase: self.phase.to_string(),
            });
        }
        self.spec = Some(spec);
        self.touch();
        Ok(())
    }

    /// Moves the release to another phase.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` for disallowed moves and `MissingSpec` when
    /// previewing or applying without a spec.
    pub fn transition(&mut self, to: ReleasePhase) -> Result<(), ReleaseError> {
        validate_transition(self.phase, to)?;
        if matches!(to, ReleasePhase::Previewing | ReleasePhase::Applying) && self.spec.is_none() {
            return Err(ReleaseError::MissingSpec {
                revision: self.revision,
            });
        }
        self.phase = to;
        self.touch();
        Ok(())
    }

    /// Marks the release succeeded with the final state.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the release cannot succeed from its phase.
    pub fn succeed(&mut self, state: State) -> Result<(), ReleaseError> {
        self.transition(ReleasePhase::Succeeded)?;
        self.state = state;
        Ok(())
    }

    /// Marks the release failed, keeping whatever state was confirmed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the release is already terminal.
    pub fn fail(&mut self, state: State, failure: FailureRecord) -> Result<(), ReleaseError> {
        self.transition(ReleasePhase::Failed)?;
        self.state = state;
        self.failure = Some(failure);
        Ok(())
    }

    fn touch(&mut self) {
        self.modified_time = Utc::now();
    }
}
