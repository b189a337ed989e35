//! Release phase transitions.

use super::types::ReleasePhase;
use crate::error::ReleaseError;

/// Operation a release was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    /// Compute a plan without touching backends.
    Preview,
    /// Create and update resources.
    Apply,
    /// Delete every recorded resource.
    Destroy,
}

impl OperationType {
    /// Phase a release enters once generation is done.
    #[must_use]
    pub const fn working_phase(self) -> ReleasePhase {
        match self {
            Self::Preview => ReleasePhase::Previewing,
            Self::Apply => ReleasePhase::Applying,
            Self::Destroy => ReleasePhase::Destroying,
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Preview => "preview",
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        };
        write!(f, "{s}")
    }
}

/// Checks that a release may move from `from` to `to`.
///
/// # Errors
///
/// Returns `InvalidTransition` for any move outside the release state machine.
pub fn validate_transition(from: ReleasePhase, to: ReleasePhase) -> Result<(), ReleaseError> {
    let valid = matches!(
        (from, to),
        (
            ReleasePhase::Generating,
            ReleasePhase::Previewing
                | ReleasePhase::Applying
                | ReleasePhase::Destroying
                | ReleasePhase::Failed
        ) | (
            ReleasePhase::Previewing | ReleasePhase::Applying | ReleasePhase::Destroying,
            ReleasePhase::Succeeded | ReleasePhase::Failed
        )
    );

    if valid {
        Ok(())
    } else {
        Err(ReleaseError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
