//! Error types for the Keel release engine.
//!
//! This module provides the error hierarchy for every stage of a release:
//! configuration, graph construction, generation, secret resolution, backend
//! actions, the release lifecycle, and release persistence.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for the Keel release engine.
#[derive(Debug, Error)]
pub enum KeelError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Resource graph errors.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Generator or patcher errors.
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Secret resolution errors.
    #[error("Secret resolution error: {0}")]
    Secret(#[from] SecretError),

    /// Backend action errors.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Release lifecycle errors.
    #[error("Release error: {0}")]
    Release(#[from] ReleaseError),

    /// Release store errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// A project is selected by more than one patcher block of a module.
    #[error("Project '{project}' of module '{module}' is selected by both '{first}' and '{second}'")]
    ProjectSelectedTwice {
        /// Module name.
        module: String,
        /// The project selected twice.
        project: String,
        /// First selecting patcher block.
        first: String,
        /// Second selecting patcher block.
        second: String,
    },

    /// The secret store provider is not configured with exactly one provider.
    #[error("Invalid secret store provider: {message}")]
    InvalidSecretProvider {
        /// Description of the provider issue.
        message: String,
    },
}

/// Resource graph errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// Two resources share the same ID.
    #[error("Duplicate resource ID: {id}")]
    DuplicateId {
        /// The duplicated ID.
        id: String,
    },

    /// A `dependsOn` entry does not resolve to a resource.
    #[error("Resource '{id}' depends on unknown resource '{dependency}'")]
    DanglingDependency {
        /// The resource declaring the dependency.
        id: String,
        /// The unresolved dependency.
        dependency: String,
    },

    /// The dependency relation contains a cycle.
    #[error("Cyclic dependency detected: {}", format_cycle(.cycle))]
    CyclicDependency {
        /// IDs on the cycle, each depending on the next; the last depends on the first.
        cycle: Vec<String>,
    },
}

/// Generator and patcher errors.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// A generator or patcher reported a failure.
    #[error("{message}")]
    Failed {
        /// Description of the failure.
        message: String,
    },

    /// A secret needed during generation could not be resolved.
    #[error(transparent)]
    Secret(#[from] SecretError),

    /// Module or workspace configuration could not be used.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A named generator failed.
    #[error("generator '{name}' failed: {source}")]
    Generator {
        /// Generator name.
        name: String,
        /// Underlying failure.
        source: Box<GenerationError>,
    },

    /// A named patcher failed.
    #[error("patcher '{name}' failed: {source}")]
    Patcher {
        /// Patcher name.
        name: String,
        /// Underlying failure.
        source: Box<GenerationError>,
    },
}

/// Secret resolution errors.
#[derive(Debug, Error)]
pub enum SecretError {
    /// The secret does not exist in the store.
    #[error("Secret not found: {name}")]
    NotFound {
        /// Secret name.
        name: String,
    },

    /// The requested property does not exist on the secret.
    #[error("Property '{property}' not found in secret '{name}'")]
    PropertyNotFound {
        /// Secret name.
        name: String,
        /// Requested property.
        property: String,
    },

    /// Authentication against the provider failed.
    #[error("Secret store authentication failed: {message}")]
    Auth {
        /// Description of the auth failure.
        message: String,
    },

    /// The provider could not be reached.
    #[error("Network error communicating with secret store: {message}")]
    Network {
        /// Description of the network failure.
        message: String,
    },

    /// No store implementation is registered for the configured provider.
    #[error("No secret store registered for provider '{provider}'")]
    ProviderNotRegistered {
        /// Provider name.
        provider: String,
    },

    /// The provider spec itself is malformed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised by runtime adapters while executing plan actions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend rejected or failed the action.
    #[error("Failed to {action} '{id}': {message}")]
    ActionFailed {
        /// Resource ID.
        id: String,
        /// Action name.
        action: String,
        /// Description of the failure.
        message: String,
    },

    /// The action did not complete within the caller-supplied timeout.
    #[error("Timed out after {timeout:?} while trying to {action} '{id}'")]
    Timeout {
        /// Resource ID.
        id: String,
        /// Action name.
        action: String,
        /// The timeout that expired.
        timeout: Duration,
    },

    /// No runtime adapter is registered for the resource type.
    #[error("No runtime registered for {resource_type} resources")]
    NoRuntime {
        /// Resource type name.
        resource_type: String,
    },
}

/// Release lifecycle errors.
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// The requested phase transition is not allowed.
    #[error("Invalid release phase transition: {from} -> {to}")]
    InvalidTransition {
        /// Current phase.
        from: String,
        /// Requested phase.
        to: String,
    },

    /// The release spec can no longer be changed.
    #[error("Release spec is frozen in phase {phase}")]
    SpecFrozen {
        /// Current phase.
        phase: String,
    },

    /// The release has no spec but the transition needs one.
    #[error("Release {revision} has no spec")]
    MissingSpec {
        /// Release revision.
        revision: u64,
    },

    /// Destroy requested for a triple with no recorded state.
    #[error("No recorded state to destroy for {key}")]
    NoBaselineState {
        /// Release key (`project/workspace/stack`).
        key: String,
    },

    /// Two releases claimed the same revision. Never retryable.
    #[error("Revision conflict for {key}: revision {revision} was not allocated by this store")]
    RevisionConflict {
        /// Release key (`project/workspace/stack`).
        key: String,
        /// The conflicting revision.
        revision: u64,
    },

    /// A release in a terminal phase was saved again.
    #[error("Release {revision} of {key} is already finished and cannot be overwritten")]
    ReleaseFinished {
        /// Release key (`project/workspace/stack`).
        key: String,
        /// The finished revision.
        revision: u64,
    },
}

/// Release store errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// The requested release does not exist.
    #[error("Release {revision} not found for {key}")]
    ReleaseNotFound {
        /// Release key (`project/workspace/stack`).
        key: String,
        /// Requested revision.
        revision: u64,
    },

    /// Stored data is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Revision allocation lock could not be acquired.
    #[error("Failed to acquire revision lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// A release key component cannot be stored.
    #[error("Invalid release key: {message}")]
    InvalidKey {
        /// Description of the key issue.
        message: String,
    },

    /// Filesystem backend error.
    #[error("Local state backend error: {message}")]
    LocalError {
        /// Description of the filesystem error.
        message: String,
    },

    /// S3 backend error.
    #[error("S3 state backend error: {message}")]
    S3Error {
        /// Description of the S3 error.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },
}

/// Result type alias for Keel operations.
pub type Result<T> = std::result::Result<T, KeelError>;

fn format_cycle(cycle: &[String]) -> String {
    match cycle.first() {
        Some(first) => format!("{} -> {first}", cycle.join(" -> ")),
        None => String::new(),
    }
}

impl KeelError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if the caller may retry the failed call.
    ///
    /// The core never retries on its own; only transient store I/O qualifies.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::State(StateError::S3Error { .. } | StateError::LockFailed { .. })
        )
    }

    /// Returns true if this error means configuration must be fixed first.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Secret(SecretError::Config(_))
        )
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl GenerationError {
    /// Creates a generic generation failure.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

impl BackendError {
    /// Creates an action failure.
    #[must_use]
    pub fn action_failed(
        id: impl Into<String>,
        action: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ActionFailed {
            id: id.into(),
            action: action.into(),
            message: message.into(),
        }
    }
}

impl StateError {
    /// Creates an S3 error with the given message.
    #[must_use]
    pub fn s3(message: impl Into<String>) -> Self {
        Self::S3Error {
            message: message.into(),
        }
    }

    /// Creates a local filesystem error with the given message.
    #[must_use]
    pub fn local(message: impl Into<String>) -> Self {
        Self::LocalError {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}
