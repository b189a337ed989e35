//! Runtime adapters.
//!
//! A runtime applies, deletes, and reads resources of one backend family.
//! The engine never talks to Kubernetes or Terraform directly; callers
//! register adapters in a `RuntimeRegistry` keyed by resource type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::resource::{Resource, ResourceType};

#[cfg(test)]
pub mod testing;

/// Backend adapter for one resource type.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Creates or updates the resource, returning the applied version.
    async fn apply(&self, resource: &Resource) -> Result<Resource, BackendError>;

    /// Deletes the resource.
    async fn delete(&self, resource: &Resource) -> Result<(), BackendError>;

    /// Reads the live version of the resource, if it exists.
    async fn read(&self, resource: &Resource) -> Result<Option<Resource>, BackendError>;

    /// Returns a short name for logging.
    fn name(&self) -> &'static str;
}

/// Registry of runtime adapters keyed by resource type.
#[derive(Clone, Default)]
pub struct RuntimeRegistry {
    runtimes: HashMap<ResourceType, Arc<dyn Runtime>>,
}

impl RuntimeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the adapter for a resource type, replacing any previous one.
    #[must_use]
    pub fn with_runtime(mut self, resource_type: ResourceType, runtime: Arc<dyn Runtime>) -> Self {
        self.register(resource_type, runtime);
        self
    }

    /// Registers the adapter for a resource type, replacing any previous one.
    pub fn register(&mut self, resource_type: ResourceType, runtime: Arc<dyn Runtime>) {
        self.runtimes.insert(resource_type, runtime);
    }

    /// Looks up the adapter for a resource type.
    ///
    /// # Errors
    ///
    /// Returns `NoRuntime` if nothing is registered for the type.
    pub fn get(&self, resource_type: ResourceType) -> Result<&dyn Runtime, BackendError> {
        self.runtimes
            .get(&resource_type)
            .map(AsRef::as_ref)
            .ok_or_else(|| BackendError::NoRuntime {
                resource_type: resource_type.to_string(),
            })
    }

    /// Returns true if no adapters are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runtimes.is_empty()
    }
}

impl std::fmt::Debug for RuntimeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self
            .runtimes
            .iter()
            .map(|(t, r)| format!("{t}={}", r.name()))
            .collect();
        names.sort();
        f.debug_struct("RuntimeRegistry")
            .field("runtimes", &names)
            .finish()
    }
}
