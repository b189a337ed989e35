//! Secret store abstraction and provider registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::provider::{ExternalSecretRef, ProviderKind, ProviderSpec};
use crate::error::SecretError;

/// A backend that reads secret values.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Returns the value the reference points to.
    async fn get_secret(&self, secret_ref: &ExternalSecretRef) -> Result<String, SecretError>;
}

/// Builds secret stores from provider configuration.
pub trait SecretStoreFactory: Send + Sync {
    /// Creates a store for the given provider spec.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider settings cannot be used.
    fn create(&self, provider: &ProviderSpec) -> Result<Box<dyn SecretStore>, SecretError>;
}

struct FnFactory<F>(F);

impl<F> SecretStoreFactory for FnFactory<F>
where
    F: Fn(&ProviderSpec) -> Result<Box<dyn SecretStore>, SecretError> + Send + Sync,
{
    fn create(&self, provider: &ProviderSpec) -> Result<Box<dyn SecretStore>, SecretError> {
        (self.0)(provider)
    }
}

/// Registry of secret store factories keyed by provider kind.
///
/// Passed explicitly to whatever resolves secrets; there is no global table.
#[derive(Clone, Default)]
pub struct SecretStoreRegistry {
    factories: HashMap<ProviderKind, Arc<dyn SecretStoreFactory>>,
}

impl SecretStoreRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory, replacing any previous one for the kind.
    pub fn register(&mut self, kind: ProviderKind, factory: Arc<dyn SecretStoreFactory>) {
        self.factories.insert(kind, factory);
    }

    /// Registers a closure as the factory for a kind.
    pub fn register_fn<F>(&mut self, kind: ProviderKind, factory: F)
    where
        F: Fn(&ProviderSpec) -> Result<Box<dyn SecretStore>, SecretError> + Send + Sync + 'static,
    {
        self.register(kind, Arc::new(FnFactory(factory)));
    }

    /// Looks up the factory for a kind.
    ///
    /// # Errors
    ///
    /// Returns `ProviderNotRegistered` if nothing is registered for the kind.
    pub fn get(&self, kind: ProviderKind) -> Result<&dyn SecretStoreFactory, SecretError> {
        self.factories
            .get(&kind)
            .map(AsRef::as_ref)
            .ok_or_else(|| SecretError::ProviderNotRegistered {
                provider: kind.to_string(),
            })
    }

    /// Returns the registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<ProviderKind> = self.factories.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl std::fmt::Debug for SecretStoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStoreRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
