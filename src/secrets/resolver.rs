//! Secret reference resolution.

use tracing::debug;

use super::provider::{ExternalSecretRef, ProviderSpec};
use super::store::SecretStoreRegistry;
use crate::error::SecretError;

/// Resolves secret references against the configured provider.
///
/// Every call builds a fresh store and reads the backend; values are never
/// cached and never logged.
#[derive(Debug, Clone, Default)]
pub struct SecretResolver {
    registry: SecretStoreRegistry,
}

impl SecretResolver {
    /// Creates a resolver over the given registry.
    #[must_use]
    pub const fn new(registry: SecretStoreRegistry) -> Self {
        Self { registry }
    }

    /// Returns the underlying registry.
    #[must_use]
    pub const fn registry(&self) -> &SecretStoreRegistry {
        &self.registry
    }

    /// Resolves a reference using the provider spec.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the provider spec is not exactly one valid provider,
    /// `ProviderNotRegistered` if no factory handles the provider, and
    /// whatever the store reports if the read fails.
    pub async fn resolve(
        &self,
        secret_ref: &ExternalSecretRef,
        provider: &ProviderSpec,
    ) -> Result<String, SecretError> {
        let kind = provider.validate()?;
        let store = self.registry.get(kind)?.create(provider)?;

        debug!(provider = %kind, secret = %secret_ref.name, "Resolving secret");
        store.get_secret(secret_ref).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::fake::FakeSecretStoreFactory;
    use crate::secrets::provider::{FakeProviderData, ProviderKind, VaultProvider};
    use crate::secrets::store::{MockSecretStore, SecretStore};

    fn fake_provider() -> ProviderSpec {
        ProviderSpec::fake(vec![FakeProviderData {
            key: String::from("api-key"),
            value: Some(String::from("s3cr3t")),
            ..FakeProviderData::default()
        }])
    }

    fn fake_resolver() -> SecretResolver {
        let mut registry = SecretStoreRegistry::new();
        let (kind, factory) = FakeSecretStoreFactory::shared();
        registry.register(kind, factory);
        SecretResolver::new(registry)
    }

    #[tokio::test]
    async fn test_resolve_through_fake_provider() {
        let value = fake_resolver()
            .resolve(&ExternalSecretRef::new("api-key"), &fake_provider())
            .await
            .expect("resolved");
        assert_eq!(value, "s3cr3t");
    }

    #[tokio::test]
    async fn test_missing_secret_is_an_error() {
        let result = fake_resolver()
            .resolve(&ExternalSecretRef::new("nope"), &fake_provider())
            .await;
        assert!(matches!(result, Err(SecretError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_invalid_provider_spec() {
        let result = fake_resolver()
            .resolve(&ExternalSecretRef::new("api-key"), &ProviderSpec::default())
            .await;
        assert!(matches!(result, Err(SecretError::Config(_))));
    }

    #[tokio::test]
    async fn test_unregistered_provider() {
        let provider = ProviderSpec {
            vault: Some(VaultProvider {
                server: String::from("https://vault.example.com:8200"),
                ..VaultProvider::default()
            }),
            ..ProviderSpec::default()
        };
        let result = fake_resolver()
            .resolve(&ExternalSecretRef::new("api-key"), &provider)
            .await;
        assert!(matches!(result, Err(SecretError::ProviderNotRegistered { .. })));
    }

    #[tokio::test]
    async fn test_every_resolve_reads_the_store() {
        let mut registry = SecretStoreRegistry::new();
        registry.register_fn(ProviderKind::Fake, |_provider| {
            let mut store = MockSecretStore::new();
            store
                .expect_get_secret()
                .times(1)
                .returning(|secret_ref| Ok(format!("value-of-{}", secret_ref.name)));
            Ok(Box::new(store) as Box<dyn SecretStore>)
        });
        let resolver = SecretResolver::new(registry);
        let provider = ProviderSpec::fake(vec![]);

        for _ in 0..2 {
            let value = resolver
                .resolve(&ExternalSecretRef::new("db"), &provider)
                .await
                .expect("resolved");
            assert_eq!(value, "value-of-db");
        }
    }
}
