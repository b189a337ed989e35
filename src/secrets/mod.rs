//! Secret management.
//!
//! Generators refer to sensitive values through `ExternalSecretRef` and
//! resolve them at generation time against the workspace's secret store.

mod provider;
mod store;
mod fake;
mod resolver;

pub use provider::{
    AlicloudProvider, AwsProvider, AzureEnvironmentType, AzureKvProvider, ExternalSecretRef,
    FakeProvider, FakeProviderData, ProviderKind, ProviderSpec, SecretStoreSpec, VaultKvVersion,
    VaultProvider,
};
pub use store::{SecretStore, SecretStoreFactory, SecretStoreRegistry};
pub use fake::{FakeSecretStore, FakeSecretStoreFactory};
pub use resolver::SecretResolver;
