//! Secret store backed by static values from the workspace file.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::provider::{ExternalSecretRef, FakeProviderData, ProviderKind, ProviderSpec};
use super::store::{SecretStore, SecretStoreFactory};
use crate::error::{ConfigError, SecretError};

/// Serves secrets from a fixed list of entries.
#[derive(Debug, Clone, Default)]
pub struct FakeSecretStore {
    data: Vec<FakeProviderData>,
}

impl FakeSecretStore {
    /// Creates a store over the given entries.
    #[must_use]
    pub const fn new(data: Vec<FakeProviderData>) -> Self {
        Self { data }
    }

    fn find(&self, secret_ref: &ExternalSecretRef) -> Option<&FakeProviderData> {
        self.data.iter().find(|entry| {
            entry.key == secret_ref.name
                && secret_ref
                    .version
                    .as_ref()
                    .is_none_or(|version| entry.version.as_ref() == Some(version))
        })
    }
}

#[async_trait]
impl SecretStore for FakeSecretStore {
    async fn get_secret(&self, secret_ref: &ExternalSecretRef) -> Result<String, SecretError> {
        let entry = self.find(secret_ref).ok_or_else(|| SecretError::NotFound {
            name: secret_ref.name.clone(),
        })?;

        if let Some(property) = &secret_ref.property {
            debug!("Reading property {} of fake secret {}", property, secret_ref.name);
            return entry
                .value_map
                .get(property)
                .cloned()
                .ok_or_else(|| SecretError::PropertyNotFound {
                    name: secret_ref.name.clone(),
                    property: property.clone(),
                });
        }

        if let Some(value) = &entry.value {
            return Ok(value.clone());
        }
        if !entry.value_map.is_empty() {
            let object: serde_json::Map<String, Value> = entry
                .value_map
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            return Ok(Value::Object(object).to_string());
        }
        Err(SecretError::NotFound {
            name: secret_ref.name.clone(),
        })
    }
}

/// Factory creating `FakeSecretStore` from the `fake` provider block.
#[derive(Debug, Default)]
pub struct FakeSecretStoreFactory;

impl FakeSecretStoreFactory {
    /// Returns the factory as a shareable registry entry.
    #[must_use]
    pub fn shared() -> (ProviderKind, Arc<dyn SecretStoreFactory>) {
        (ProviderKind::Fake, Arc::new(Self))
    }
}

impl SecretStoreFactory for FakeSecretStoreFactory {
    fn create(&self, provider: &ProviderSpec) -> Result<Box<dyn SecretStore>, SecretError> {
        let fake = provider.fake.as_ref().ok_or_else(|| {
            SecretError::Config(ConfigError::InvalidSecretProvider {
                message: String::from("fake provider is not configured"),
            })
        })?;
        Ok(Box::new(FakeSecretStore::new(fake.data.clone())))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn store() -> FakeSecretStore {
        let mut value_map = BTreeMap::new();
        value_map.insert(String::from("user"), String::from("admin"));
        value_map.insert(String::from("password"), String::from("hunter2"));

        FakeSecretStore::new(vec![
            FakeProviderData {
                key: String::from("token"),
                value: Some(String::from("v1-token")),
                version: Some(String::from("1")),
                ..FakeProviderData::default()
            },
            FakeProviderData {
                key: String::from("token"),
                value: Some(String::from("v2-token")),
                version: Some(String::from("2")),
                ..FakeProviderData::default()
            },
            FakeProviderData {
                key: String::from("db"),
                value_map,
                ..FakeProviderData::default()
            },
        ])
    }

    #[tokio::test]
    async fn test_version_selection() {
        let store = store();
        let latest = store.get_secret(&ExternalSecretRef::new("token")).await.expect("found");
        assert_eq!(latest, "v1-token");

        let pinned = store
            .get_secret(&ExternalSecretRef::new("token").with_version("2"))
            .await
            .expect("found");
        assert_eq!(pinned, "v2-token");

        let missing = store
            .get_secret(&ExternalSecretRef::new("token").with_version("3"))
            .await;
        assert!(matches!(missing, Err(SecretError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_property_lookup() {
        let store = store();
        let user = store
            .get_secret(&ExternalSecretRef::new("db").with_property("user"))
            .await
            .expect("found");
        assert_eq!(user, "admin");

        let missing = store
            .get_secret(&ExternalSecretRef::new("db").with_property("host"))
            .await;
        assert!(matches!(missing, Err(SecretError::PropertyNotFound { .. })));
    }

    #[tokio::test]
    async fn test_whole_map_as_json() {
        let value = store()
            .get_secret(&ExternalSecretRef::new("db"))
            .await
            .expect("found");
        assert_eq!(value, r#"{"password":"hunter2","user":"admin"}"#);
    }

    #[test]
    fn test_factory_requires_fake_block() {
        let factory = FakeSecretStoreFactory;
        assert!(factory.create(&ProviderSpec::default()).is_err());
        assert!(factory.create(&ProviderSpec::fake(vec![])).is_ok());
    }
}
