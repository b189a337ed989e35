//! Secret store provider configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Points to a value held by an external secret store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSecretRef {
    /// Name of the secret, mandatory.
    pub name: String,

    /// Version of the secret to return, if the provider supports versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Property to select when the secret is a map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
}

impl ExternalSecretRef {
    /// Creates a reference to the latest version of a whole secret.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            property: None,
        }
    }

    /// Selects a specific version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Selects a property of a map secret.
    #[must_use]
    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }
}

/// Workspace-level secret store configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretStoreSpec {
    /// The configured provider.
    #[serde(default)]
    pub provider: ProviderSpec,
}

/// Provider-specific configuration. Exactly one provider must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpec {
    /// Alicloud Secrets Manager.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alicloud: Option<AlicloudProvider>,

    /// AWS Secrets Manager.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsProvider>,

    /// `HashiCorp` Vault.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault: Option<VaultProvider>,

    /// Azure Key Vault.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure: Option<AzureKvProvider>,

    /// Static values, for tests and local development.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fake: Option<FakeProvider>,
}

/// Kind of secret provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Alicloud Secrets Manager.
    Alicloud,
    /// AWS Secrets Manager.
    Aws,
    /// `HashiCorp` Vault.
    Vault,
    /// Azure Key Vault.
    Azure,
    /// Static values.
    Fake,
}

/// Alicloud Secrets Manager settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlicloudProvider {
    /// Region, e.g. `cn-beijing`.
    #[serde(default)]
    pub region: String,
}

/// AWS Secrets Manager settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsProvider {
    /// Region, e.g. `us-east-1`.
    #[serde(default)]
    pub region: String,

    /// Named profile; the default profile is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

/// Vault KV secret engine version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultKvVersion {
    /// KV version 1.
    V1,
    /// KV version 2.
    #[default]
    V2,
}

/// `HashiCorp` Vault settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultProvider {
    /// Server address, e.g. `https://vault.example.com:8200`.
    #[serde(default)]
    pub server: String,

    /// Mount path of the KV engine, e.g. `secret`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// KV engine version.
    #[serde(default)]
    pub version: VaultKvVersion,
}

/// Azure cloud environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AzureEnvironmentType {
    /// Public cloud.
    #[default]
    PublicCloud,
    /// US government cloud.
    #[serde(rename = "USGovernmentCloud")]
    UsGovernmentCloud,
    /// China cloud.
    ChinaCloud,
    /// German cloud.
    GermanCloud,
}

/// Azure Key Vault settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureKvProvider {
    /// Vault URL.
    #[serde(default)]
    pub vault_url: Option<String>,

    /// Tenant ID.
    #[serde(default)]
    pub tenant_id: Option<String>,

    /// Cloud environment.
    #[serde(default)]
    pub environment_type: AzureEnvironmentType,
}

/// Fake provider returning static values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FakeProvider {
    /// Static entries.
    #[serde(default)]
    pub data: Vec<FakeProviderData>,
}

/// A single static entry of the fake provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FakeProviderData {
    /// Secret name.
    pub key: String,

    /// Plain value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Map value, addressed by property.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub value_map: BTreeMap<String, String>,

    /// Version of this entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ProviderSpec {
    /// Creates a spec with only the fake provider set.
    #[must_use]
    pub fn fake(data: Vec<FakeProviderData>) -> Self {
        Self {
            fake: Some(FakeProvider { data }),
            ..Self::default()
        }
    }

    /// Returns the single configured provider kind.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSecretProvider` if zero or several providers are set.
    pub fn kind(&self) -> Result<ProviderKind, ConfigError> {
        let configured: Vec<ProviderKind> = [
            (self.alicloud.is_some(), ProviderKind::Alicloud),
            (self.aws.is_some(), ProviderKind::Aws),
            (self.vault.is_some(), ProviderKind::Vault),
            (self.azure.is_some(), ProviderKind::Azure),
            (self.fake.is_some(), ProviderKind::Fake),
        ]
        .into_iter()
        .filter_map(|(set, kind)| set.then_some(kind))
        .collect();

        match configured.as_slice() {
            [kind] => Ok(*kind),
            [] => Err(ConfigError::InvalidSecretProvider {
                message: String::from("no provider configured"),
            }),
            many => Err(ConfigError::InvalidSecretProvider {
                message: format!(
                    "exactly one provider may be configured, found: {}",
                    many.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
                ),
            }),
        }
    }

    /// Checks that exactly one provider is set and its required fields are present.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSecretProvider` describing the first problem found.
    pub fn validate(&self) -> Result<ProviderKind, ConfigError> {
        let kind = self.kind()?;
        let missing = |field: &str| ConfigError::InvalidSecretProvider {
            message: format!("{kind} provider requires '{field}'"),
        };

        match kind {
            ProviderKind::Alicloud => {
                if self.alicloud.as_ref().is_none_or(|p| p.region.is_empty()) {
                    return Err(missing("region"));
                }
            }
            ProviderKind::Aws => {
                if self.aws.as_ref().is_none_or(|p| p.region.is_empty()) {
                    return Err(missing("region"));
                }
            }
            ProviderKind::Vault => {
                if self.vault.as_ref().is_none_or(|p| p.server.is_empty()) {
                    return Err(missing("server"));
                }
            }
            ProviderKind::Azure => {
                let azure = self.azure.as_ref();
                if azure.is_none_or(|p| p.vault_url.as_deref().unwrap_or_default().is_empty()) {
                    return Err(missing("vaultUrl"));
                }
                if azure.is_none_or(|p| p.tenant_id.as_deref().unwrap_or_default().is_empty()) {
                    return Err(missing("tenantId"));
                }
            }
            ProviderKind::Fake => {}
        }
        Ok(kind)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Alicloud => "alicloud",
            Self::Aws => "aws",
            Self::Vault => "vault",
            Self::Azure => "azure",
            Self::Fake => "fake",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_one_provider() {
        assert_eq!(ProviderSpec::fake(vec![]).kind().expect("fake"), ProviderKind::Fake);

        assert!(ProviderSpec::default().kind().is_err());

        let both = ProviderSpec {
            aws: Some(AwsProvider {
                region: String::from("us-east-1"),
                profile: None,
            }),
            ..ProviderSpec::fake(vec![])
        };
        let err = both.kind().unwrap_err();
        assert!(err.to_string().contains("aws, fake"));
    }

    #[test]
    fn test_required_fields() {
        let vault = ProviderSpec {
            vault: Some(VaultProvider::default()),
            ..ProviderSpec::default()
        };
        assert!(vault.validate().unwrap_err().to_string().contains("server"));

        let azure = ProviderSpec {
            azure: Some(AzureKvProvider {
                vault_url: Some(String::from("https://kv.vault.azure.net")),
                ..AzureKvProvider::default()
            }),
            ..ProviderSpec::default()
        };
        assert!(azure.validate().unwrap_err().to_string().contains("tenantId"));
    }

    #[test]
    fn test_parse_provider_yaml() {
        let yaml = r"
provider:
  vault:
    server: https://vault.example.com:8200
    path: secret
  ";
        let spec: SecretStoreSpec = serde_yaml::from_str(yaml).expect("valid yaml");
        let vault = spec.provider.vault.as_ref().expect("vault configured");
        assert_eq!(vault.version, VaultKvVersion::V2);
        assert_eq!(spec.provider.validate().expect("valid"), ProviderKind::Vault);
    }

    #[test]
    fn test_parse_azure_environment() {
        let yaml = r"
vaultUrl: https://kv.vault.azure.net
tenantId: tenant
environmentType: USGovernmentCloud
";
        let azure: AzureKvProvider = serde_yaml::from_str(yaml).expect("valid yaml");
        assert_eq!(azure.environment_type, AzureEnvironmentType::UsGovernmentCloud);
    }
}
