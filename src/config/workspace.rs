//! Workspace configuration types.
//!
//! A workspace describes one target environment: per-module configuration
//! with project-specific overrides, the runtimes used to reach the
//! environment, and the secret store generators read from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::secrets::SecretStoreSpec;

/// Reserved name of the default config block of a module.
pub const DEFAULT_BLOCK: &str = "default";

/// Free-form module configuration.
pub type GenericConfig = Map<String, Value>;

/// Root workspace configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    /// Workspace name. Usually taken from the file or the command line.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Module configuration keyed by module name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub modules: BTreeMap<String, ModuleConfig>,

    /// Runtime access configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtimes: Option<RuntimeConfigs>,

    /// Secret store configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_store: Option<SecretStoreSpec>,
}

/// Configuration of one module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Module source path.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,

    /// Module version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    /// Default block plus named patcher blocks.
    #[serde(default)]
    pub configs: Configs,
}

/// Module config blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configs {
    /// Values applied to every project.
    #[serde(default)]
    pub default: GenericConfig,

    /// Named override blocks, each selecting projects.
    #[serde(flatten)]
    pub patchers: BTreeMap<String, ModulePatcherConfig>,
}

/// A named override block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModulePatcherConfig {
    /// Values overriding the default block.
    #[serde(flatten)]
    pub config: GenericConfig,

    /// Projects this block applies to.
    #[serde(default)]
    pub project_selector: Vec<String>,
}

/// Runtime access configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfigs {
    /// Kubernetes cluster access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<KubernetesConfig>,

    /// Terraform providers keyed by provider name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub terraform: BTreeMap<String, TerraformProviderConfig>,
}

/// Kubernetes cluster access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesConfig {
    /// Path of the kubeconfig file.
    #[serde(default)]
    pub kube_config: String,
}

/// A Terraform provider block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerraformProviderConfig {
    /// Provider source, e.g. `hashicorp/aws`.
    #[serde(default)]
    pub source: String,

    /// Provider version.
    #[serde(default)]
    pub version: String,

    /// Provider-specific settings.
    #[serde(flatten)]
    pub config: GenericConfig,
}

impl Workspace {
    /// Returns the effective config of a module for a project.
    ///
    /// # Errors
    ///
    /// Returns `ProjectSelectedTwice` if two blocks select the project.
    pub fn module_config(
        &self,
        module: &str,
        project: &str,
    ) -> Result<Option<GenericConfig>, ConfigError> {
        self.modules
            .get(module)
            .map(|config| config.config_for_project(module, project))
            .transpose()
    }

    /// Returns the kubeconfig path, if configured.
    #[must_use]
    pub fn kube_config(&self) -> Option<&str> {
        self.runtimes
            .as_ref()?
            .kubernetes
            .as_ref()
            .map(|k| k.kube_config.as_str())
            .filter(|path| !path.is_empty())
    }
}

impl ModuleConfig {
    /// Returns the default block shallow-overlaid with the block selecting the project.
    ///
    /// # Errors
    ///
    /// Returns `ProjectSelectedTwice` if two blocks select the project.
    pub fn config_for_project(&self, module: &str, project: &str) -> Result<GenericConfig, ConfigError> {
        let mut selected: Option<(&String, &ModulePatcherConfig)> = None;
        for (name, block) in &self.configs.patchers {
            if !block.project_selector.iter().any(|p| p == project) {
                continue;
            }
            if let Some((first, _)) = selected {
                return Err(ConfigError::ProjectSelectedTwice {
                    module: module.to_string(),
                    project: project.to_string(),
                    first: first.clone(),
                    second: name.clone(),
                });
            }
            selected = Some((name, block));
        }

        let mut config = self.configs.default.clone();
        if let Some((_, block)) = selected {
            for (key, value) in &block.config {
                config.insert(key.clone(), value.clone());
            }
        }
        Ok(config)
    }
}
