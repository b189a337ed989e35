//! Configuration validation for workspaces and project extensions.
//!
//! Validation runs before any release is created so that configuration
//! problems never leave a failed release behind.

use crate::error::{ConfigError, KeelError, Result};
use std::collections::HashMap;
use tracing::debug;

use super::extension::{Extension, ExtensionKind};
use super::workspace::{DEFAULT_BLOCK, ModuleConfig, RuntimeConfigs, Workspace};
use crate::secrets::SecretStoreSpec;

/// Validator for workspace configuration.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a workspace.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate(&self, workspace: &Workspace) -> Result<ValidationResult> {
        let result = self.check(workspace);
        Self::into_outcome(result)
    }

    /// Validates a workspace and returns every finding without failing.
    #[must_use]
    pub fn check(&self, workspace: &Workspace) -> ValidationResult {
        let mut result = ValidationResult::default();

        if workspace.modules.is_empty() {
            result.warnings.push(String::from("No modules configured in workspace"));
        }
        for (name, module) in &workspace.modules {
            Self::validate_module(name, module, &mut result);
        }
        if let Some(runtimes) = &workspace.runtimes {
            Self::validate_runtimes(runtimes, &mut result);
        }
        if let Some(secret_store) = &workspace.secret_store {
            Self::validate_secret_store(secret_store, &mut result);
        }

        result
    }

    /// Validates project extensions.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate_extensions(&self, extensions: &[Extension]) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        for (i, extension) in extensions.iter().enumerate() {
            let field = format!("extensions[{i}]");
            match extension.kind {
                ExtensionKind::KubernetesNamespace => match &extension.kubernetes_namespace {
                    Some(ns) if ns.namespace.is_empty() => result.errors.push(ValidationError {
                        field: format!("{field}.kubernetesNamespace.namespace"),
                        message: String::from("Namespace cannot be empty"),
                    }),
                    Some(_) => {}
                    None => result.errors.push(ValidationError {
                        field,
                        message: String::from("kubernetesNamespace extension requires a kubernetesNamespace block"),
                    }),
                },
                ExtensionKind::KubernetesMetadata => match &extension.kubernetes_metadata {
                    Some(md) if md.labels.is_empty() && md.annotations.is_empty() => {
                        result.warnings.push(format!("{field} adds no labels or annotations"));
                    }
                    Some(_) => {}
                    None => result.errors.push(ValidationError {
                        field,
                        message: String::from("kubernetesMetadata extension requires a kubernetesMetadata block"),
                    }),
                },
            }
        }

        Self::into_outcome(result)
    }

    fn into_outcome(result: ValidationResult) -> Result<ValidationResult> {
        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(KeelError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Validates one module's config blocks.
    fn validate_module(name: &str, module: &ModuleConfig, result: &mut ValidationResult) {
        let prefix = format!("modules.{name}");

        if !is_valid_name(name) {
            result.errors.push(ValidationError {
                field: prefix.clone(),
                message: format!(
                    "Module name '{name}' is invalid. Must start with a letter and contain only letters, digits, '-' or '_'."
                ),
            });
        }

        if module.configs.default.is_empty() && module.configs.patchers.is_empty() {
            result.warnings.push(format!("Module '{name}' has no configuration"));
        }

        let mut selected_by: HashMap<&str, &str> = HashMap::new();
        for (block, patcher) in &module.configs.patchers {
            let field = format!("{prefix}.configs.{block}");

            if block == DEFAULT_BLOCK {
                result.errors.push(ValidationError {
                    field: field.clone(),
                    message: format!("Patcher block cannot be named '{DEFAULT_BLOCK}'"),
                });
            }

            if patcher.project_selector.is_empty() {
                result.warnings.push(format!("{field} selects no projects"));
            }

            for project in &patcher.project_selector {
                if project.is_empty() {
                    result.errors.push(ValidationError {
                        field: format!("{field}.projectSelector"),
                        message: String::from("Project selector entries cannot be empty"),
                    });
                    continue;
                }
                if let Some(first) = selected_by.insert(project.as_str(), block.as_str()) {
                    result.errors.push(ValidationError {
                        field: format!("{field}.projectSelector"),
                        message: format!(
                            "Project '{project}' is selected by both '{first}' and '{block}' in module '{name}'"
                        ),
                    });
                }
            }
        }
    }

    /// Validates runtime access configuration.
    fn validate_runtimes(runtimes: &RuntimeConfigs, result: &mut ValidationResult) {
        if let Some(kubernetes) = &runtimes.kubernetes
            && kubernetes.kube_config.is_empty()
        {
            result.warnings.push(String::from(
                "runtimes.kubernetes.kubeConfig is empty; the default kubeconfig will be used",
            ));
        }

        for (name, provider) in &runtimes.terraform {
            if provider.source.is_empty() {
                result.errors.push(ValidationError {
                    field: format!("runtimes.terraform.{name}.source"),
                    message: format!("Terraform provider '{name}' must declare a source"),
                });
            }
            if provider.version.is_empty() {
                result
                    .warnings
                    .push(format!("Terraform provider '{name}' has no pinned version"));
            }
        }
    }

    /// Validates the secret store provider.
    fn validate_secret_store(secret_store: &SecretStoreSpec, result: &mut ValidationResult) {
        if let Err(e) = secret_store.provider.validate() {
            result.errors.push(ValidationError {
                field: String::from("secretStore.provider"),
                message: e.to_string(),
            });
        }
    }
}

/// Checks if a module name is valid.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_alphabetic() && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
