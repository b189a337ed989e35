//! Configuration module for Keel.
//!
//! This module handles all configuration-related functionality:
//! - Workspace files with per-module configs, runtimes, and secret store
//! - Project extensions customizing generated resources
//! - Loading YAML files with environment overrides
//! - Validation before any release is created

mod workspace;
mod extension;
mod parser;
mod validator;

pub use workspace::{
    Configs, DEFAULT_BLOCK, GenericConfig, KubernetesConfig, ModuleConfig, ModulePatcherConfig,
    RuntimeConfigs, TerraformProviderConfig, Workspace,
};
pub use extension::{Extension, ExtensionKind, KubeMetadataExtension, KubeNamespaceExtension};
pub use parser::{
    ConfigParser, DEFAULT_WORKSPACE_FILES, ENV_KUBECONFIG, ENV_WORKSPACE_NAME, find_workspace_file,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
