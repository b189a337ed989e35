//! Configuration parser for workspace and spec files.
//!
//! This module loads workspace configuration and resource specs from YAML
//! (JSON is accepted as a YAML subset) and applies environment overrides.

use crate::error::{ConfigError, KeelError, Result};
use crate::resource::Spec;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::extension::Extension;
use super::workspace::{KubernetesConfig, RuntimeConfigs, Workspace};

/// Environment variable overriding the kubeconfig path.
pub const ENV_KUBECONFIG: &str = "KEEL_KUBECONFIG";

/// Environment variable overriding the workspace name.
pub const ENV_WORKSPACE_NAME: &str = "KEEL_WORKSPACE_NAME";

/// Configuration parser for workspace and spec files.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_path {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn read(&self, path: &Path) -> Result<(PathBuf, String)> {
        let path = self.resolve(path);
        if !path.exists() {
            return Err(KeelError::Config(ConfigError::FileNotFound { path }));
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            KeelError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;
        Ok((path, content))
    }

    /// Loads a workspace from a YAML file.
    ///
    /// The workspace name defaults to the file stem.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_workspace(&self, path: impl AsRef<Path>) -> Result<Workspace> {
        let (path, content) = self.read(path.as_ref())?;
        info!("Loading workspace from: {}", path.display());

        let mut workspace = self.parse_workspace_yaml(&content, Some(&path))?;
        if workspace.name.is_empty()
            && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
        {
            workspace.name = stem.to_string();
        }
        Ok(workspace)
    }

    /// Parses a workspace from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_workspace_yaml(&self, content: &str, source: Option<&Path>) -> Result<Workspace> {
        debug!("Parsing workspace configuration");
        let workspace: Workspace = parse_yaml(content, source)?;
        debug!("Parsed workspace with {} modules", workspace.modules.len());
        Ok(workspace)
    }

    /// Loads a workspace with environment variable overrides.
    ///
    /// Recognized variables are `KEEL_KUBECONFIG` and `KEEL_WORKSPACE_NAME`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<Workspace> {
        let mut workspace = self.load_workspace(path)?;
        Self::apply_env_overrides(&mut workspace);
        Ok(workspace)
    }

    /// Applies environment variable overrides to the workspace.
    pub fn apply_env_overrides(workspace: &mut Workspace) {
        if let Ok(kube_config) = std::env::var(ENV_KUBECONFIG) {
            debug!("Overriding runtimes.kubernetes.kubeConfig from environment");
            workspace
                .runtimes
                .get_or_insert_with(RuntimeConfigs::default)
                .kubernetes
                .get_or_insert_with(KubernetesConfig::default)
                .kube_config = kube_config;
        }

        if let Ok(name) = std::env::var(ENV_WORKSPACE_NAME) {
            debug!("Overriding workspace name from environment");
            workspace.name = name;
        }
    }

    /// Loads a resource spec from a YAML or JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_spec(&self, path: impl AsRef<Path>) -> Result<Spec> {
        let (path, content) = self.read(path.as_ref())?;
        info!("Loading spec from: {}", path.display());
        self.parse_spec_yaml(&content, Some(&path))
    }

    /// Parses a resource spec from a YAML or JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is invalid.
    pub fn parse_spec_yaml(&self, content: &str, source: Option<&Path>) -> Result<Spec> {
        let spec: Spec = parse_yaml(content, source)?;
        debug!("Parsed spec with {} resources", spec.len());
        Ok(spec)
    }

    /// Loads project extensions from a YAML or JSON file holding a list.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_extensions(&self, path: impl AsRef<Path>) -> Result<Vec<Extension>> {
        let (path, content) = self.read(path.as_ref())?;
        info!("Loading extensions from: {}", path.display());
        let extensions: Vec<Extension> = parse_yaml(&content, Some(&path))?;
        debug!("Parsed {} extensions", extensions.len());
        Ok(extensions)
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                KeelError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

fn parse_yaml<T: serde::de::DeserializeOwned>(content: &str, source: Option<&Path>) -> Result<T> {
    serde_yaml::from_str(content).map_err(|e| {
        KeelError::Config(ConfigError::ParseError {
            message: format!("YAML parse error: {e}"),
            location: source.map(|p| p.display().to_string()),
        })
    })
}

/// Default workspace file names to search for.
pub const DEFAULT_WORKSPACE_FILES: &[&str] = &["workspace.yaml", "workspace.yml", "keel.workspace.yaml"];

/// Finds the workspace file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no workspace file is found.
pub fn find_workspace_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_WORKSPACE_FILES {
            let candidate = current.join(filename);
            if candidate.exists() {
                info!("Found workspace file: {}", candidate.display());
                return Ok(candidate);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(KeelError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_WORKSPACE_FILES[0]),
    }))
}
