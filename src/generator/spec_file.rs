//! Generator reading a pre-rendered spec document.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use super::intent::Intent;
use super::pipeline::{GenerationContext, Generator};
use crate::config::ConfigParser;
use crate::error::{GenerationError, KeelError};

/// Appends every resource of a YAML or JSON spec file to the intent.
#[derive(Debug, Clone)]
pub struct SpecFileGenerator {
    path: PathBuf,
}

impl SpecFileGenerator {
    /// Creates a generator reading the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Generator for SpecFileGenerator {
    fn name(&self) -> &str {
        "specFile"
    }

    async fn generate(
        &self,
        intent: &mut Intent,
        _ctx: &GenerationContext<'_>,
    ) -> Result<(), GenerationError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            GenerationError::failed(format!("Failed to read {}: {e}", self.path.display()))
        })?;

        let spec = ConfigParser::new()
            .parse_spec_yaml(&content, Some(&self.path))
            .map_err(|e| match e {
                KeelError::Config(config) => GenerationError::Config(config),
                other => GenerationError::failed(other.to_string()),
            })?;

        info!("Loaded {} resources from {}", spec.len(), self.path.display());
        intent.extend(spec.resources);
        Ok(())
    }
}
