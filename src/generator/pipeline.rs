//! Generator and patcher pipeline.
//!
//! Generators run one after another against a shared `Intent`. Patchers run
//! afterwards over the complete resource set. The first failure aborts the
//! pipeline and the partial output is dropped.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{debug, info};

use super::intent::Intent;
use super::patchers::{KubeConfigPatcher, MetadataPatcher, NamespacePatcher};
use crate::config::{Extension, ExtensionKind, GenericConfig, Workspace};
use crate::error::{ConfigError, GenerationError, Result, SecretError};
use crate::resource::{Resource, ResourceGraph, Spec};
use crate::secrets::{ExternalSecretRef, SecretResolver};

/// Inputs available to generators.
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext<'a> {
    /// Project being released.
    pub project: &'a str,
    /// Stack being released.
    pub stack: &'a str,
    /// Target workspace.
    pub workspace: &'a Workspace,
    /// Secret resolver bound to the workspace's secret store.
    pub secrets: &'a SecretResolver,
}

impl<'a> GenerationContext<'a> {
    /// Creates a generation context.
    #[must_use]
    pub const fn new(
        project: &'a str,
        stack: &'a str,
        workspace: &'a Workspace,
        secrets: &'a SecretResolver,
    ) -> Self {
        Self {
            project,
            stack,
            workspace,
            secrets,
        }
    }

    /// Returns the effective config of a module for the current project.
    ///
    /// # Errors
    ///
    /// Returns an error if two config blocks select the project.
    pub fn module_config(&self, module: &str) -> std::result::Result<Option<GenericConfig>, GenerationError> {
        Ok(self.workspace.module_config(module, self.project)?)
    }

    /// Resolves a secret through the workspace's secret store.
    ///
    /// # Errors
    ///
    /// Returns an error if no secret store is configured or the read fails.
    pub async fn resolve_secret(
        &self,
        secret_ref: &ExternalSecretRef,
    ) -> std::result::Result<String, GenerationError> {
        let store = self.workspace.secret_store.as_ref().ok_or_else(|| {
            SecretError::Config(ConfigError::InvalidSecretProvider {
                message: String::from("workspace has no secret store configured"),
            })
        })?;
        Ok(self.secrets.resolve(secret_ref, &store.provider).await?)
    }
}

/// Produces resources from configuration.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Appends generated resources to the intent.
    async fn generate(
        &self,
        intent: &mut Intent,
        ctx: &GenerationContext<'_>,
    ) -> std::result::Result<(), GenerationError>;
}

/// Applies a cross-cutting change to generated resources.
pub trait Patcher: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Mutates the resources in place.
    fn patch(&self, resources: &mut PatchSet) -> std::result::Result<(), GenerationError>;
}

/// Resources handed to patchers.
#[derive(Debug, Clone, Default)]
pub struct PatchSet {
    resources: Vec<Resource>,
}

impl PatchSet {
    /// Wraps resources for patching.
    #[must_use]
    pub const fn new(resources: Vec<Resource>) -> Self {
        Self { resources }
    }

    /// Groups the resources by kind, keeping declaration order within a kind.
    pub fn by_kind_mut(&mut self) -> BTreeMap<String, Vec<&mut Resource>> {
        let mut grouped: BTreeMap<String, Vec<&mut Resource>> = BTreeMap::new();
        for resource in &mut self.resources {
            grouped.entry(resource.kind_key()).or_default().push(resource);
        }
        grouped
    }

    /// Returns the resources in declaration order.
    #[must_use]
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Returns the resources mutably in declaration order.
    pub fn resources_mut(&mut self) -> &mut [Resource] {
        &mut self.resources
    }

    /// Consumes the set.
    #[must_use]
    pub fn into_resources(self) -> Vec<Resource> {
        self.resources
    }
}

/// Ordered generators and patchers.
#[derive(Default)]
pub struct Pipeline {
    generators: Vec<Box<dyn Generator>>,
    patchers: Vec<Box<dyn Patcher>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("generators", &self.generators.iter().map(|g| g.name()).collect::<Vec<_>>())
            .field("patchers", &self.patchers.iter().map(|p| p.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a generator.
    #[must_use]
    pub fn with_generator(mut self, generator: impl Generator + 'static) -> Self {
        self.generators.push(Box::new(generator));
        self
    }

    /// Appends a patcher.
    #[must_use]
    pub fn with_patcher(mut self, patcher: impl Patcher + 'static) -> Self {
        self.patchers.push(Box::new(patcher));
        self
    }

    /// Appends one patcher per project extension, in extension order.
    ///
    /// # Errors
    ///
    /// Returns an error if an extension lacks the block its kind requires.
    pub fn with_extensions(mut self, extensions: &[Extension]) -> std::result::Result<Self, ConfigError> {
        for (i, extension) in extensions.iter().enumerate() {
            match extension.kind {
                ExtensionKind::KubernetesNamespace => {
                    let ns = extension.kubernetes_namespace.as_ref().ok_or_else(|| {
                        ConfigError::validation(
                            "kubernetesNamespace extension requires a kubernetesNamespace block",
                            format!("extensions[{i}]"),
                        )
                    })?;
                    self.patchers
                        .push(Box::new(NamespacePatcher::new(ns.namespace.clone())));
                }
                ExtensionKind::KubernetesMetadata => {
                    let md = extension.kubernetes_metadata.as_ref().ok_or_else(|| {
                        ConfigError::validation(
                            "kubernetesMetadata extension requires a kubernetesMetadata block",
                            format!("extensions[{i}]"),
                        )
                    })?;
                    self.patchers.push(Box::new(MetadataPatcher::new(
                        md.labels.clone(),
                        md.annotations.clone(),
                    )));
                }
            }
        }
        Ok(self)
    }

    /// Appends the patchers derived from the workspace runtime config.
    #[must_use]
    pub fn with_workspace_patchers(mut self, workspace: &Workspace) -> Self {
        if let Some(kube_config) = workspace.kube_config() {
            self.patchers
                .push(Box::new(KubeConfigPatcher::new(kube_config)));
        }
        self
    }

    /// Returns the number of generators.
    #[must_use]
    pub fn generator_count(&self) -> usize {
        self.generators.len()
    }

    /// Returns the number of patchers.
    #[must_use]
    pub fn patcher_count(&self) -> usize {
        self.patchers.len()
    }

    /// Runs every generator, then every patcher, and returns the spec.
    ///
    /// # Errors
    ///
    /// Returns the first generator or patcher failure, or a graph error if
    /// the generated resources do not form a valid graph.
    pub async fn run(&self, ctx: &GenerationContext<'_>) -> Result<Spec> {
        let mut intent = Intent::new();

        for generator in &self.generators {
            debug!(generator = generator.name(), "Running generator");
            generator
                .generate(&mut intent, ctx)
                .await
                .map_err(|e| GenerationError::Generator {
                    name: generator.name().to_string(),
                    source: Box::new(e),
                })?;
        }

        let mut patch_set = PatchSet::new(intent.into_resources());
        for patcher in &self.patchers {
            debug!(patcher = patcher.name(), "Running patcher");
            patcher
                .patch(&mut patch_set)
                .map_err(|e| GenerationError::Patcher {
                    name: patcher.name().to_string(),
                    source: Box::new(e),
                })?;
        }

        let spec = Spec::new(patch_set.into_resources());
        ResourceGraph::build(&spec.resources)?;

        info!(
            project = ctx.project,
            stack = ctx.stack,
            resources = spec.len(),
            "Generated spec"
        );
        Ok(spec)
    }
}
