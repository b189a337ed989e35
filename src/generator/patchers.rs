//! Built-in patchers driven by project extensions and workspace runtimes.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};
use tracing::debug;

use super::pipeline::{PatchSet, Patcher};
use crate::error::GenerationError;
use crate::resource::{
    Attributes, EXTENSION_KUBE_CONFIG, Resource, ResourceId, ResourceType, kubernetes_resource_id,
};

/// Returns `attributes[key]` as an object, creating it when absent.
fn object_mut<'a>(
    attributes: &'a mut Attributes,
    key: &str,
    id: &str,
) -> Result<&'a mut Map<String, Value>, GenerationError> {
    attributes
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| GenerationError::failed(format!("'{key}' of resource '{id}' is not an object")))
}

/// Moves namespaced Kubernetes resources into one namespace.
#[derive(Debug, Clone)]
pub struct NamespacePatcher {
    namespace: String,
}

impl NamespacePatcher {
    /// Creates a patcher targeting the namespace.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

impl Patcher for NamespacePatcher {
    fn name(&self) -> &str {
        "kubernetesNamespace"
    }

    fn patch(&self, resources: &mut PatchSet) -> Result<(), GenerationError> {
        if self.namespace.is_empty() {
            return Err(GenerationError::failed("target namespace cannot be empty"));
        }

        let mut renamed: HashMap<String, String> = HashMap::new();
        for resource in resources.resources_mut() {
            if resource.resource_type != ResourceType::Kubernetes {
                continue;
            }
            let new_id = match resource.parsed_id() {
                Some(ResourceId::Kubernetes {
                    api_version,
                    kind,
                    namespace,
                    name,
                }) if !namespace.is_empty() => {
                    kubernetes_resource_id(api_version, kind, &self.namespace, name)
                }
                _ => continue,
            };

            let id = resource.id.clone();
            object_mut(&mut resource.attributes, "metadata", &id)?
                .insert(String::from("namespace"), Value::String(self.namespace.clone()));

            if new_id != id {
                debug!(from = %id, to = %new_id, "Moving resource to namespace");
                resource.id.clone_from(&new_id);
                renamed.insert(id, new_id);
            }
        }

        if renamed.is_empty() {
            return Ok(());
        }
        for resource in resources.resources_mut() {
            for dependency in &mut resource.depends_on {
                if let Some(new_id) = renamed.get(dependency.as_str()) {
                    dependency.clone_from(new_id);
                }
            }
        }
        Ok(())
    }
}

/// Merges labels and annotations into Kubernetes resources.
#[derive(Debug, Clone, Default)]
pub struct MetadataPatcher {
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
}

impl MetadataPatcher {
    /// Creates a patcher adding the given labels and annotations.
    #[must_use]
    pub const fn new(labels: BTreeMap<String, String>, annotations: BTreeMap<String, String>) -> Self {
        Self {
            labels,
            annotations,
        }
    }

    fn merge(&self, metadata: &mut Map<String, Value>, id: &str) -> Result<(), GenerationError> {
        for (field, values) in [("labels", &self.labels), ("annotations", &self.annotations)] {
            if values.is_empty() {
                continue;
            }
            let target = object_mut(metadata, field, id)?;
            for (key, value) in values {
                target.insert(key.clone(), Value::String(value.clone()));
            }
        }
        Ok(())
    }

    fn patch_resource(&self, resource: &mut Resource) -> Result<(), GenerationError> {
        let id = resource.id.clone();
        self.merge(object_mut(&mut resource.attributes, "metadata", &id)?, &id)?;

        // Workloads carry a pod template that needs the same metadata.
        if let Some(template) = resource
            .attributes
            .get_mut("spec")
            .and_then(|spec| spec.get_mut("template"))
            .and_then(Value::as_object_mut)
        {
            self.merge(object_mut(template, "metadata", &id)?, &id)?;
        }
        Ok(())
    }
}

impl Patcher for MetadataPatcher {
    fn name(&self) -> &str {
        "kubernetesMetadata"
    }

    fn patch(&self, resources: &mut PatchSet) -> Result<(), GenerationError> {
        if self.labels.is_empty() && self.annotations.is_empty() {
            return Ok(());
        }
        for (kind, group) in resources.by_kind_mut() {
            for resource in group {
                if resource.resource_type != ResourceType::Kubernetes {
                    continue;
                }
                debug!(kind = %kind, id = %resource.id, "Merging metadata");
                self.patch_resource(resource)?;
            }
        }
        Ok(())
    }
}

/// Points Kubernetes resources at the workspace kubeconfig.
#[derive(Debug, Clone)]
pub struct KubeConfigPatcher {
    kube_config: String,
}

impl KubeConfigPatcher {
    /// Creates a patcher using the kubeconfig path.
    #[must_use]
    pub fn new(kube_config: impl Into<String>) -> Self {
        Self {
            kube_config: kube_config.into(),
        }
    }
}

impl Patcher for KubeConfigPatcher {
    fn name(&self) -> &str {
        "kubeConfig"
    }

    fn patch(&self, resources: &mut PatchSet) -> Result<(), GenerationError> {
        for resource in resources.resources_mut() {
            if resource.resource_type == ResourceType::Kubernetes
                && !resource.extensions.contains_key(EXTENSION_KUBE_CONFIG)
            {
                resource.extensions.insert(
                    EXTENSION_KUBE_CONFIG.to_string(),
                    Value::String(self.kube_config.clone()),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn kube(id: &str, attributes: Value) -> Resource {
        let attributes = match attributes {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Resource::new(id, ResourceType::Kubernetes, attributes)
    }

    #[test]
    fn test_namespace_patcher_rewrites_ids_and_dependencies() {
        let mut set = PatchSet::new(vec![
            kube("v1:Namespace::old", json!({"metadata": {"name": "old"}})),
            kube("v1:ConfigMap:old:settings", json!({"metadata": {"name": "settings", "namespace": "old"}})),
            kube("apps/v1:Deployment:old:web", json!({"metadata": {"name": "web"}}))
                .with_dependency("v1:ConfigMap:old:settings")
                .with_dependency("v1:Namespace::old"),
            Resource::new("hashicorp:aws:aws_s3_bucket:logs", ResourceType::Terraform, Map::new()),
        ]);

        NamespacePatcher::new("team-a").patch(&mut set).expect("patched");
        let resources = set.resources();

        assert_eq!(resources[0].id, "v1:Namespace::old");
        assert!(resources[0].attributes["metadata"].get("namespace").is_none());
        assert_eq!(resources[1].id, "v1:ConfigMap:team-a:settings");
        assert_eq!(resources[1].attributes["metadata"]["namespace"], "team-a");
        assert_eq!(resources[2].id, "apps/v1:Deployment:team-a:web");
        assert_eq!(
            resources[2].depends_on,
            vec!["v1:ConfigMap:team-a:settings", "v1:Namespace::old"]
        );
        assert_eq!(resources[3].id, "hashicorp:aws:aws_s3_bucket:logs");
    }

    #[test]
    fn test_namespace_patcher_rejects_non_object_metadata() {
        let mut set = PatchSet::new(vec![kube("v1:ConfigMap:old:x", json!({"metadata": "oops"}))]);
        assert!(NamespacePatcher::new("team-a").patch(&mut set).is_err());
    }

    #[test]
    fn test_metadata_patcher_overrides_existing_keys() {
        let mut set = PatchSet::new(vec![
            kube(
                "apps/v1:Deployment:ns:web",
                json!({
                    "metadata": {"labels": {"owner": "old", "tier": "web"}},
                    "spec": {"template": {"spec": {}}}
                }),
            ),
            Resource::new("hashicorp:aws:aws_s3_bucket:logs", ResourceType::Terraform, Map::new()),
        ]);
        let labels = BTreeMap::from([(String::from("owner"), String::from("team-a"))]);
        let annotations = BTreeMap::from([(String::from("note"), String::from("managed"))]);

        MetadataPatcher::new(labels, annotations)
            .patch(&mut set)
            .expect("patched");
        let deployment = &set.resources()[0].attributes;

        assert_eq!(deployment["metadata"]["labels"]["owner"], "team-a");
        assert_eq!(deployment["metadata"]["labels"]["tier"], "web");
        assert_eq!(deployment["metadata"]["annotations"]["note"], "managed");
        assert_eq!(deployment["spec"]["template"]["metadata"]["labels"]["owner"], "team-a");
        assert!(set.resources()[1].attributes.is_empty());
    }

    #[test]
    fn test_kube_config_patcher_keeps_explicit_value() {
        let mut set = PatchSet::new(vec![
            kube("v1:Service:ns:a", json!({})),
            kube("v1:Service:ns:b", json!({})).with_extension(EXTENSION_KUBE_CONFIG, "/custom"),
        ]);

        KubeConfigPatcher::new("/etc/kube.yaml")
            .patch(&mut set)
            .expect("patched");

        assert_eq!(set.resources()[0].extensions[EXTENSION_KUBE_CONFIG], "/etc/kube.yaml");
        assert_eq!(set.resources()[1].extensions[EXTENSION_KUBE_CONFIG], "/custom");
    }
}
