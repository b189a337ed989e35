//! Project extensions that customize generated resources.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Kind of project extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtensionKind {
    /// Adds labels and annotations to Kubernetes resources.
    #[serde(rename = "kubernetesMetadata")]
    KubernetesMetadata,
    /// Moves namespaced Kubernetes resources to another namespace.
    #[serde(rename = "kubernetesNamespace")]
    KubernetesNamespace,
}

/// A project extension entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extension {
    /// Which extension this is.
    pub kind: ExtensionKind,

    /// Namespace settings, read when `kind` is `kubernetesNamespace`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_namespace: Option<KubeNamespaceExtension>,

    /// Metadata settings, read when `kind` is `kubernetesMetadata`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_metadata: Option<KubeMetadataExtension>,
}

/// Namespace override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeNamespaceExtension {
    /// Target namespace.
    #[serde(default)]
    pub namespace: String,
}

/// Labels and annotations to merge into Kubernetes metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeMetadataExtension {
    /// Labels to add.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Annotations to add.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extensions() {
        let yaml = r"
- kind: kubernetesNamespace
  kubernetesNamespace:
    namespace: team-a
- kind: kubernetesMetadata
  kubernetesMetadata:
    labels:
      owner: team-a
";
        let extensions: Vec<Extension> = serde_yaml::from_str(yaml).expect("valid yaml");
        assert_eq!(extensions[0].kind, ExtensionKind::KubernetesNamespace);
        assert_eq!(
            extensions[0].kubernetes_namespace.as_ref().map(|n| n.namespace.as_str()),
            Some("team-a")
        );
        let metadata = extensions[1].kubernetes_metadata.as_ref().expect("metadata");
        assert_eq!(metadata.labels["owner"], "team-a");
    }
}
