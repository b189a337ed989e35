//! Core resource types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::id::{ResourceId, kubernetes_gvk};

/// Extension key carrying the Kubernetes `GroupVersionKind` string.
pub const EXTENSION_GVK: &str = "GVK";

/// Extension key carrying the kubeconfig path for a Kubernetes resource.
pub const EXTENSION_KUBE_CONFIG: &str = "kubeConfig";

/// Opaque key/value payload of a resource.
pub type Attributes = Map<String, Value>;

/// Backend family a resource belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    /// A Kubernetes manifest.
    Kubernetes,
    /// A Terraform-managed resource.
    Terraform,
}

impl ResourceType {
    /// Returns the serialized name of this type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Kubernetes => "Kubernetes",
            Self::Terraform => "Terraform",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single declarative resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Unique identifier within a spec.
    pub id: String,

    /// Backend family.
    #[serde(rename = "type")]
    pub resource_type: ResourceType,

    /// Backend payload, compared structurally.
    #[serde(default)]
    pub attributes: Attributes,

    /// IDs this resource depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Metadata consumed by runtimes, never sent to the backend as payload.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Attributes,
}

impl Resource {
    /// Creates a resource with no dependencies or extensions.
    #[must_use]
    pub fn new(id: impl Into<String>, resource_type: ResourceType, attributes: Attributes) -> Self {
        Self {
            id: id.into(),
            resource_type,
            attributes,
            depends_on: Vec::new(),
            extensions: Map::new(),
        }
    }

    /// Adds a dependency on another resource ID.
    #[must_use]
    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    /// Sets an extension value.
    #[must_use]
    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }

    /// Returns true if both resources carry structurally equal attributes.
    ///
    /// Map key order does not matter.
    #[must_use]
    pub fn attributes_equal(&self, other: &Self) -> bool {
        self.attributes == other.attributes
    }

    /// Parses this resource's ID according to its type.
    #[must_use]
    pub fn parsed_id(&self) -> Option<ResourceId<'_>> {
        ResourceId::parse(&self.id, self.resource_type)
    }

    /// Returns the Kubernetes `GroupVersionKind` string of this resource.
    ///
    /// The `GVK` extension wins; otherwise it is derived from the ID.
    #[must_use]
    pub fn gvk(&self) -> Option<String> {
        if let Some(Value::String(gvk)) = self.extensions.get(EXTENSION_GVK) {
            return Some(gvk.clone());
        }
        match self.parsed_id()? {
            ResourceId::Kubernetes {
                api_version, kind, ..
            } => Some(kubernetes_gvk(api_version, kind)),
            ResourceId::Terraform { .. } => None,
        }
    }

    /// Returns the grouping kind used by patchers.
    ///
    /// Kubernetes resources group by `GroupVersionKind`, Terraform ones by
    /// `providerNamespace:providerName:resourceType`.
    #[must_use]
    pub fn kind_key(&self) -> String {
        match self.parsed_id() {
            Some(ResourceId::Terraform {
                provider_namespace,
                provider_name,
                resource_type,
                ..
            }) => format!("{provider_namespace}:{provider_name}:{resource_type}"),
            _ => self.gvk().unwrap_or_else(|| self.resource_type.to_string()),
        }
    }
}

macro_rules! resource_collection {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            /// Resources in declaration order.
            #[serde(default)]
            pub resources: Vec<Resource>,
        }

        impl $name {
            /// Creates a collection from resources.
            #[must_use]
            pub const fn new(resources: Vec<Resource>) -> Self {
                Self { resources }
            }

            /// Returns the number of resources.
            #[must_use]
            pub fn len(&self) -> usize {
                self.resources.len()
            }

            /// Returns true if there are no resources.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.resources.is_empty()
            }

            /// Looks up a resource by ID.
            #[must_use]
            pub fn get(&self, id: &str) -> Option<&Resource> {
                self.resources.iter().find(|r| r.id == id)
            }

            /// Returns true if a resource with the ID exists.
            #[must_use]
            pub fn contains(&self, id: &str) -> bool {
                self.get(id).is_some()
            }

            /// Iterates over the resource IDs in order.
            pub fn ids(&self) -> impl Iterator<Item = &str> {
                self.resources.iter().map(|r| r.id.as_str())
            }
        }

        impl From<Vec<Resource>> for $name {
            fn from(resources: Vec<Resource>) -> Self {
                Self::new(resources)
            }
        }
    };
}

resource_collection!(
    /// The desired set of resources produced by generation.
    Spec
);

resource_collection!(
    /// The set of resources recorded as actually applied.
    State
);

impl From<Spec> for State {
    fn from(spec: Spec) -> Self {
        Self::new(spec.resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_attribute_equality_ignores_key_order() {
        let a = Resource::new(
            "a",
            ResourceType::Terraform,
            attrs(json!({"x": 1, "y": {"b": 2, "a": 1}})),
        );
        let mut b = a.clone();
        b.attributes = serde_json::from_str(r#"{"y": {"a": 1, "b": 2}, "x": 1}"#)
            .expect("valid json");
        assert!(a.attributes_equal(&b));
    }

    #[test]
    fn test_resource_serialization_shape() {
        let resource = Resource::new("v1:Service:ns:web", ResourceType::Kubernetes, Map::new())
            .with_dependency("v1:Namespace::ns");
        let value = serde_json::to_value(&resource).expect("serialize");

        assert_eq!(value["type"], "Kubernetes");
        assert_eq!(value["dependsOn"][0], "v1:Namespace::ns");
        assert!(value.get("extensions").is_none());
    }

    #[test]
    fn test_gvk_prefers_extension() {
        let derived = Resource::new("apps/v1:Deployment:ns:web", ResourceType::Kubernetes, Map::new());
        assert_eq!(derived.gvk().as_deref(), Some("apps/v1, Kind=Deployment"));

        let explicit = derived.clone().with_extension(EXTENSION_GVK, "custom");
        assert_eq!(explicit.gvk().as_deref(), Some("custom"));
    }

    #[test]
    fn test_kind_key_for_terraform() {
        let resource = Resource::new(
            "hashicorp:aws:aws_s3_bucket:logs",
            ResourceType::Terraform,
            Map::new(),
        );
        assert_eq!(resource.kind_key(), "hashicorp:aws:aws_s3_bucket");
    }
}
