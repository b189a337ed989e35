//! Canonical resource identifiers.
//!
//! Kubernetes IDs take the form `apiVersion:kind:namespace:name`, with an
//! empty namespace segment for cluster-scoped objects. Terraform IDs take the
//! form `providerNamespace:providerName:resourceType:resourceName`.

use super::types::ResourceType;

/// Separator between ID segments.
pub const SEPARATOR: char = ':';

/// Builds the ID of a Kubernetes resource.
#[must_use]
pub fn kubernetes_resource_id(api_version: &str, kind: &str, namespace: &str, name: &str) -> String {
    format!("{api_version}{SEPARATOR}{kind}{SEPARATOR}{namespace}{SEPARATOR}{name}")
}

/// Builds the ID of a Terraform resource.
#[must_use]
pub fn terraform_resource_id(
    provider_namespace: &str,
    provider_name: &str,
    resource_type: &str,
    resource_name: &str,
) -> String {
    format!(
        "{provider_namespace}{SEPARATOR}{provider_name}{SEPARATOR}{resource_type}{SEPARATOR}{resource_name}"
    )
}

/// Formats a Kubernetes `GroupVersionKind` string.
#[must_use]
pub fn kubernetes_gvk(api_version: &str, kind: &str) -> String {
    format!("{api_version}, Kind={kind}")
}

/// A parsed resource ID borrowing from the original string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceId<'a> {
    /// Kubernetes object identity.
    Kubernetes {
        /// API version, e.g. `apps/v1`.
        api_version: &'a str,
        /// Object kind.
        kind: &'a str,
        /// Namespace; empty for cluster-scoped objects.
        namespace: &'a str,
        /// Object name.
        name: &'a str,
    },
    /// Terraform resource identity.
    Terraform {
        /// Provider namespace, e.g. `hashicorp`.
        provider_namespace: &'a str,
        /// Provider name, e.g. `aws`.
        provider_name: &'a str,
        /// Resource type, e.g. `aws_s3_bucket`.
        resource_type: &'a str,
        /// Resource name.
        resource_name: &'a str,
    },
}

impl<'a> ResourceId<'a> {
    /// Parses an ID of the given type.
    ///
    /// Returns `None` unless the ID has exactly four segments.
    #[must_use]
    pub fn parse(id: &'a str, resource_type: ResourceType) -> Option<Self> {
        let mut parts = id.split(SEPARATOR);
        let (a, b, c, d) = (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }

        let parsed = match resource_type {
            ResourceType::Kubernetes => Self::Kubernetes {
                api_version: a,
                kind: b,
                namespace: c,
                name: d,
            },
            ResourceType::Terraform => Self::Terraform {
                provider_namespace: a,
                provider_name: b,
                resource_type: c,
                resource_name: d,
            },
        };
        Some(parsed)
    }

    /// Returns true for cluster-scoped Kubernetes objects.
    #[must_use]
    pub const fn is_cluster_scoped(&self) -> bool {
        matches!(self, Self::Kubernetes { namespace, .. } if namespace.is_empty())
    }
}

impl std::fmt::Display for ResourceId<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Kubernetes {
                api_version,
                kind,
                namespace,
                name,
            } => kubernetes_resource_id(api_version, kind, namespace, name),
            Self::Terraform {
                provider_namespace,
                provider_name,
                resource_type,
                resource_name,
            } => terraform_resource_id(provider_namespace, provider_name, resource_type, resource_name),
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kubernetes_id_round_trip() {
        let id = kubernetes_resource_id("apps/v1", "Deployment", "default", "web");
        assert_eq!(id, "apps/v1:Deployment:default:web");

        let parsed = ResourceId::parse(&id, ResourceType::Kubernetes).expect("valid id");
        assert_eq!(parsed.to_string(), id);
        assert!(!parsed.is_cluster_scoped());
    }

    #[test]
    fn test_cluster_scoped_id() {
        let id = kubernetes_resource_id("v1", "Namespace", "", "prod");
        let parsed = ResourceId::parse(&id, ResourceType::Kubernetes).expect("valid id");
        assert!(parsed.is_cluster_scoped());
    }

    #[test]
    fn test_terraform_id() {
        let id = terraform_resource_id("hashicorp", "aws", "aws_db_instance", "main");
        match ResourceId::parse(&id, ResourceType::Terraform) {
            Some(ResourceId::Terraform { resource_type, .. }) => {
                assert_eq!(resource_type, "aws_db_instance");
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_ids_rejected() {
        assert!(ResourceId::parse("a:b:c", ResourceType::Kubernetes).is_none());
        assert!(ResourceId::parse("a:b:c:d:e", ResourceType::Terraform).is_none());
    }
}
