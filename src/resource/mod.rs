//! Resource model for Keel.
//!
//! This module holds the unit of deployment and everything derived from it:
//! - `Resource`, `Spec`, and `State` collections
//! - Canonical ID construction for Kubernetes and Terraform resources
//! - The dependency graph with its apply and destroy orders
//! - Content hashing for change detection

mod types;
mod id;
mod graph;
mod hash;

pub use types::{
    Attributes, EXTENSION_GVK, EXTENSION_KUBE_CONFIG, Resource, ResourceType, Spec, State,
};
pub use id::{ResourceId, kubernetes_gvk, kubernetes_resource_id, terraform_resource_id};
pub use graph::ResourceGraph;
pub use hash::SpecHasher;
