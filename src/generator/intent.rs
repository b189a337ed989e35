//! The mutable accumulator shared by generators.

use crate::resource::{Resource, Spec};

/// Resources collected so far during generation.
///
/// Generators append to the intent in pipeline order. Only the pipeline turns
/// it into a `Spec`, and only after every generator and patcher succeeded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Intent {
    resources: Vec<Resource>,
}

impl Intent {
    /// Creates an empty intent.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            resources: Vec::new(),
        }
    }

    /// Appends a resource.
    pub fn push(&mut self, resource: Resource) {
        self.resources.push(resource);
    }

    /// Appends several resources in order.
    pub fn extend(&mut self, resources: impl IntoIterator<Item = Resource>) {
        self.resources.extend(resources);
    }

    /// Returns the collected resources.
    #[must_use]
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Returns true if a resource with the ID was already generated.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.resources.iter().any(|r| r.id == id)
    }

    /// Returns the number of collected resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true if nothing was generated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub(crate) fn into_resources(self) -> Vec<Resource> {
        self.resources
    }
}

impl From<Intent> for Spec {
    fn from(intent: Intent) -> Self {
        Self::new(intent.resources)
    }
}
