//! Content hashing for change detection.
//!
//! Hashes are computed over a canonical encoding of the resource so that
//! object key order never changes the result.

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::types::{Resource, Spec};

/// Hasher for resources and specs.
#[derive(Debug, Default)]
pub struct SpecHasher;

impl SpecHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the hash of a whole spec.
    ///
    /// Resource order is significant since it drives tie-breaking.
    #[must_use]
    pub fn hash_spec(&self, spec: &Spec) -> String {
        let mut hasher = Sha256::new();
        for resource in &spec.resources {
            hasher.update(self.hash_resource(resource).as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Computes the hash of a single resource.
    #[must_use]
    pub fn hash_resource(&self, resource: &Resource) -> String {
        let mut hasher = Sha256::new();

        hasher.update(resource.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(resource.resource_type.as_str().as_bytes());
        hasher.update([0u8]);

        let mut depends_on: Vec<_> = resource.depends_on.iter().collect();
        depends_on.sort();
        for dependency in depends_on {
            hasher.update(dependency.as_bytes());
            hasher.update([0u8]);
        }

        update_map(&mut hasher, resource.attributes.iter());
        update_map(&mut hasher, resource.extensions.iter());

        hex::encode(hasher.finalize())
    }

    /// Returns a short prefix of a hash for display.
    #[must_use]
    pub fn short_hash(hash: &str) -> &str {
        &hash[..hash.len().min(12)]
    }
}

fn update_map<'a>(hasher: &mut Sha256, entries: impl Iterator<Item = (&'a String, &'a Value)>) {
    let mut entries: Vec<_> = entries.collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    hasher.update(b"{");
    for (key, value) in entries {
        hasher.update(key.as_bytes());
        hasher.update(b":");
        update_value(hasher, value);
        hasher.update(b",");
    }
    hasher.update(b"}");
}

fn update_value(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Null => hasher.update(b"null"),
        Value::Bool(b) => hasher.update(if *b { b"true" as &[u8] } else { b"false" }),
        Value::Number(n) => hasher.update(n.to_string().as_bytes()),
        Value::String(s) => {
            hasher.update(b"\"");
            hasher.update(s.as_bytes());
            hasher.update(b"\"");
        }
        Value::Array(items) => {
            hasher.update(b"[");
            for item in items {
                update_value(hasher, item);
                hasher.update(b",");
            }
            hasher.update(b"]");
        }
        Value::Object(map) => update_map(hasher, map.iter()),
    }
}
