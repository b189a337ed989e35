//! Diff engine for comparing a desired spec against recorded state.
//!
//! Resources are matched by ID. The engine also compares recorded state
//! against live observations to report drift.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::plan::Plan;
use crate::error::GraphError;
use crate::resource::{Resource, ResourceGraph, Spec, SpecHasher, State};

/// Engine for computing diffs between desired and recorded states.
#[derive(Debug, Default)]
pub struct DiffEngine {
    /// Resource hasher.
    hasher: SpecHasher,
}

/// Difference for a single resource.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceDiff {
    /// Resource ID.
    pub id: String,
    /// Type of difference.
    pub diff_type: DiffType,
    /// Top-level attribute changes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<DiffDetail>,
    /// Hash of the recorded resource (if any).
    pub old_hash: Option<String>,
    /// Hash of the desired resource (if any).
    pub new_hash: Option<String>,
}

/// Type of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffType {
    /// Resource exists only in the desired spec.
    Create,
    /// Resource exists in both with different attributes.
    Update,
    /// Resource exists only in the recorded state.
    Delete,
    /// Resource changed type and must be deleted then recreated.
    Replace,
    /// Resource is unchanged.
    NoChange,
}

/// Detail about a specific attribute difference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffDetail {
    /// Top-level attribute key.
    pub field: String,
    /// Old value.
    pub old_value: Option<Value>,
    /// New value.
    pub new_value: Option<Value>,
}

/// Complete diff result.
#[derive(Debug, Clone, Serialize)]
pub struct DiffResult {
    /// All resource diffs: desired resources first, then removals.
    pub diffs: Vec<ResourceDiff>,
    /// Number of resources to create.
    pub creates: usize,
    /// Number of resources to update.
    pub updates: usize,
    /// Number of resources to delete.
    pub deletes: usize,
    /// Number of resources to replace.
    pub replaces: usize,
    /// Number of unchanged resources.
    pub unchanged: usize,
}

/// How a recorded resource differs from what is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftKind {
    /// The resource no longer exists in the backend.
    Missing,
    /// The backend holds different values for recorded attributes.
    Modified,
}

/// A single drifted resource.
#[derive(Debug, Clone, Serialize)]
pub struct DriftEntry {
    /// Resource ID.
    pub id: String,
    /// Kind of drift.
    pub kind: DriftKind,
    /// Attribute changes, from recorded (old) to live (new).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<DiffDetail>,
}

/// Report of drift between recorded state and live resources.
#[derive(Debug, Clone, Serialize)]
pub struct DriftReport {
    /// Whether drift was detected.
    pub has_drift: bool,
    /// Drifted resources.
    pub entries: Vec<DriftEntry>,
    /// Total recorded resources.
    pub total_resources: usize,
    /// Number of recorded resources found live.
    pub observed_count: usize,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: SpecHasher::new(),
        }
    }

    /// Builds an ordered plan that moves `last` to `desired`.
    ///
    /// # Errors
    ///
    /// Returns a `GraphError` if either side fails graph validation.
    pub fn plan(&self, desired: &Spec, last: &State) -> Result<Plan, GraphError> {
        let desired_graph = ResourceGraph::build(&desired.resources)?;
        let last_graph = ResourceGraph::build(&last.resources)?;
        let diff = self.compute_diff(desired, last);

        Ok(Plan::from_diff(
            &diff,
            desired,
            &desired_graph,
            last,
            &last_graph,
            &self.hasher.hash_spec(desired),
        ))
    }

    /// Computes the per-resource diff between desired spec and recorded state.
    #[must_use]
    pub fn compute_diff(&self, desired: &Spec, last: &State) -> DiffResult {
        let last_by_id: HashMap<&str, &Resource> =
            last.resources.iter().map(|r| (r.id.as_str(), r)).collect();
        let desired_ids: HashSet<&str> = desired.ids().collect();

        let mut diffs = Vec::with_capacity(desired.len() + last.len());

        for resource in &desired.resources {
            let new_hash = self.hasher.hash_resource(resource);
            let diff = match last_by_id.get(resource.id.as_str()) {
                None => {
                    debug!("Resource {} needs to be created", resource.id);
                    ResourceDiff {
                        id: resource.id.clone(),
                        diff_type: DiffType::Create,
                        details: vec![],
                        old_hash: None,
                        new_hash: Some(new_hash),
                    }
                }
                Some(previous) => {
                    let diff_type = if previous.resource_type != resource.resource_type {
                        debug!(
                            "Resource {} changed type from {} to {}",
                            resource.id, previous.resource_type, resource.resource_type
                        );
                        DiffType::Replace
                    } else if previous.attributes_equal(resource) {
                        DiffType::NoChange
                    } else {
                        debug!("Resource {} needs update", resource.id);
                        DiffType::Update
                    };

                    let details = if diff_type == DiffType::NoChange {
                        vec![]
                    } else {
                        attribute_details(previous, resource)
                    };

                    ResourceDiff {
                        id: resource.id.clone(),
                        diff_type,
                        details,
                        old_hash: Some(self.hasher.hash_resource(previous)),
                        new_hash: Some(new_hash),
                    }
                }
            };
            diffs.push(diff);
        }

        for resource in &last.resources {
            if !desired_ids.contains(resource.id.as_str()) {
                debug!("Resource {} no longer desired", resource.id);
                diffs.push(ResourceDiff {
                    id: resource.id.clone(),
                    diff_type: DiffType::Delete,
                    details: vec![],
                    old_hash: Some(self.hasher.hash_resource(resource)),
                    new_hash: None,
                });
            }
        }

        let count = |t: DiffType| diffs.iter().filter(|d| d.diff_type == t).count();
        DiffResult {
            creates: count(DiffType::Create),
            updates: count(DiffType::Update),
            deletes: count(DiffType::Delete),
            replaces: count(DiffType::Replace),
            unchanged: count(DiffType::NoChange),
            diffs,
        }
    }

    /// Compares recorded state against live resources keyed by ID.
    ///
    /// Only attributes present in the recorded resource are compared, so
    /// fields the backend fills in on its own never count as drift.
    #[must_use]
    pub fn detect_drift(&self, recorded: &State, live: &HashMap<String, Resource>) -> DriftReport {
        let mut entries = Vec::new();
        let mut observed_count = 0;

        for resource in &recorded.resources {
            let Some(observed) = live.get(&resource.id) else {
                debug!("Resource {} is missing from the backend", resource.id);
                entries.push(DriftEntry {
                    id: resource.id.clone(),
                    kind: DriftKind::Missing,
                    details: vec![],
                });
                continue;
            };
            observed_count += 1;

            let details: Vec<DiffDetail> = resource
                .attributes
                .iter()
                .filter(|(key, value)| observed.attributes.get(*key) != Some(*value))
                .map(|(key, value)| DiffDetail {
                    field: key.clone(),
                    old_value: Some(value.clone()),
                    new_value: observed.attributes.get(key).cloned(),
                })
                .collect();

            if !details.is_empty() {
                debug!("Resource {} has drifted", resource.id);
                entries.push(DriftEntry {
                    id: resource.id.clone(),
                    kind: DriftKind::Modified,
                    details,
                });
            }
        }

        DriftReport {
            has_drift: !entries.is_empty(),
            entries,
            total_resources: recorded.len(),
            observed_count,
        }
    }
}

/// Lists top-level attribute keys whose values differ, sorted by key.
fn attribute_details(previous: &Resource, desired: &Resource) -> Vec<DiffDetail> {
    let mut keys: Vec<&String> = previous
        .attributes
        .keys()
        .chain(desired.attributes.keys())
        .collect();
    keys.sort();
    keys.dedup();

    keys.into_iter()
        .filter_map(|key| {
            let old_value = previous.attributes.get(key);
            let new_value = desired.attributes.get(key);
            (old_value != new_value).then(|| DiffDetail {
                field: key.clone(),
                old_value: old_value.cloned(),
                new_value: new_value.cloned(),
            })
        })
        .collect()
}

impl DiffResult {
    /// Returns true if there are any changes.
    #[must_use]
    pub const fn has_changes(&self) -> bool {
        self.total_changes() > 0
    }

    /// Returns the total number of changes.
    #[must_use]
    pub const fn total_changes(&self) -> usize {
        self.creates + self.updates + self.deletes + self.replaces
    }

    /// Filters to only diffs that require action.
    #[must_use]
    pub fn actionable_diffs(&self) -> Vec<&ResourceDiff> {
        self.diffs
            .iter()
            .filter(|d| d.diff_type != DiffType::NoChange)
            .collect()
    }
}

impl DriftReport {
    /// Returns true if every recorded resource matches the backend.
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        !self.has_drift
    }
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Replace => "replace",
            Self::NoChange => "no change",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ResourceDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.id, self.diff_type)?;
        if !self.details.is_empty() {
            let fields: Vec<&str> = self.details.iter().map(|d| d.field.as_str()).collect();
            write!(f, " ({})", fields.join(", "))?;
        }
        Ok(())
    }
}

impl std::fmt::Display for DriftKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Missing => "missing",
            Self::Modified => "modified",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.has_drift {
            writeln!(
                f,
                "Drift detected in {} of {} resources:",
                self.entries.len(),
                self.total_resources
            )?;
            for entry in &self.entries {
                writeln!(f, "  - {}: {}", entry.id, entry.kind)?;
            }
        } else {
            writeln!(f, "No drift detected ({} resources)", self.total_resources)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceType;
    use serde_json::json;

    fn resource(id: &str, attributes: Value) -> Resource {
        let attributes = match attributes {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Resource::new(id, ResourceType::Terraform, attributes)
    }

    #[test]
    fn test_partitions_every_id() {
        let desired = Spec::new(vec![
            resource("keep", json!({"a": 1})),
            resource("change", json!({"a": 2})),
            resource("new", json!({})),
        ]);
        let last = State::new(vec![
            resource("keep", json!({"a": 1})),
            resource("change", json!({"a": 1})),
            resource("gone", json!({})),
        ]);

        let result = DiffEngine::new().compute_diff(&desired, &last);
        let kinds: Vec<(&str, DiffType)> =
            result.diffs.iter().map(|d| (d.id.as_str(), d.diff_type)).collect();

        assert_eq!(
            kinds,
            vec![
                ("keep", DiffType::NoChange),
                ("change", DiffType::Update),
                ("new", DiffType::Create),
                ("gone", DiffType::Delete),
            ]
        );
        assert_eq!(result.total_changes(), 3);
        assert_eq!(result.actionable_diffs().len(), 3);
    }

    #[test]
    fn test_key_order_is_not_an_update() {
        let desired = Spec::new(vec![resource("r", json!({"x": 1, "y": 2}))]);
        let mut recorded = resource("r", json!({}));
        recorded.attributes = serde_json::from_str(r#"{"y": 2, "x": 1}"#).expect("valid json");
        let last = State::new(vec![recorded]);

        let result = DiffEngine::new().compute_diff(&desired, &last);
        assert!(!result.has_changes());
    }

    #[test]
    fn test_update_details() {
        let desired = Spec::new(vec![resource("r", json!({"size": 2, "name": "db"}))]);
        let last = State::new(vec![resource("r", json!({"size": 1, "name": "db", "old": true}))]);

        let result = DiffEngine::new().compute_diff(&desired, &last);
        let fields: Vec<&str> = result.diffs[0].details.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["old", "size"]);
    }

    #[test]
    fn test_type_change_is_replace() {
        let desired = Spec::new(vec![Resource::new("r", ResourceType::Kubernetes, serde_json::Map::new())]);
        let last = State::new(vec![resource("r", json!({}))]);

        let result = DiffEngine::new().compute_diff(&desired, &last);
        assert_eq!(result.diffs[0].diff_type, DiffType::Replace);
        assert_eq!(result.replaces, 1);
    }

    #[test]
    fn test_drift_detection() {
        let recorded = State::new(vec![
            resource("same", json!({"a": 1})),
            resource("changed", json!({"a": 1})),
            resource("missing", json!({})),
        ]);
        let mut live = HashMap::new();
        live.insert("same".to_string(), resource("same", json!({"a": 1, "status": "ready"})));
        live.insert("changed".to_string(), resource("changed", json!({"a": 5})));

        let report = DiffEngine::new().detect_drift(&recorded, &live);

        assert!(report.has_drift);
        assert_eq!(report.observed_count, 2);
        let kinds: Vec<(&str, DriftKind)> =
            report.entries.iter().map(|e| (e.id.as_str(), e.kind)).collect();
        assert_eq!(
            kinds,
            vec![("changed", DriftKind::Modified), ("missing", DriftKind::Missing)]
        );
    }

    #[test]
    fn test_no_drift() {
        let recorded = State::new(vec![resource("a", json!({"a": 1}))]);
        let mut live = HashMap::new();
        live.insert("a".to_string(), resource("a", json!({"a": 1})));

        let report = DiffEngine::new().detect_drift(&recorded, &live);
        assert!(report.is_converged());
        assert!(report.to_string().contains("No drift"));
    }
}
