//! Release plan types and construction.
//!
//! A plan assigns one action to every resource and records, per action, the
//! indices of the actions that must complete before it may start. Deletes
//! come first in destroy order; creates, updates, and no-ops follow in the
//! desired spec's apply order. A removed resource is deleted only after every
//! action on a resource that depended on it in the last state, so dependencies
//! may point forward in the action list.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::diff::{DiffResult, DiffType, ResourceDiff};
use crate::resource::{Resource, ResourceGraph, Spec, State};

/// An ordered set of actions moving recorded state to a desired spec.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Hash of the desired spec this plan is based on.
    pub spec_hash: String,
    /// Planned actions in a valid sequential order.
    pub actions: Vec<PlannedAction>,
}

/// A single planned action.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedAction {
    /// Action type.
    pub action_type: ActionType,
    /// Resource ID.
    pub resource_id: String,
    /// Desired resource, or the recorded one for deletes.
    pub resource: Resource,
    /// Recorded resource being changed, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<Resource>,
    /// Reason for this action.
    pub reason: String,
    /// Indices of actions that must complete first.
    pub dependencies: Vec<usize>,
}

/// Types of actions in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Create a new resource.
    Create,
    /// Update an existing resource in place.
    Update,
    /// Delete a resource.
    Delete,
    /// Nothing to do; completes immediately.
    NoOp,
}

impl Plan {
    /// Creates a plan from a diff and the graphs of both sides.
    #[must_use]
    pub fn from_diff(
        diff: &DiffResult,
        desired: &Spec,
        desired_graph: &ResourceGraph,
        last: &State,
        last_graph: &ResourceGraph,
        spec_hash: &str,
    ) -> Self {
        let diffs: HashMap<&str, &ResourceDiff> =
            diff.diffs.iter().map(|d| (d.id.as_str(), d)).collect();
        let mut actions = Vec::with_capacity(diff.diffs.len() + diff.replaces);

        // Deletes, dependents before dependencies
        let mut delete_index: HashMap<&str, usize> = HashMap::new();
        let mut removed: Vec<(&str, usize)> = Vec::new();
        for id in last_graph.destroy_order() {
            let Some(resource_diff) = diffs.get(id) else {
                continue;
            };
            let reason = match resource_diff.diff_type {
                DiffType::Delete => "Resource removed from spec",
                DiffType::Replace => "Resource type changed",
                _ => continue,
            };
            let Some(resource) = last.get(id) else {
                continue;
            };

            let dependencies = sorted(
                last_graph
                    .dependents_of(id)
                    .into_iter()
                    .filter_map(|dependent| delete_index.get(dependent).copied()),
            );

            if resource_diff.diff_type == DiffType::Delete {
                removed.push((id, actions.len()));
            }
            delete_index.insert(id, actions.len());
            actions.push(PlannedAction {
                action_type: ActionType::Delete,
                resource_id: id.to_string(),
                resource: resource.clone(),
                previous: None,
                reason: reason.to_string(),
                dependencies,
            });
        }

        // Creates, updates and no-ops, dependencies before dependents
        let mut desired_index: HashMap<&str, usize> = HashMap::new();
        for id in desired_graph.topological_order() {
            let (Some(resource_diff), Some(resource)) = (diffs.get(id), desired.get(id)) else {
                continue;
            };
            let (action_type, reason) = match resource_diff.diff_type {
                DiffType::Create => (ActionType::Create, String::from("Resource added to spec")),
                DiffType::Replace => (ActionType::Create, String::from("Resource type changed")),
                DiffType::Update => (ActionType::Update, update_reason(resource_diff)),
                DiffType::NoChange => (ActionType::NoOp, String::new()),
                DiffType::Delete => continue,
            };

            let mut dependencies = sorted(
                desired_graph
                    .dependencies_of(id)
                    .into_iter()
                    .filter_map(|dependency| desired_index.get(dependency).copied()),
            );
            if resource_diff.diff_type == DiffType::Replace
                && let Some(&delete) = delete_index.get(id)
            {
                dependencies.insert(0, delete);
            }

            let previous = match action_type {
                ActionType::Update => last.get(id).cloned(),
                _ => None,
            };

            desired_index.insert(id, actions.len());
            actions.push(PlannedAction {
                action_type,
                resource_id: id.to_string(),
                resource: resource.clone(),
                previous,
                reason,
                dependencies,
            });
        }

        // Kept dependents must move off a removed resource before it goes.
        // An edge that would close a cycle through a replacement is left out.
        for (id, delete) in removed {
            for dependent in last_graph.dependents_of(id) {
                if let Some(&kept) = desired_index.get(dependent)
                    && !waits_on(&actions, kept, delete)
                {
                    actions[delete].dependencies.push(kept);
                }
            }
            actions[delete].dependencies.sort_unstable();
            actions[delete].dependencies.dedup();
        }

        Self {
            created_at: Utc::now(),
            spec_hash: spec_hash.to_string(),
            actions,
        }
    }

    /// Returns true if the plan has no actions at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns true if any action changes a resource.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.actions.iter().any(|a| a.action_type != ActionType::NoOp)
    }

    /// Returns the number of actions.
    #[must_use]
    pub const fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Returns the number of actions of a given type.
    #[must_use]
    pub fn count(&self, action_type: ActionType) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .count()
    }

    /// Returns the first action for a resource ID.
    #[must_use]
    pub fn action_for(&self, id: &str) -> Option<&PlannedAction> {
        self.actions.iter().find(|a| a.resource_id == id)
    }

    /// Returns actions that can be executed immediately (no dependencies).
    #[must_use]
    pub fn ready_actions(&self) -> Vec<&PlannedAction> {
        self.actions
            .iter()
            .filter(|a| a.dependencies.is_empty())
            .collect()
    }

    /// Gets actions that depend on a specific action index.
    #[must_use]
    pub fn dependent_actions(&self, action_idx: usize) -> Vec<(usize, &PlannedAction)> {
        self.actions
            .iter()
            .enumerate()
            .filter(|(_, a)| a.dependencies.contains(&action_idx))
            .collect()
    }
}

fn sorted(indices: impl Iterator<Item = usize>) -> Vec<usize> {
    let mut indices: Vec<usize> = indices.collect();
    indices.sort_unstable();
    indices
}

/// Returns true if `from` transitively waits on `target`.
fn waits_on(actions: &[PlannedAction], from: usize, target: usize) -> bool {
    let mut seen = HashSet::new();
    let mut stack = vec![from];
    while let Some(index) = stack.pop() {
        if index == target {
            return true;
        }
        if seen.insert(index) {
            stack.extend(actions[index].dependencies.iter().copied());
        }
    }
    false
}

fn update_reason(diff: &ResourceDiff) -> String {
    let fields: Vec<&str> = diff.details.iter().map(|d| d.field.as_str()).collect();
    format!("Attributes changed: {}", fields.join(", "))
}

impl PlannedAction {
    /// Returns a human-readable description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        match self.action_type {
            ActionType::Create => format!("Create '{}'", self.resource_id),
            ActionType::Update => format!("Update '{}'", self.resource_id),
            ActionType::Delete => format!("Delete '{}'", self.resource_id),
            ActionType::NoOp => format!("No change for '{}'", self.resource_id),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::NoOp => "noop",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.action_type, self.resource_id)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.has_changes() {
            return write!(f, "No changes required");
        }

        writeln!(
            f,
            "Release Plan ({} to create, {} to update, {} to delete):",
            self.count(ActionType::Create),
            self.count(ActionType::Update),
            self.count(ActionType::Delete)
        )?;
        for (i, action) in self.actions.iter().enumerate() {
            if action.action_type != ActionType::NoOp {
                writeln!(f, "  {i}. {action}")?;
            }
        }
        Ok(())
    }
}
