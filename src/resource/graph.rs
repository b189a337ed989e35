//! Resource dependency graph.
//!
//! Nodes are resource IDs and an edge `a -> b` means `a` depends on `b`.
//! Building a graph validates ID uniqueness, resolves every `dependsOn`
//! entry, and rejects cycles. The apply order is a topological sort that
//! breaks ties by declaration order, so equal inputs always produce equal
//! orders.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use super::types::Resource;
use crate::error::GraphError;

/// A validated, acyclic dependency graph over resource IDs.
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    /// `dependencies[n]` lists the nodes `n` depends on.
    dependencies: Vec<Vec<usize>>,
    /// `dependents[n]` lists the nodes depending on `n`.
    dependents: Vec<Vec<usize>>,
    order: Vec<usize>,
}

impl ResourceGraph {
    /// Builds the graph for a set of resources.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateId` if two resources share an ID,
    /// `DanglingDependency` if a `dependsOn` entry names no resource, and
    /// `CyclicDependency` if the dependency relation has a cycle.
    pub fn build(resources: &[Resource]) -> Result<Self, GraphError> {
        let mut index = HashMap::with_capacity(resources.len());
        for (position, resource) in resources.iter().enumerate() {
            if index.insert(resource.id.clone(), position).is_some() {
                return Err(GraphError::DuplicateId {
                    id: resource.id.clone(),
                });
            }
        }

        let mut dependencies = vec![Vec::new(); resources.len()];
        let mut dependents = vec![Vec::new(); resources.len()];
        for (node, resource) in resources.iter().enumerate() {
            for dependency in &resource.depends_on {
                let Some(&target) = index.get(dependency) else {
                    return Err(GraphError::DanglingDependency {
                        id: resource.id.clone(),
                        dependency: dependency.clone(),
                    });
                };
                if dependencies[node].contains(&target) {
                    continue;
                }
                dependencies[node].push(target);
                dependents[target].push(node);
            }
        }

        let ids: Vec<String> = resources.iter().map(|r| r.id.clone()).collect();
        let order = kahn_order(&dependencies, &dependents);

        if order.len() < ids.len() {
            let cycle = find_cycle(&dependencies, &order)
                .into_iter()
                .map(|n| ids[n].clone())
                .collect();
            return Err(GraphError::CyclicDependency { cycle });
        }

        debug!(nodes = ids.len(), "Built resource graph");

        Ok(Self {
            ids,
            index,
            dependencies,
            dependents,
            order,
        })
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns true if the ID is a node of this graph.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Returns IDs in apply order: every resource after its dependencies.
    #[must_use]
    pub fn topological_order(&self) -> Vec<&str> {
        self.order.iter().map(|&n| self.ids[n].as_str()).collect()
    }

    /// Returns IDs in destroy order: every resource before its dependencies.
    #[must_use]
    pub fn destroy_order(&self) -> Vec<&str> {
        self.order.iter().rev().map(|&n| self.ids[n].as_str()).collect()
    }

    /// Returns the IDs the given resource depends on.
    #[must_use]
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        self.neighbours(id, &self.dependencies)
    }

    /// Returns the IDs that depend on the given resource.
    #[must_use]
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        self.neighbours(id, &self.dependents)
    }

    fn neighbours<'a>(&'a self, id: &str, edges: &[Vec<usize>]) -> Vec<&'a str> {
        self.index
            .get(id)
            .map(|&n| edges[n].iter().map(|&m| self.ids[m].as_str()).collect())
            .unwrap_or_default()
    }
}

/// Kahn's algorithm, always releasing the lowest declaration index first.
///
/// Returns fewer nodes than the graph has when a cycle blocks progress.
fn kahn_order(dependencies: &[Vec<usize>], dependents: &[Vec<usize>]) -> Vec<usize> {
    let mut pending: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut ready: BTreeSet<usize> = pending
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(n, _)| n)
        .collect();

    let mut order = Vec::with_capacity(dependencies.len());
    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &dependent in &dependents[node] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }
    order
}

/// Extracts one cycle from the nodes Kahn's algorithm could not order.
///
/// Every unordered node has at least one unordered dependency, so walking
/// those edges from any unordered node must revisit a node.
fn find_cycle(dependencies: &[Vec<usize>], ordered: &[usize]) -> Vec<usize> {
    let mut blocked = vec![true; dependencies.len()];
    for &n in ordered {
        blocked[n] = false;
    }

    let Some(start) = blocked.iter().position(|b| *b) else {
        return Vec::new();
    };

    let mut path = Vec::new();
    let mut seen_at = HashMap::new();
    let mut current = start;
    loop {
        if let Some(&position) = seen_at.get(&current) {
            return path.split_off(position);
        }
        seen_at.insert(current, path.len());
        path.push(current);

        match dependencies[current].iter().find(|&&d| blocked[d]) {
            Some(&next) => current = next,
            None => return path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceType;
    use serde_json::Map;

    fn resource(id: &str, deps: &[&str]) -> Resource {
        deps.iter().fold(
            Resource::new(id, ResourceType::Terraform, Map::new()),
            |r, d| r.with_dependency(*d),
        )
    }

    #[test]
    fn test_dependencies_come_first() {
        let resources = vec![resource("app", &["db", "net"]), resource("db", &["net"]), resource("net", &[])];
        let graph = ResourceGraph::build(&resources).expect("valid graph");

        assert_eq!(graph.topological_order(), vec!["net", "db", "app"]);
        assert_eq!(graph.destroy_order(), vec!["app", "db", "net"]);
    }

    #[test]
    fn test_ties_broken_by_declaration_order() {
        let resources = vec![resource("c", &[]), resource("a", &[]), resource("b", &["c"])];
        let graph = ResourceGraph::build(&resources).expect("valid graph");
        assert_eq!(graph.topological_order(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_order_is_deterministic() {
        let resources = vec![
            resource("x", &[]),
            resource("y", &["x"]),
            resource("z", &["x"]),
            resource("w", &["y", "z"]),
        ];
        let first = ResourceGraph::build(&resources).expect("valid graph");
        let second = ResourceGraph::build(&resources).expect("valid graph");
        assert_eq!(first.topological_order(), second.topological_order());
    }

    #[test]
    fn test_duplicate_id() {
        let resources = vec![resource("a", &[]), resource("a", &[])];
        assert_eq!(
            ResourceGraph::build(&resources).unwrap_err(),
            GraphError::DuplicateId { id: "a".to_string() }
        );
    }

    #[test]
    fn test_dangling_dependency() {
        let resources = vec![resource("a", &["ghost"])];
        assert_eq!(
            ResourceGraph::build(&resources).unwrap_err(),
            GraphError::DanglingDependency {
                id: "a".to_string(),
                dependency: "ghost".to_string(),
            }
        );
    }

    #[test]
    fn test_two_node_cycle() {
        let resources = vec![resource("a", &["b"]), resource("b", &["a"])];
        match ResourceGraph::build(&resources) {
            Err(GraphError::CyclicDependency { cycle }) => {
                assert_eq!(cycle, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_cycle() {
        let resources = vec![resource("ok", &[]), resource("loop", &["loop"])];
        match ResourceGraph::build(&resources) {
            Err(GraphError::CyclicDependency { cycle }) => assert_eq!(cycle, vec!["loop".to_string()]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_reported_without_tail() {
        let resources = vec![
            resource("entry", &["a"]),
            resource("a", &["b"]),
            resource("b", &["c"]),
            resource("c", &["a"]),
        ];
        match ResourceGraph::build(&resources) {
            Err(GraphError::CyclicDependency { cycle }) => {
                assert_eq!(cycle, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_neighbours() {
        let resources = vec![resource("a", &[]), resource("b", &["a", "a"])];
        let graph = ResourceGraph::build(&resources).expect("valid graph");
        assert_eq!(graph.dependencies_of("b"), vec!["a"]);
        assert_eq!(graph.dependents_of("a"), vec!["b"]);
        assert!(graph.dependencies_of("missing").is_empty());
    }

    #[test]
    fn test_empty_graph() {
        let graph = ResourceGraph::build(&[]).expect("valid graph");
        assert!(graph.is_empty());
        assert!(graph.topological_order().is_empty());
    }
}
