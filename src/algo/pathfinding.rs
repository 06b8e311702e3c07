//! Pathfinding algorithms
//!
//! Unweighted shortest path over the directed relationship graph.

use crate::graph::{GraphStore, NodeId, RelKey, RelType};
use std::collections::HashMap;

/// Result of a pathfinding algorithm
#[derive(Debug, Clone, PartialEq)]
pub struct PathResult {
    pub source: NodeId,
    pub target: NodeId,
    /// Nodes from source to target inclusive
    pub path: Vec<NodeId>,
    /// `relationships[i]` connects `path[i]` to `path[i + 1]`
    pub relationships: Vec<RelKey>,
}

impl PathResult {
    pub fn hops(&self) -> usize {
        self.relationships.len()
    }
}

/// Breadth-First Search (Unweighted Shortest Path)
///
/// Relationships are followed in their stored direction only. The search
/// expands one level at a time in ascending id order, so every node is reached
/// through its lowest-id predecessor on the previous level; between parallel
/// relationships the lowest type wins. Each node is visited at most once.
///
/// Returns `None` when either endpoint is missing or no directed path exists.
pub fn bfs(
    store: &GraphStore,
    source: NodeId,
    target: NodeId,
    rel_type: Option<&str>,
) -> Option<PathResult> {
    if !store.has_node(source) || !store.has_node(target) {
        return None;
    }

    let rel_type = rel_type.map(|t| RelType::normalized(t).unwrap_or_else(|| RelType::new(t)));

    // node -> (predecessor, type of the relationship used to reach it)
    let mut visited: HashMap<NodeId, Option<(NodeId, RelType)>> = HashMap::new();
    visited.insert(source, None);
    let mut frontier = vec![source];

    while !frontier.is_empty() && !visited.contains_key(&target) {
        frontier.sort_unstable();
        let mut next = Vec::new();

        for &current in &frontier {
            let mut edges = store.outgoing(current);
            edges.sort_by(|a, b| (a.target, &a.rel_type).cmp(&(b.target, &b.rel_type)));

            for edge in edges {
                if let Some(et) = &rel_type {
                    if &edge.rel_type != et {
                        continue;
                    }
                }
                if !visited.contains_key(&edge.target) {
                    visited.insert(edge.target, Some((current, edge.rel_type.clone())));
                    next.push(edge.target);
                }
            }
        }

        frontier = next;
    }

    if !visited.contains_key(&target) {
        return None;
    }

    // Reconstruct path
    let mut path = vec![target];
    let mut relationships = Vec::new();
    let mut current = target;
    while let Some(Some((parent, rel_type))) = visited.get(&current) {
        relationships.push(RelKey::new(*parent, current, rel_type.clone()));
        path.push(*parent);
        current = *parent;
    }
    path.reverse();
    relationships.reverse();

    Some(PathResult {
        source,
        target,
        path,
        relationships,
    })
}
