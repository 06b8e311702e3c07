//! Substring search over node names

use crate::graph::{GraphStore, Node, NodeId};
use crate::graph::registry::name_key;

/// How well a node matched a search query. Lower sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchRank {
    /// The query is the node's id
    ExactId,
    /// The query equals the node's name, ignoring case
    ExactName,
    /// The query occurs inside the node's name, ignoring case
    Substring,
}

/// Rank every matching node. Blank queries match nothing.
pub fn search<'a>(store: &'a GraphStore, query: &str) -> Vec<(MatchRank, &'a Node)> {
    let needle = name_key(query);
    if needle.is_empty() {
        return Vec::new();
    }
    let id_hit = query.parse::<NodeId>().ok();

    let mut hits: Vec<(MatchRank, &Node)> = store
        .all_nodes()
        .filter_map(|node| {
            if Some(node.id) == id_hit {
                return Some((MatchRank::ExactId, node));
            }
            let name = node.name.to_lowercase();
            if name == needle {
                Some((MatchRank::ExactName, node))
            } else if name.contains(&needle) {
                Some((MatchRank::Substring, node))
            } else {
                None
            }
        })
        .collect();

    hits.sort_by_key(|(rank, node)| (*rank, node.id));
    hits
}
