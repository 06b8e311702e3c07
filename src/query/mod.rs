//! Read-side queries over the graph
//!
//! - Substring search over node names, ranked by match quality
//! - "ID or name" resolution of user-supplied node references
//! - Unweighted shortest path between two resolved nodes

pub mod search;

pub use search::MatchRank;

use crate::algo::bfs;
use crate::graph::{GraphError, GraphStore, Node, NodeId, Relationship};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Errors produced by queries
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("No node matches '{0}'")]
    NotFound(String),

    #[error("'{reference}' is ambiguous: matches nodes {candidates:?}")]
    Ambiguous {
        reference: String,
        candidates: Vec<NodeId>,
    },

    #[error("No directed path from {from} to {to}")]
    PathNotFound { from: NodeId, to: NodeId },
}

pub type QueryResult<T> = Result<T, QueryError>;

/// A materialised shortest path
#[derive(Debug, Clone, Serialize)]
pub struct Path {
    pub nodes: Vec<Node>,
    pub relationships: Vec<Relationship>,
}

impl Path {
    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id).collect()
    }
}

/// Query engine - high-level interface for read queries
#[derive(Debug, Clone, Default)]
pub struct QueryEngine {
    search_limit: Option<usize>,
}

impl QueryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of search results
    pub fn with_search_limit(limit: Option<usize>) -> Self {
        Self {
            search_limit: limit,
        }
    }

    /// Nodes whose name contains `query` (case-insensitive) or whose id is
    /// `query`. Ordered exact id, exact name, substring; ties by ascending id.
    pub fn search<'a>(&self, store: &'a GraphStore, query: &str) -> Vec<&'a Node> {
        let hits = search::search(store, query);
        debug!("Search '{}' matched {} node(s)", query, hits.len());
        let limit = self.search_limit.unwrap_or(usize::MAX);
        hits.into_iter().take(limit).map(|(_, node)| node).collect()
    }

    /// Resolve an "ID or name" reference to exactly one node.
    ///
    /// An existing numeric id wins; otherwise the reference is matched against
    /// names ignoring case. Several nodes sharing the name is an error, never a
    /// silent pick.
    pub fn resolve(&self, store: &GraphStore, reference: &str) -> QueryResult<NodeId> {
        let reference = reference.trim();
        if let Ok(id) = reference.parse::<NodeId>() {
            if store.has_node(id) {
                return Ok(id);
            }
        }

        let mut candidates = store.nodes_named(reference);
        match candidates.len() {
            0 => Err(QueryError::NotFound(reference.to_string())),
            1 => Ok(candidates.remove(0)),
            _ => Err(QueryError::Ambiguous {
                reference: reference.to_string(),
                candidates,
            }),
        }
    }

    /// Shortest directed path between two node references
    pub fn find_path(
        &self,
        store: &GraphStore,
        start: &str,
        end: &str,
        rel_type: Option<&str>,
    ) -> QueryResult<Path> {
        let from = self.resolve(store, start)?;
        let to = self.resolve(store, end)?;

        let result = bfs(store, from, to, rel_type).ok_or(QueryError::PathNotFound { from, to })?;
        debug!("Path {} -> {}: {} hop(s)", from, to, result.hops());

        let nodes = result
            .path
            .iter()
            .map(|id| store.require_node(*id).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        let relationships = result
            .relationships
            .iter()
            .map(|key| store.require_relationship(key).cloned())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Path {
            nodes,
            relationships,
        })
    }
}
