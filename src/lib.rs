//! Knowgraph
//!
//! An in-memory labeled property graph engine: labeled nodes, typed and
//! attributed relationships, substring search, shortest paths, bulk CSV import
//! and single-slot checkpoints.
//!
//! # Modules
//!
//! - [`graph`]: nodes, relationships, properties, label index and id registry
//! - [`algo`]: deterministic breadth-first shortest path
//! - [`query`]: search, "ID or name" resolution and path queries
//! - [`loader`]: CSV bulk import with per-row failure reporting
//! - [`persistence`]: checkpoint documents, `save` and `init`
//! - [`db`]: [`GraphDb`], the shared handle that serialises mutations
//!
//! ## Example Usage
//!
//! ```rust
//! use knowgraph::graph::{GraphStore, Label, PropertyMap, PropertyValue};
//! use knowgraph::query::QueryEngine;
//!
//! let mut store = GraphStore::new();
//!
//! let mut props = PropertyMap::new();
//! props.insert("age".to_string(), PropertyValue::Integer(30));
//! let alice = store.create_node("Alice", ["Person"], props).unwrap();
//! let bob = store.create_node("Bob", ["Person"], PropertyMap::new()).unwrap();
//!
//! store.create_relationship(alice, bob, "KNOWS", PropertyMap::new()).unwrap();
//!
//! let persons = store.nodes_by_label(&Label::new("Person"));
//! assert_eq!(persons.len(), 2);
//!
//! let path = QueryEngine::new().find_path(&store, "alice", "Bob", None).unwrap();
//! assert_eq!(path.node_ids(), vec![alice, bob]);
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod config;
pub mod db;
pub mod graph;
pub mod loader;
pub mod persistence;
pub mod query;

// Re-export main types for convenience
pub use config::{ConfigError, EngineConfig};
pub use db::GraphDb;
pub use graph::{
    EntityRef, GraphError, GraphExport, GraphResult, GraphStatistics, GraphStore, Label, Node,
    NodeId, PropertyMap, PropertyValue, RelKey, RelType, Relationship, Upsert,
};
pub use loader::{ImportBatch, ImportError, ImportOptions, ImportReport, RowError, RowFailure};
pub use persistence::{
    InitMode, InitOutcome, InitSource, PersistenceError, PersistenceResult, SaveOutcome,
    SnapshotManager,
};
pub use query::{MatchRank, Path, QueryEngine, QueryError, QueryResult};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
