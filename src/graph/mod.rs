//! Core graph storage
//!
//! Implements the labeled property graph:
//! - Nodes with a name, ordered labels and scalar properties
//! - Directed, typed relationships identified by `(source, target, type)`
//! - Label index and identifier registry kept in step with every mutation

pub mod edge;
pub mod label_index;
pub mod node;
pub mod property;
pub mod registry;
pub mod store;
pub mod types;

// Re-export main types
pub use edge::Relationship;
pub use label_index::LabelIndex;
pub use node::Node;
pub use property::{PropertyMap, PropertyValue};
pub use registry::IdRegistry;
pub use store::{
    DeletedNode, EntityRef, GraphError, GraphExport, GraphResult, GraphStatistics, GraphStore,
    Upsert,
};
pub use types::{EdgeId, Label, NodeId, RelKey, RelType};
