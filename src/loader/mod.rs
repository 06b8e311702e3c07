//! Bulk loader
//!
//! Ingests node and relationship records with partial-success semantics:
//! every row either lands in the graph or is recorded in an [`ImportReport`]
//! with the reason it was rejected. A bad row never aborts the batch.

pub mod csv_io;

pub use csv_io::{
    parse_node_csv, parse_relationship_csv, write_node_csv, write_relationship_csv,
    NODE_TEMPLATE, RELATIONSHIP_TEMPLATE,
};

use crate::graph::{GraphError, GraphStore, NodeId, PropertyMap, Upsert};
use crate::query::{QueryEngine, QueryError};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Label given to imported nodes that carry none
pub const DEFAULT_LABEL: &str = "Unknown";

/// Type given to imported relationships that carry none
pub const DEFAULT_REL_TYPE: &str = "RELATED_TO";

/// Hard import failures. The whole batch is unusable.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{stream} input is missing required column '{column}'")]
    MissingColumn {
        stream: RowStream,
        column: &'static str,
    },
}

pub type ImportResult<T> = Result<T, ImportError>;

/// Why a single row was rejected
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum RowError {
    #[error("malformed row: {0}")]
    Malformed(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("unresolved reference '{0}'")]
    UnresolvedReference(String),

    #[error("ambiguous reference '{reference}' matches nodes {candidates:?}")]
    AmbiguousReference {
        reference: String,
        candidates: Vec<NodeId>,
    },

    #[error("rejected: {0}")]
    Rejected(String),
}

impl From<GraphError> for RowError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::NodeAlreadyExists(id) => {
                RowError::Duplicate(format!("node id {} already in use", id))
            }
            other => RowError::Rejected(other.to_string()),
        }
    }
}

/// Which input stream a row came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowStream {
    Nodes,
    Relationships,
}

impl fmt::Display for RowStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowStream::Nodes => write!(f, "node"),
            RowStream::Relationships => write!(f, "relationship"),
        }
    }
}

/// A node record ready to apply
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub id: Option<NodeId>,
    pub name: String,
    pub labels: Vec<String>,
    pub properties: PropertyMap,
}

impl NodeRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            labels: Vec::new(),
            properties: PropertyMap::new(),
        }
    }

    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }
}

/// A relationship record. Endpoints are "ID or name" references.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipRecord {
    pub source: String,
    pub target: String,
    pub rel_type: Option<String>,
    pub properties: PropertyMap,
}

impl RelationshipRecord {
    pub fn new(source: impl Into<String>, target: impl Into<String>, rel_type: &str) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            rel_type: Some(rel_type.to_string()),
            properties: PropertyMap::new(),
        }
    }
}

/// A parsed row, or the reason it could not be parsed
pub type Row<T> = Result<T, RowError>;

/// Both input streams of one import
#[derive(Debug, Clone, Default)]
pub struct ImportBatch {
    pub nodes: Vec<Row<NodeRecord>>,
    pub relationships: Vec<Row<RelationshipRecord>>,
}

impl ImportBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(nodes: Vec<NodeRecord>, relationships: Vec<RelationshipRecord>) -> Self {
        Self {
            nodes: nodes.into_iter().map(Ok).collect(),
            relationships: relationships.into_iter().map(Ok).collect(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.nodes.len() + self.relationships.len()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    /// Clear the graph before ingesting
    pub replace: bool,
    /// Create `Unknown`-labelled nodes for endpoint names that resolve to nothing
    pub create_missing_endpoints: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            replace: false,
            create_missing_endpoints: true,
        }
    }
}

/// One rejected row. `row` counts data rows from 1 within its stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowFailure {
    pub stream: RowStream,
    pub row: usize,
    pub reason: RowError,
}

/// Outcome of an import
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub nodes_created: usize,
    pub relationships_created: usize,
    pub relationships_updated: usize,
    pub endpoints_created: usize,
    pub failures: Vec<RowFailure>,
}

impl ImportReport {
    /// Rows that were applied
    pub fn successes(&self) -> usize {
        self.nodes_created + self.relationships_created + self.relationships_updated
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures_in(&self, stream: RowStream) -> impl Iterator<Item = &RowFailure> {
        self.failures.iter().filter(move |f| f.stream == stream)
    }

    fn fail(&mut self, stream: RowStream, row: usize, reason: RowError) {
        warn!("Rejected {} row {}: {}", stream, row, reason);
        self.failures.push(RowFailure {
            stream,
            row,
            reason,
        });
    }
}

/// Applies records to a graph store one row at a time
#[derive(Debug, Clone, Default)]
pub struct Loader {
    options: ImportOptions,
    resolver: QueryEngine,
}

impl Loader {
    pub fn new(options: ImportOptions) -> Self {
        Self {
            options,
            resolver: QueryEngine::new(),
        }
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    /// Apply a whole batch in one go: node rows first, then relationship rows
    pub fn import(&self, store: &mut GraphStore, batch: &ImportBatch) -> ImportReport {
        let mut report = ImportReport::default();
        if self.options.replace {
            store.clear();
        }
        for (i, row) in batch.nodes.iter().enumerate() {
            self.apply_node(store, i + 1, row, &mut report);
        }
        for (i, row) in batch.relationships.iter().enumerate() {
            self.apply_relationship(store, i + 1, row, &mut report);
        }
        report
    }

    /// Apply one node row, recording the outcome
    pub fn apply_node(
        &self,
        store: &mut GraphStore,
        row: usize,
        record: &Row<NodeRecord>,
        report: &mut ImportReport,
    ) {
        match record.as_ref().map_err(Clone::clone).and_then(|r| self.create_node(store, r)) {
            Ok(id) => {
                debug!("Imported node row {} as {}", row, id);
                report.nodes_created += 1;
            }
            Err(reason) => report.fail(RowStream::Nodes, row, reason),
        }
    }

    /// Apply one relationship row, recording the outcome
    pub fn apply_relationship(
        &self,
        store: &mut GraphStore,
        row: usize,
        record: &Row<RelationshipRecord>,
        report: &mut ImportReport,
    ) {
        let outcome = record
            .as_ref()
            .map_err(Clone::clone)
            .and_then(|r| self.create_relationship(store, r, report));
        match outcome {
            Ok(Upsert::Created) => report.relationships_created += 1,
            Ok(Upsert::Updated) => report.relationships_updated += 1,
            Err(reason) => report.fail(RowStream::Relationships, row, reason),
        }
    }

    fn create_node(&self, store: &mut GraphStore, record: &NodeRecord) -> Result<NodeId, RowError> {
        if record.name.trim().is_empty() {
            return Err(RowError::Malformed("name is empty".to_string()));
        }
        let labels: Vec<&str> = if record.labels.iter().all(|l| l.trim().is_empty()) {
            vec![DEFAULT_LABEL]
        } else {
            record
                .labels
                .iter()
                .map(|l| l.as_str())
                .filter(|l| !l.trim().is_empty())
                .collect()
        };

        let id = match record.id {
            Some(id) => {
                store.create_node_with_id(id, &record.name, labels, record.properties.clone())?
            }
            None => store.create_node(&record.name, labels, record.properties.clone())?,
        };
        Ok(id)
    }

    fn create_relationship(
        &self,
        store: &mut GraphStore,
        record: &RelationshipRecord,
        report: &mut ImportReport,
    ) -> Result<Upsert, RowError> {
        let source = self.resolve_endpoint(store, &record.source, report)?;
        let target = self.resolve_endpoint(store, &record.target, report)?;
        let rel_type = record
            .rel_type
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_REL_TYPE);

        let (upsert, _) =
            store.create_relationship(source, target, rel_type, record.properties.clone())?;
        Ok(upsert)
    }

    /// Resolve an endpoint reference. Unknown names may be created on the
    /// fly; unknown numeric ids never are.
    fn resolve_endpoint(
        &self,
        store: &mut GraphStore,
        reference: &str,
        report: &mut ImportReport,
    ) -> Result<NodeId, RowError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(RowError::Malformed("endpoint reference is empty".to_string()));
        }

        match self.resolver.resolve(store, reference) {
            Ok(id) => Ok(id),
            Err(QueryError::Ambiguous {
                reference,
                candidates,
            }) => Err(RowError::AmbiguousReference {
                reference,
                candidates,
            }),
            Err(QueryError::NotFound(_))
                if self.options.create_missing_endpoints
                    && reference.parse::<NodeId>().is_err() =>
            {
                let id = store.create_node(reference, [DEFAULT_LABEL], PropertyMap::new())?;
                report.endpoints_created += 1;
                debug!("Created endpoint node {} for '{}'", id, reference);
                Ok(id)
            }
            Err(_) => Err(RowError::UnresolvedReference(reference.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Label, PropertyValue, RelKey};

    #[test]
    fn test_partial_success() {
        let mut store = GraphStore::new();
        let batch = ImportBatch::from_records(
            vec![
                NodeRecord::new("A").with_label("Person"),
                NodeRecord::new("B").with_label("Person"),
                NodeRecord::new("  "),
                NodeRecord::new("D"),
                NodeRecord::new("E").with_label("Person"),
            ],
            vec![],
        );

        let report = Loader::default().import(&mut store, &batch);
        assert_eq!(report.successes(), 4);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].row, 3);
        assert_eq!(report.failures[0].stream, RowStream::Nodes);
        assert!(matches!(report.failures[0].reason, RowError::Malformed(_)));

        assert_eq!(store.node_count(), 4);
        let d = store.nodes_named("D")[0];
        assert!(store.get_node(d).unwrap().has_label(&Label::new(DEFAULT_LABEL)));
    }

    #[test]
    fn test_duplicate_id_row() {
        let mut store = GraphStore::new();
        let batch = ImportBatch::from_records(
            vec![
                NodeRecord::new("A").with_id(NodeId::new(7)),
                NodeRecord::new("B").with_id(NodeId::new(7)),
                NodeRecord::new("C"),
            ],
            vec![],
        );

        let report = Loader::default().import(&mut store, &batch);
        assert_eq!(report.nodes_created, 2);
        assert!(matches!(report.failures[0].reason, RowError::Duplicate(_)));
        assert_eq!(store.nodes_named("C"), vec![NodeId::new(8)]);
    }

    #[test]
    fn test_max_id_row_is_rejected() {
        let mut store = GraphStore::new();
        let batch = ImportBatch::from_records(
            vec![
                NodeRecord::new("Max").with_id(NodeId::new(u64::MAX)),
                NodeRecord::new("After"),
            ],
            vec![],
        );

        let report = Loader::default().import(&mut store, &batch);
        assert_eq!(report.nodes_created, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].row, 1);
        assert!(matches!(report.failures[0].reason, RowError::Rejected(_)));
        assert_eq!(store.nodes_named("After"), vec![NodeId::new(1)]);
    }

    #[test]
    fn test_relationships_reference_earlier_rows() {
        let mut store = GraphStore::new();
        let mut since = RelationshipRecord::new("alice", "2", "KNOWS");
        since.properties.insert("since".to_string(), PropertyValue::Integer(2020));
        let batch = ImportBatch::from_records(
            vec![
                NodeRecord::new("Alice").with_label("Person"),
                NodeRecord::new("Bob").with_label("Person"),
            ],
            vec![
                since,
                RelationshipRecord::new("1", "2", "KNOWS"),
                RelationshipRecord::new("Bob", "Carol", "KNOWS"),
                RelationshipRecord::new("1", "99", "KNOWS"),
                RelationshipRecord {
                    rel_type: None,
                    ..RelationshipRecord::new("2", "1", "")
                },
            ],
        );

        let report = Loader::default().import(&mut store, &batch);
        assert_eq!(report.relationships_created, 3);
        assert_eq!(report.relationships_updated, 1);
        assert_eq!(report.endpoints_created, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].row, 4);
        assert_eq!(
            report.failures[0].reason,
            RowError::UnresolvedReference("99".to_string())
        );

        let knows = store
            .get_relationship(&RelKey::new(NodeId::new(1), NodeId::new(2), "KNOWS"))
            .unwrap();
        assert_eq!(knows.get_property("since"), Some(&PropertyValue::Integer(2020)));
        assert!(store.has_relationship(&RelKey::new(
            NodeId::new(2),
            NodeId::new(1),
            DEFAULT_REL_TYPE
        )));
    }

    #[test]
    fn test_strict_endpoints_and_ambiguity() {
        let mut store = GraphStore::new();
        store.create_node("Sam", ["Person"], PropertyMap::new()).unwrap();
        store.create_node("sam", ["Person"], PropertyMap::new()).unwrap();
        let loader = Loader::new(ImportOptions {
            replace: false,
            create_missing_endpoints: false,
        });
        let batch = ImportBatch::from_records(
            vec![],
            vec![
                RelationshipRecord::new("SAM", "1", "KNOWS"),
                RelationshipRecord::new("1", "Nobody", "KNOWS"),
            ],
        );

        let report = loader.import(&mut store, &batch);
        assert_eq!(report.successes(), 0);
        assert!(matches!(
            report.failures[0].reason,
            RowError::AmbiguousReference { .. }
        ));
        assert_eq!(
            report.failures[1].reason,
            RowError::UnresolvedReference("Nobody".to_string())
        );
        assert_eq!(store.node_count(), 2);
    }

    #[test]
    fn test_replace_clears_graph() {
        let mut store = GraphStore::new();
        store.create_node("Old", ["Thing"], PropertyMap::new()).unwrap();
        let loader = Loader::new(ImportOptions {
            replace: true,
            ..ImportOptions::default()
        });
        let batch = ImportBatch::from_records(vec![NodeRecord::new("New")], vec![]);

        let report = loader.import(&mut store, &batch);
        assert!(report.is_clean());
        assert_eq!(store.node_count(), 1);
        assert!(store.nodes_named("Old").is_empty());
    }
}
