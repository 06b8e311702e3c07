//! Shared graph database handle
//!
//! `GraphDb` owns the graph behind a single `RwLock`. Every mutation goes
//! through `write_txn`, so the store and its label index and id registry are
//! only ever observed in a consistent state. Checkpoint and import I/O are
//! serialised by a separate mutex and never performed under the graph lock.

use crate::config::EngineConfig;
use crate::graph::{
    DeletedNode, EntityRef, GraphExport, GraphResult, GraphStatistics, GraphStore, Node, NodeId,
    PropertyMap, PropertyValue, RelKey, Relationship, Upsert,
};
use crate::loader::{
    parse_node_csv, parse_relationship_csv, write_node_csv, write_relationship_csv, ImportBatch,
    ImportOptions, ImportReport, ImportResult, Loader,
};
use crate::persistence::{
    InitMode, InitOutcome, PersistenceResult, SaveOutcome, SnapshotDocument, SnapshotManager,
};
use crate::query::{Path as GraphPath, QueryEngine, QueryResult};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

/// Cloneable handle to one in-memory graph
#[derive(Clone)]
pub struct GraphDb {
    store: Arc<RwLock<GraphStore>>,
    io: Arc<Mutex<()>>,
    snapshots: SnapshotManager,
    query_engine: QueryEngine,
    config: EngineConfig,
}

impl GraphDb {
    /// Empty database; nothing is read from disk
    pub fn new(config: EngineConfig) -> Self {
        Self {
            store: Arc::new(RwLock::new(GraphStore::new())),
            io: Arc::new(Mutex::new(())),
            snapshots: SnapshotManager::new(&config),
            query_engine: QueryEngine::with_search_limit(config.search_limit),
            config,
        }
    }

    /// Database restored from the last checkpoint (or baseline files)
    pub async fn open(config: EngineConfig) -> PersistenceResult<(Self, InitOutcome)> {
        let db = Self::new(config);
        let outcome = db.init(InitMode::Checkpoint).await?;
        Ok((db, outcome))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn read_txn<T>(&self, f: impl FnOnce(&GraphStore) -> T) -> T {
        let store_guard = self.store.read().await;
        f(&store_guard)
    }

    async fn write_txn<T>(&self, f: impl FnOnce(&mut GraphStore) -> T) -> T {
        let mut store_guard = self.store.write().await;
        f(&mut store_guard)
    }

    // ============================================================
    // Reads
    // ============================================================

    /// Full node and relationship set
    pub async fn get_graph(&self) -> GraphExport {
        self.read_txn(|store| store.export()).await
    }

    pub async fn get_node(&self, id: NodeId) -> GraphResult<Node> {
        self.read_txn(|store| store.require_node(id).cloned()).await
    }

    pub async fn get_relationship(&self, key: &RelKey) -> GraphResult<Relationship> {
        self.read_txn(|store| store.require_relationship(key).cloned())
            .await
    }

    pub async fn search(&self, query: &str) -> Vec<Node> {
        self.read_txn(|store| {
            self.query_engine
                .search(store, query)
                .into_iter()
                .cloned()
                .collect()
        })
        .await
    }

    /// Resolve an "ID or name" reference
    pub async fn resolve(&self, reference: &str) -> QueryResult<NodeId> {
        self.read_txn(|store| self.query_engine.resolve(store, reference))
            .await
    }

    pub async fn find_path(
        &self,
        start: &str,
        end: &str,
        rel_type: Option<&str>,
    ) -> QueryResult<GraphPath> {
        self.read_txn(|store| self.query_engine.find_path(store, start, end, rel_type))
            .await
    }

    pub async fn statistics(&self) -> GraphStatistics {
        self.read_txn(|store| store.statistics()).await
    }

    // ============================================================
    // Nodes and labels
    // ============================================================

    pub async fn create_node(
        &self,
        name: &str,
        labels: &[&str],
        properties: PropertyMap,
    ) -> GraphResult<Node> {
        self.write_txn(|store| {
            let id = store.create_node(name, labels.iter().copied(), properties)?;
            store.require_node(id).cloned()
        })
        .await
    }

    pub async fn update_node(&self, id: NodeId, name: Option<&str>) -> GraphResult<Node> {
        self.write_txn(|store| store.update_node(id, name).cloned())
            .await
    }

    /// Delete a node and every relationship touching it
    pub async fn delete_node(&self, id: NodeId) -> GraphResult<DeletedNode> {
        self.write_txn(|store| store.delete_node(id)).await
    }

    pub async fn add_label(&self, id: NodeId, label: &str) -> GraphResult<Node> {
        self.write_txn(|store| store.add_label(id, label).cloned())
            .await
    }

    pub async fn remove_label(&self, id: NodeId, label: &str) -> GraphResult<Node> {
        self.write_txn(|store| store.remove_label(id, label).cloned())
            .await
    }

    pub async fn set_node_property(
        &self,
        id: NodeId,
        key: &str,
        value: PropertyValue,
    ) -> GraphResult<Node> {
        self.write_txn(|store| store.set_node_property(id, key, value).cloned())
            .await
    }

    pub async fn delete_node_property(&self, id: NodeId, key: &str) -> GraphResult<Node> {
        self.write_txn(|store| store.delete_node_property(id, key).cloned())
            .await
    }

    // ============================================================
    // Relationships
    // ============================================================

    /// Create a relationship, or merge properties into the existing triple
    pub async fn create_relationship(
        &self,
        source: NodeId,
        target: NodeId,
        rel_type: &str,
        properties: PropertyMap,
    ) -> GraphResult<(Upsert, Relationship)> {
        self.write_txn(|store| {
            store
                .create_relationship(source, target, rel_type, properties)
                .map(|(upsert, rel)| (upsert, rel.clone()))
        })
        .await
    }

    pub async fn delete_relationship(&self, key: &RelKey) -> bool {
        self.write_txn(|store| store.delete_relationship(key)).await
    }

    /// Remove every relationship from `source` to `target`, whatever its type
    pub async fn delete_relationships_between(
        &self,
        source: NodeId,
        target: NodeId,
    ) -> Vec<Relationship> {
        self.write_txn(|store| store.delete_relationships_between(source, target))
            .await
    }

    pub async fn set_relationship_property(
        &self,
        key: &RelKey,
        property: &str,
        value: PropertyValue,
    ) -> GraphResult<Relationship> {
        self.write_txn(|store| {
            store
                .set_relationship_property(key, property, value)
                .cloned()
        })
        .await
    }

    pub async fn delete_relationship_property(
        &self,
        key: &RelKey,
        property: &str,
    ) -> GraphResult<Relationship> {
        self.write_txn(|store| store.delete_relationship_property(key, property).cloned())
            .await
    }

    /// Set a property on a node or relationship
    pub async fn set_property(
        &self,
        entity: &EntityRef,
        key: &str,
        value: PropertyValue,
    ) -> GraphResult<()> {
        self.write_txn(|store| store.set_property(entity, key, value))
            .await
    }

    /// Delete a property from a node or relationship; a missing key is a no-op
    pub async fn delete_property(&self, entity: &EntityRef, key: &str) -> GraphResult<()> {
        self.write_txn(|store| store.delete_property(entity, key))
            .await
    }

    // ============================================================
    // Bulk import and export
    // ============================================================

    /// Import options derived from the configuration
    pub fn import_options(&self, replace: bool) -> ImportOptions {
        ImportOptions {
            replace,
            create_missing_endpoints: self.config.create_missing_endpoints,
        }
    }

    /// Apply a batch. Rows are applied in chunks, each under its own write
    /// lock, so readers get a turn between chunks.
    pub async fn import(&self, batch: &ImportBatch, options: ImportOptions) -> ImportReport {
        let _io = self.io.lock().await;
        let loader = Loader::new(options);
        let chunk_size = self.config.import_batch_size.max(1);
        let mut report = ImportReport::default();

        if options.replace {
            self.write_txn(|store| store.clear()).await;
        }

        for (chunk_index, chunk) in batch.nodes.chunks(chunk_size).enumerate() {
            let offset = chunk_index * chunk_size;
            self.write_txn(|store| {
                for (i, row) in chunk.iter().enumerate() {
                    loader.apply_node(store, offset + i + 1, row, &mut report);
                }
            })
            .await;
            tokio::task::yield_now().await;
        }

        for (chunk_index, chunk) in batch.relationships.chunks(chunk_size).enumerate() {
            let offset = chunk_index * chunk_size;
            self.write_txn(|store| {
                for (i, row) in chunk.iter().enumerate() {
                    loader.apply_relationship(store, offset + i + 1, row, &mut report);
                }
            })
            .await;
            tokio::task::yield_now().await;
        }

        info!(
            "Import finished: {} rows applied, {} rejected",
            report.successes(),
            report.failures.len()
        );
        report
    }

    /// Parse and import CSV files. Either file may be omitted.
    pub async fn import_csv(
        &self,
        nodes: Option<&Path>,
        relationships: Option<&Path>,
        options: ImportOptions,
    ) -> ImportResult<ImportReport> {
        let mut batch = ImportBatch::new();
        if let Some(path) = nodes {
            batch.nodes = parse_node_csv(File::open(path)?)?;
        }
        if let Some(path) = relationships {
            batch.relationships = parse_relationship_csv(File::open(path)?)?;
        }
        Ok(self.import(&batch, options).await)
    }

    /// Write the graph out in the import CSV formats
    pub async fn export_csv(&self, nodes: &Path, relationships: &Path) -> ImportResult<()> {
        let (node_bytes, rel_bytes) = self
            .read_txn(|store| -> ImportResult<(Vec<u8>, Vec<u8>)> {
                let mut node_bytes = Vec::new();
                let mut rel_bytes = Vec::new();
                write_node_csv(store, &mut node_bytes)?;
                write_relationship_csv(store, &mut rel_bytes)?;
                Ok((node_bytes, rel_bytes))
            })
            .await?;

        let _io = self.io.lock().await;
        std::fs::write(nodes, node_bytes)?;
        std::fs::write(relationships, rel_bytes)?;
        Ok(())
    }

    // ============================================================
    // Checkpoints
    // ============================================================

    /// Overwrite the checkpoint with the current graph. The graph is copied
    /// under the read lock; a failed write leaves memory untouched.
    pub async fn save(&self) -> PersistenceResult<SaveOutcome> {
        let _io = self.io.lock().await;
        let document = self
            .read_txn(|store| SnapshotDocument::capture(store))
            .await?;
        self.snapshots.write(&document)
    }

    /// Discard the current graph and install the one `mode` selects.
    /// Destructive: unsaved changes are lost. On error the graph is unchanged.
    pub async fn init(&self, mode: InitMode) -> PersistenceResult<InitOutcome> {
        let _io = self.io.lock().await;
        let (fresh, outcome) = self.snapshots.prepare_init(mode)?;
        self.write_txn(|store| *store = fresh).await;
        info!(
            "Initialized graph from {:?}: {} nodes, {} relationships",
            outcome.source, outcome.node_count, outcome.relationship_count
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphError, Label};
    use crate::loader::{NodeRecord, RelationshipRecord, RowStream};
    use crate::persistence::{InitSource, PersistenceError};
    use tempfile::TempDir;

    fn temp_db(dir: &TempDir) -> GraphDb {
        GraphDb::new(EngineConfig::with_data_dir(dir.path()))
    }

    #[tokio::test]
    async fn test_node_lifecycle() {
        let dir = TempDir::new().unwrap();
        let db = temp_db(&dir);

        let alice = db.create_node("Alice", &["Person"], PropertyMap::new()).await.unwrap();
        let bob = db.create_node("Bob", &["Person"], PropertyMap::new()).await.unwrap();
        db.create_relationship(alice.id, bob.id, "KNOWS", PropertyMap::new())
            .await
            .unwrap();

        let renamed = db.update_node(alice.id, Some("Alicia")).await.unwrap();
        assert_eq!(renamed.name, "Alicia");

        let labelled = db.add_label(alice.id, "Admin").await.unwrap();
        assert_eq!(labelled.label_count(), 2);
        let err = db.remove_label(bob.id, "Person").await.unwrap_err();
        assert!(matches!(err, GraphError::InvalidOperation(_)));

        let deleted = db.delete_node(alice.id).await.unwrap();
        assert_eq!(deleted.relationships.len(), 1);
        assert_eq!(
            db.get_node(alice.id).await.unwrap_err(),
            GraphError::NodeNotFound(alice.id)
        );
        assert!(db.get_node(bob.id).await.unwrap().has_label(&Label::new("Person")));
    }

    #[tokio::test]
    async fn test_relationship_properties() {
        let dir = TempDir::new().unwrap();
        let db = temp_db(&dir);
        let a = db.create_node("A", &["Thing"], PropertyMap::new()).await.unwrap().id;
        let b = db.create_node("B", &["Thing"], PropertyMap::new()).await.unwrap().id;
        let (upsert, rel) = db
            .create_relationship(a, b, "PART OF", PropertyMap::new())
            .await
            .unwrap();
        assert_eq!(upsert, Upsert::Created);
        assert_eq!(rel.rel_type.as_str(), "PART_OF");

        let key = rel.key();
        let rel = db
            .set_relationship_property(&key, "weight", PropertyValue::Float(0.5))
            .await
            .unwrap();
        assert_eq!(rel.get_property("weight"), Some(&PropertyValue::Float(0.5)));
        let rel = db.delete_relationship_property(&key, "weight").await.unwrap();
        assert_eq!(rel.property_count(), 0);

        db.create_relationship(a, b, "LINKS", PropertyMap::new())
            .await
            .unwrap();
        assert_eq!(db.delete_relationships_between(a, b).await.len(), 2);
        assert!(!db.delete_relationship(&key).await);
    }

    #[tokio::test]
    async fn test_chunked_import_numbers_rows() {
        let dir = TempDir::new().unwrap();
        let mut config = EngineConfig::with_data_dir(dir.path());
        config.import_batch_size = 2;
        let db = GraphDb::new(config);

        let nodes = (1..=5)
            .map(|i| {
                if i == 3 {
                    NodeRecord::new("")
                } else {
                    NodeRecord::new(format!("N{}", i)).with_label("Item")
                }
            })
            .collect();
        let rels = vec![
            RelationshipRecord::new("N1", "N2", "NEXT"),
            RelationshipRecord::new("N2", "N4", "NEXT"),
            RelationshipRecord::new("N4", "N5", "NEXT"),
        ];
        let batch = ImportBatch::from_records(nodes, rels);

        let report = db.import(&batch, db.import_options(false)).await;
        assert_eq!(report.nodes_created, 4);
        assert_eq!(report.relationships_created, 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].row, 3);
        assert_eq!(report.failures[0].stream, RowStream::Nodes);

        let path = db.find_path("N1", "N5", None).await.unwrap();
        assert_eq!(path.len(), 3);
    }

    #[tokio::test]
    async fn test_save_and_init() {
        let dir = TempDir::new().unwrap();
        let db = temp_db(&dir);
        let a = db.create_node("A", &["Person"], PropertyMap::new()).await.unwrap().id;
        let b = db.create_node("B", &["Person"], PropertyMap::new()).await.unwrap().id;
        db.create_relationship(a, b, "KNOWS", PropertyMap::new())
            .await
            .unwrap();
        db.save().await.unwrap();

        let outcome = db.init(InitMode::Empty).await.unwrap();
        assert_eq!(outcome.source, InitSource::Empty);
        assert!(db.search("a").await.is_empty());

        let outcome = db.init(InitMode::Checkpoint).await.unwrap();
        assert_eq!(outcome.source, InitSource::Checkpoint);
        assert_eq!(outcome.relationship_count, 1);
        assert_eq!(db.resolve("b").await.unwrap(), b);

        // Ids keep counting past restored nodes
        let c = db.create_node("C", &["Person"], PropertyMap::new()).await.unwrap();
        assert_eq!(c.id, NodeId::new(3));
    }

    #[tokio::test]
    async fn test_failed_save_keeps_graph_and_checkpoint() {
        let dir = TempDir::new().unwrap();
        let db = temp_db(&dir);
        let a = db.create_node("A", &["Person"], PropertyMap::new()).await.unwrap().id;
        let b = db.create_node("B", &["Person"], PropertyMap::new()).await.unwrap().id;
        db.create_relationship(a, b, "KNOWS", PropertyMap::new())
            .await
            .unwrap();
        db.save().await.unwrap();
        let saved = std::fs::read(db.config().snapshot_path()).unwrap();

        db.create_node("Unsaved", &["Person"], PropertyMap::new()).await.unwrap();
        let before = serde_json::to_value(db.get_graph().await).unwrap();

        // A directory where the temp file goes makes the write fail
        std::fs::create_dir(db.config().snapshot_path().with_extension("tmp")).unwrap();
        let err = db.save().await.unwrap_err();
        assert!(matches!(err, PersistenceError::Io(_)));

        assert_eq!(serde_json::to_value(db.get_graph().await).unwrap(), before);
        assert_eq!(std::fs::read(db.config().snapshot_path()).unwrap(), saved);

        let outcome = db.init(InitMode::Checkpoint).await.unwrap();
        assert_eq!(outcome.source, InitSource::Checkpoint);
        assert_eq!(outcome.node_count, 2);
        assert_eq!(outcome.relationship_count, 1);
        assert!(db.search("unsaved").await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_init_keeps_graph() {
        let dir = TempDir::new().unwrap();
        let db = temp_db(&dir);
        db.create_node("Keep", &["Thing"], PropertyMap::new()).await.unwrap();
        std::fs::write(db.config().snapshot_path(), b"{ broken").unwrap();

        let err = db.init(InitMode::Checkpoint).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Json(_)));
        assert_eq!(db.statistics().await.node_count, 1);
    }

    #[tokio::test]
    async fn test_concurrent_readers_see_whole_mutations() {
        let dir = TempDir::new().unwrap();
        let db = temp_db(&dir);
        let hub = db.create_node("Hub", &["Hub"], PropertyMap::new()).await.unwrap().id;
        for i in 0..50 {
            let spoke = db
                .create_node(&format!("Spoke {}", i), &["Spoke"], PropertyMap::new())
                .await
                .unwrap()
                .id;
            db.create_relationship(hub, spoke, "HAS", PropertyMap::new())
                .await
                .unwrap();
        }

        let reader = {
            let db = db.clone();
            tokio::spawn(async move {
                for _ in 0..20 {
                    let graph = db.get_graph().await;
                    let hub_present = graph.nodes.iter().any(|n| n.id == hub);
                    // Either before or after the delete, never half way
                    assert!(hub_present == (graph.relationships.len() == 50));
                    tokio::task::yield_now().await;
                }
            })
        };
        db.delete_node(hub).await.unwrap();
        reader.await.unwrap();
    }
}
