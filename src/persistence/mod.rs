//! Persistence layer
//!
//! Single-slot checkpoints of the whole graph:
//! - `save` overwrites the checkpoint with the current graph
//! - `init` resets to an empty graph, the last checkpoint, or the baseline CSV files

pub mod snapshot;

pub use snapshot::{SnapshotDocument, SNAPSHOT_FORMAT, SNAPSHOT_VERSION};

use crate::config::EngineConfig;
use crate::graph::{GraphError, GraphStore};
use crate::loader::{
    parse_node_csv, parse_relationship_csv, ImportBatch, ImportError, ImportOptions,
    ImportReport, Loader,
};
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Persistence errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Checkpoint checksum mismatch (expected {expected}, found {actual})")]
    Checksum { expected: String, actual: String },

    #[error("Not a checkpoint document (format '{0}')")]
    UnsupportedFormat(String),

    #[error("Unsupported checkpoint version {0}")]
    UnsupportedVersion(u32),

    #[error("Checkpoint contents are inconsistent: {0}")]
    Graph(#[from] GraphError),

    #[error("Baseline import failed: {0}")]
    Import(#[from] ImportError),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// What `init` resets the graph to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitMode {
    /// Always start empty
    Empty,
    /// Last checkpoint, else the baseline files, else empty
    #[default]
    Checkpoint,
    /// The baseline files, ignoring any checkpoint
    Baseline,
}

/// Where the graph built by `init` came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InitSource {
    Empty,
    Checkpoint,
    Baseline,
}

/// Result of an `init`
#[derive(Debug, Clone, Serialize)]
pub struct InitOutcome {
    pub source: InitSource,
    pub node_count: usize,
    pub relationship_count: usize,
    /// Row report when the baseline files were imported
    pub baseline_report: Option<ImportReport>,
}

/// Result of a `save`
#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub path: PathBuf,
    pub node_count: usize,
    pub relationship_count: usize,
    pub bytes_written: usize,
}

/// Reads and writes the checkpoint and builds fresh graphs for `init`
#[derive(Debug, Clone)]
pub struct SnapshotManager {
    path: PathBuf,
    compress: bool,
    baseline_nodes: Option<PathBuf>,
    baseline_relationships: Option<PathBuf>,
    import_options: ImportOptions,
}

impl SnapshotManager {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            path: config.snapshot_path(),
            compress: config.compress_snapshots,
            baseline_nodes: config.baseline_nodes.clone(),
            baseline_relationships: config.baseline_relationships.clone(),
            import_options: ImportOptions {
                replace: false,
                create_missing_endpoints: config.create_missing_endpoints,
            },
        }
    }

    /// Checkpoint file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_checkpoint(&self) -> bool {
        self.path.is_file()
    }

    /// Overwrite the checkpoint.
    ///
    /// The document goes to a sibling temp file which is then renamed over the
    /// slot, so a failed write leaves the previous checkpoint intact.
    pub fn write(&self, document: &SnapshotDocument) -> PersistenceResult<SaveOutcome> {
        let bytes = document.encode(self.compress)?;
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        info!(
            "Saved checkpoint {:?}: {} nodes, {} relationships",
            self.path,
            document.node_count(),
            document.relationship_count()
        );
        Ok(SaveOutcome {
            path: self.path.clone(),
            node_count: document.node_count(),
            relationship_count: document.relationship_count(),
            bytes_written: bytes.len(),
        })
    }

    /// Read and verify the checkpoint, if there is one
    pub fn read(&self) -> PersistenceResult<Option<SnapshotDocument>> {
        if !self.has_checkpoint() {
            debug!("No checkpoint at {:?}", self.path);
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;
        Ok(Some(SnapshotDocument::decode(&bytes)?))
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline_nodes.is_some()
    }

    /// Import the configured baseline CSV files into a fresh store
    pub fn load_baseline(&self) -> PersistenceResult<(GraphStore, ImportReport)> {
        let nodes_path = self
            .baseline_nodes
            .as_ref()
            .ok_or(PersistenceError::NotConfigured("baseline_nodes"))?;

        let mut batch = ImportBatch::new();
        batch.nodes = parse_node_csv(File::open(nodes_path)?)?;
        if let Some(rels_path) = &self.baseline_relationships {
            batch.relationships = parse_relationship_csv(File::open(rels_path)?)?;
        }

        let mut store = GraphStore::new();
        let report = Loader::new(self.import_options).import(&mut store, &batch);
        info!(
            "Loaded baseline {:?}: {} rows applied, {} rejected",
            nodes_path,
            report.successes(),
            report.failures.len()
        );
        Ok((store, report))
    }

    /// Build the graph `init` should install. Nothing is touched on failure.
    pub fn prepare_init(&self, mode: InitMode) -> PersistenceResult<(GraphStore, InitOutcome)> {
        let (store, source, baseline_report) = match mode {
            InitMode::Empty => (GraphStore::new(), InitSource::Empty, None),
            InitMode::Baseline => {
                let (store, report) = self.load_baseline()?;
                (store, InitSource::Baseline, Some(report))
            }
            InitMode::Checkpoint => match self.read()? {
                Some(document) => (document.into_store()?, InitSource::Checkpoint, None),
                None if self.has_baseline() => {
                    let (store, report) = self.load_baseline()?;
                    (store, InitSource::Baseline, Some(report))
                }
                None => (GraphStore::new(), InitSource::Empty, None),
            },
        };

        let outcome = InitOutcome {
            source,
            node_count: store.node_count(),
            relationship_count: store.relationship_count(),
            baseline_report,
        };
        Ok((store, outcome))
    }
}
