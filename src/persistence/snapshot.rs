//! Checkpoint document format
//!
//! A checkpoint is a single JSON document:
//!
//! ```json
//! { "format": "knowgraph-snapshot", "version": 1, "saved_at": "...",
//!   "checksum": "<sha256 of graph>", "graph": { "nodes": [...], "relationships": [...] } }
//! ```
//!
//! optionally gzip-compressed. Compressed documents are detected on read by
//! their magic bytes, so the setting can change between runs.

use super::{PersistenceError, PersistenceResult};
use crate::graph::{GraphExport, GraphStore};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};

pub const SNAPSHOT_FORMAT: &str = "knowgraph-snapshot";
pub const SNAPSHOT_VERSION: u32 = 1;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Point-in-time copy of the whole graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub format: String,
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub checksum: String,
    pub graph: GraphExport,
}

impl SnapshotDocument {
    /// Copy the store into a new document
    pub fn capture(store: &GraphStore) -> PersistenceResult<Self> {
        let graph = store.export();
        let checksum = Self::calculate_checksum(&graph)?;
        Ok(Self {
            format: SNAPSHOT_FORMAT.to_string(),
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            checksum,
            graph,
        })
    }

    /// SHA-256 of the serialised graph body
    fn calculate_checksum(graph: &GraphExport) -> PersistenceResult<String> {
        let body = serde_json::to_vec(graph)?;
        Ok(format!("{:x}", Sha256::digest(&body)))
    }

    /// Check format, version and checksum
    pub fn verify(&self) -> PersistenceResult<()> {
        if self.format != SNAPSHOT_FORMAT {
            return Err(PersistenceError::UnsupportedFormat(self.format.clone()));
        }
        if self.version != SNAPSHOT_VERSION {
            return Err(PersistenceError::UnsupportedVersion(self.version));
        }
        let actual = Self::calculate_checksum(&self.graph)?;
        if actual != self.checksum {
            return Err(PersistenceError::Checksum {
                expected: self.checksum.clone(),
                actual,
            });
        }
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.graph.nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.graph.relationships.len()
    }

    pub fn encode(&self, compress: bool) -> PersistenceResult<Vec<u8>> {
        let json = serde_json::to_vec_pretty(self)?;
        if !compress {
            return Ok(json);
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        Ok(encoder.finish()?)
    }

    /// Parse and verify a document
    pub fn decode(bytes: &[u8]) -> PersistenceResult<Self> {
        let document: SnapshotDocument = if bytes.starts_with(&GZIP_MAGIC) {
            let mut json = Vec::new();
            GzDecoder::new(bytes).read_to_end(&mut json)?;
            serde_json::from_slice(&json)?
        } else {
            serde_json::from_slice(bytes)?
        };
        document.verify()?;
        Ok(document)
    }

    /// Rebuild a store, re-deriving every index
    pub fn into_store(self) -> PersistenceResult<GraphStore> {
        Ok(GraphStore::from_export(self.graph)?)
    }
}
