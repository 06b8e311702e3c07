//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding the checkpoint
    pub data_dir: PathBuf,
    /// Checkpoint file name inside `data_dir`
    pub snapshot_file: String,
    /// Gzip the checkpoint document
    pub compress_snapshots: bool,
    /// Node CSV restored by `init` when no checkpoint exists
    pub baseline_nodes: Option<PathBuf>,
    /// Relationship CSV restored alongside `baseline_nodes`
    pub baseline_relationships: Option<PathBuf>,
    /// Import rows applied per write-lock acquisition
    pub import_batch_size: usize,
    /// Cap on search results (None = unlimited)
    pub search_limit: Option<usize>,
    /// Create nodes for unresolved endpoint names during import
    pub create_missing_endpoints: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./knowgraph_data"),
            snapshot_file: "checkpoint.json".to_string(),
            compress_snapshots: false,
            baseline_nodes: None,
            baseline_relationships: None,
            import_batch_size: 256,
            search_limit: None,
            create_missing_endpoints: true,
        }
    }
}

impl EngineConfig {
    /// Default configuration rooted at `data_dir`
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.import_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "import_batch_size must be at least 1".to_string(),
            ));
        }
        if self.snapshot_file.trim().is_empty() {
            return Err(ConfigError::Invalid("snapshot_file must not be empty".to_string()));
        }
        if self.baseline_relationships.is_some() && self.baseline_nodes.is_none() {
            return Err(ConfigError::Invalid(
                "baseline_relationships requires baseline_nodes".to_string(),
            ));
        }
        Ok(())
    }

    /// Full path of the checkpoint file
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(&self.snapshot_file)
    }
}
