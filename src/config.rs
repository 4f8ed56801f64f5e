//! Index storage configuration
//!
//! The storage directory comes from the `RECORD_INDEX_STORAGE_DIR`
//! environment variable, or else from `index.json` in the platform config
//! directory. Without either, startup fails.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::search::DEFAULT_WRITER_HEAP_BYTES;

/// Environment variable naming the index storage directory
pub const STORAGE_DIR_ENV: &str = "RECORD_INDEX_STORAGE_DIR";

const CONFIG_FILE_NAME: &str = "index.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Index storage directory is not configured; set RECORD_INDEX_STORAGE_DIR or create index.json")]
    MissingStorageDir,
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Where and how the index is stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexConfig {
    pub storage_dir: PathBuf,
    #[serde(default = "default_writer_heap_bytes")]
    pub writer_heap_bytes: usize,
}

fn default_writer_heap_bytes() -> usize {
    DEFAULT_WRITER_HEAP_BYTES
}

impl IndexConfig {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            writer_heap_bytes: DEFAULT_WRITER_HEAP_BYTES,
        }
    }

    /// Create the storage directory if it does not exist yet
    pub fn ensure_storage_dir(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.storage_dir)?;
        Ok(())
    }
}

/// Get the path to the config file in the platform config directory
fn get_config_file_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "record-index", "RecordIndex")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Load a config from a JSON file
pub fn load_config_file(path: &Path) -> Result<IndexConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Save a config as a JSON file
pub fn save_config_file(path: &Path, config: &IndexConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

fn resolve_config(
    env_value: Option<OsString>,
    config_file: Option<&Path>,
) -> Result<IndexConfig, ConfigError> {
    if let Some(dir) = env_value.filter(|value| !value.is_empty()) {
        return Ok(IndexConfig::new(dir));
    }

    match config_file {
        Some(path) if path.exists() => load_config_file(path),
        _ => Err(ConfigError::MissingStorageDir),
    }
}

/// Resolve the index config once at process start
pub fn load_config() -> Result<IndexConfig, ConfigError> {
    let config_file = get_config_file_path();
    let config = resolve_config(std::env::var_os(STORAGE_DIR_ENV), config_file.as_deref())?;
    log::info!("Index storage directory: {:?}", config.storage_dir);
    Ok(config)
}
