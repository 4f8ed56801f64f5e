//! Keeps a full-text index in sync with a record store and turns search
//! queries back into records.

pub mod config;
pub mod db;
pub mod models;
pub mod search;

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

pub use config::{load_config, ConfigError, IndexConfig};
pub use db::{DbPool, PostDbError, PostRepository};
pub use models::{CreatePostInput, FieldDef, Post, Record, RecordType, UpdatePostInput};
pub use search::{IndexDeclaration, IndexManager, RecordStore, SearchError, SyncRegistry};

#[derive(Error, Debug)]
pub enum InitError {
    #[error("Failed to load config: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to initialize database: {0}")]
    Database(#[from] db::DbError),
    #[error("Failed to initialize search index: {0}")]
    Search(#[from] SearchError),
    #[error("Failed to read posts: {0}")]
    Store(#[source] PostDbError),
    #[error("Failed to rebuild search index: {0}")]
    Rebuild(#[source] PostDbError),
}

/// Initialize logging: debug for this crate, warn for everything else.
/// Calling it more than once is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("record_index=debug,warn"),
    )
    .format_timestamp_secs()
    .try_init();
}

/// Open the post database, register posts for indexing and return the
/// repository. An index that is empty while posts exist gets rebuilt.
pub fn initialize_posts(
    db_path: &Path,
    config: IndexConfig,
    declaration: IndexDeclaration,
) -> Result<PostRepository, InitError> {
    config.ensure_storage_dir()?;
    let pool = db::connection::init_pool_at_path(db_path)?;

    let registry = Arc::new(SyncRegistry::new(config));
    let manager = registry.register_record::<Post>(declaration)?;
    let repository = PostRepository::new(pool, Arc::clone(&registry));

    // Rebuild index if empty (first run or index was deleted)
    if manager.document_count()? == 0 {
        let posts = repository.all().map_err(InitError::Store)?;
        if !posts.is_empty() {
            let count = repository.rebuild_index().map_err(InitError::Rebuild)?;
            log::info!("Indexed {} existing posts", count);
        }
    }

    Ok(repository)
}
