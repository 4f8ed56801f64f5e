//! Error types for index synchronization and search

use std::path::PathBuf;

use tantivy::directory::error::LockError;
use thiserror::Error;

/// Error type returned by a record's post-index hook
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("No index field mapping for field kind '{0}'")]
    UnmappedFieldKind(String),
    #[error("Record type '{record_type}' has no field '{field}'")]
    UnknownField { record_type: String, field: String },
    #[error("No index found at {0}")]
    IndexNotFound(PathBuf),
    #[error("Query parse error: {0}")]
    QueryParseError(#[from] tantivy::query::QueryParserError),
    #[error("Index writer lock is held elsewhere: {0}")]
    WriteConflict(String),
    #[error("Invalid value '{value}' for field '{field}'")]
    InvalidFieldValue { field: String, value: String },
    #[error("No indexed document with id '{0}'")]
    DocumentNotFound(String),
    #[error("Field '{0}' is not stored text")]
    FieldNotStored(String),
    #[error("No default query field declared for '{0}'")]
    NoDefaultField(String),
    #[error("Post-index hook failed: {0}")]
    PostIndexHook(#[source] HookError),
    #[error("Record store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
    #[error("Tantivy error: {0}")]
    TantivyError(tantivy::TantivyError),
    #[error("Index directory error: {0}")]
    DirectoryError(#[from] std::io::Error),
}

impl From<tantivy::TantivyError> for SearchError {
    fn from(err: tantivy::TantivyError) -> Self {
        match err {
            tantivy::TantivyError::LockFailure(LockError::LockBusy, detail) => {
                SearchError::WriteConflict(detail.unwrap_or_else(|| "lock busy".to_string()))
            }
            other => SearchError::TantivyError(other),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for SearchError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        SearchError::LockPoisoned(err.to_string())
    }
}
