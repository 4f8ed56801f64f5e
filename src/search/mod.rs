//! Full-text index kept in sync with the record store
//!
//! Record types register with a [`SyncRegistry`], which derives their index
//! schema, creates the Tantivy index and routes save events to the type's
//! [`IndexManager`]. Queries return record ids in relevance order;
//! [`resolve`] turns them back into records.

mod error;
mod index;
mod manager;
mod query;
mod registry;
mod resolve;
mod schema;

pub use error::{HookError, SearchError};
pub use index::{
    ensure_index, index_exists, IndexDocument, IndexStore, SearchHit, SharedIndex, WriteMode,
    DEFAULT_WRITER_HEAP_BYTES,
};
pub use manager::{IndexDeclaration, IndexManager, DEFAULT_KEY_TERMS};
pub use query::{dict_to_query, list_to_query, quote_term, BoolOp, Escaping};
pub use registry::SyncRegistry;
pub use resolve::{resolve, RecordStore};
pub use schema::{FieldKind, IndexFieldType, IndexSchema, FIELD_ID};
