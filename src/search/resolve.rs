//! Maps index identifiers back to records held by the record store

use super::error::SearchError;

/// A record store that can look up records by identifier
pub trait RecordStore<R> {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Records whose id is in `ids`, in whatever order the store produces
    fn filter_by_ids(&self, ids: &[String]) -> Result<Vec<R>, Self::Error>;
}

/// Resolve `ids` against `store`.
///
/// The returned order is the store's, not the relevance order of `ids`.
pub fn resolve<R, S>(store: &S, ids: &[String]) -> Result<Vec<R>, SearchError>
where
    S: RecordStore<R>,
{
    if ids.is_empty() {
        return Ok(vec![]);
    }
    store
        .filter_by_ids(ids)
        .map_err(|e| SearchError::Store(Box::new(e)))
}
