//! Per-record-type index manager
//!
//! Mirrors record saves into the shared index and answers queries against it
//! with record identifiers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::SearchError;
use super::index::{IndexDocument, SearchHit, SharedIndex, WriteMode};
use super::query::{dict_to_query, list_to_query, BoolOp, Escaping};
use super::resolve::{resolve, RecordStore};
use super::schema::IndexSchema;
use crate::models::{Record, RecordType};

/// Number of key terms returned when the caller does not ask for a count
pub const DEFAULT_KEY_TERMS: usize = 20;

/// What a record type exposes to the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDeclaration {
    /// Fields mirrored into the index; `id` is always added
    pub fields: Vec<String>,
    /// Field searched by `query_default`
    #[serde(default)]
    pub default_field: Option<String>,
    /// Sync on every save and delete event
    #[serde(default = "default_real_time")]
    pub real_time: bool,
}

fn default_real_time() -> bool {
    true
}

impl IndexDeclaration {
    pub fn new<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            default_field: None,
            real_time: true,
        }
    }

    pub fn with_default_field(mut self, field: impl Into<String>) -> Self {
        self.default_field = Some(field.into());
        self
    }

    pub fn with_real_time(mut self, real_time: bool) -> Self {
        self.real_time = real_time;
        self
    }
}

/// Keeps one record type's documents in the shared index and queries them
pub struct IndexManager {
    record_type: RecordType,
    declaration: IndexDeclaration,
    schema: IndexSchema,
    shared: Arc<SharedIndex>,
}

impl IndexManager {
    /// Derive the schema for `record_type` and make sure the index exists
    pub fn register(
        record_type: RecordType,
        declaration: IndexDeclaration,
        shared: Arc<SharedIndex>,
    ) -> Result<Self, SearchError> {
        let schema = IndexSchema::derive(&record_type, &declaration.fields)?;
        shared.ensure(&schema)?;

        Ok(Self {
            record_type,
            declaration,
            schema,
            shared,
        })
    }

    pub fn type_name(&self) -> &str {
        &self.record_type.name
    }

    pub fn declaration(&self) -> &IndexDeclaration {
        &self.declaration
    }

    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    pub fn is_real_time(&self) -> bool {
        self.declaration.real_time
    }

    /// Documents in the shared index location, across all record types
    pub fn document_count(&self) -> Result<u64, SearchError> {
        self.shared.store()?.doc_count()
    }

    /// Mirror a saved record into the index, then run its post-index hook.
    ///
    /// A created record is added; an existing one replaces the document with
    /// the same id.
    pub fn sync_saved<R: Record>(&self, record: &R, created: bool) -> Result<(), SearchError> {
        let document = IndexDocument::from_record(&self.schema, record);
        let mode = if created {
            WriteMode::Add
        } else {
            WriteMode::Update
        };

        self.shared.write(&document, mode)?;
        record.on_indexed().map_err(SearchError::PostIndexHook)
    }

    /// Deleted records are not removed from the index.
    ///
    /// They stay searchable until `rebuild_index` runs.
    pub fn sync_deleted<R: Record>(&self, record: &R) -> Result<(), SearchError> {
        log::warn!(
            "{} {} deleted; its index document is kept until the next rebuild",
            self.record_type.name,
            record.id()
        );
        Ok(())
    }

    /// Wipe the index location and re-add every record in `instances`.
    ///
    /// Returns the number of records written.
    pub fn rebuild_index<'a, R, I>(&self, instances: I) -> Result<usize, SearchError>
    where
        R: Record + 'a,
        I: IntoIterator<Item = &'a R>,
    {
        log::info!(
            "Rebuilding index for {} at {:?}",
            self.record_type.name,
            self.shared.location()
        );
        self.shared.reset(&self.schema)?;

        let mut count = 0;
        for record in instances {
            self.sync_saved(record, true)?;
            count += 1;
        }

        log::info!("Rebuilt index for {} with {} records", self.record_type.name, count);
        Ok(count)
    }

    fn search_ids(&self, fields: &[&str], query: &str) -> Result<Vec<String>, SearchError> {
        if query.trim().is_empty() {
            return Ok(vec![]);
        }

        let store = self.shared.store()?;
        let parsed = store.parse(fields, query)?;
        let hits = store.search(parsed.as_ref(), None)?;

        log::debug!("Query {:?} on {:?} matched {} documents", query, fields, hits.len());
        Ok(hits.into_iter().map(|hit| hit.id).collect())
    }

    /// Ids of documents matching `query` parsed against `field`
    pub fn query(&self, field: &str, query: &str) -> Result<Vec<String>, SearchError> {
        self.search_ids(&[field], query)
    }

    /// `query` against the declared default field
    pub fn query_default(&self, query: &str) -> Result<Vec<String>, SearchError> {
        let field = self
            .declaration
            .default_field
            .as_deref()
            .ok_or_else(|| SearchError::NoDefaultField(self.record_type.name.clone()))?;
        self.query(field, query)
    }

    /// Ids of documents where any of `fields` matches `query`
    pub fn query_multifield<S: AsRef<str>>(
        &self,
        fields: &[S],
        query: &str,
    ) -> Result<Vec<String>, SearchError> {
        let fields: Vec<&str> = fields.iter().map(AsRef::as_ref).collect();
        self.search_ids(&fields, query)
    }

    pub fn query_list<S: AsRef<str>>(
        &self,
        field: &str,
        terms: &[S],
        op: BoolOp,
        escaping: Escaping,
    ) -> Result<Vec<String>, SearchError> {
        self.query(field, &list_to_query(terms, op, escaping))
    }

    /// Documents matching every term; terms are not escaped
    pub fn query_list_and<S: AsRef<str>>(
        &self,
        field: &str,
        terms: &[S],
    ) -> Result<Vec<String>, SearchError> {
        self.query_list(field, terms, BoolOp::And, Escaping::Raw)
    }

    /// Documents matching any term; terms are not escaped
    pub fn query_list_or<S: AsRef<str>>(
        &self,
        field: &str,
        terms: &[S],
    ) -> Result<Vec<String>, SearchError> {
        self.query_list(field, terms, BoolOp::Or, Escaping::Raw)
    }

    /// Documents matching every non-empty `field: value` pair
    pub fn query_multifield_dict<I, K, V>(&self, pairs: I) -> Result<Vec<String>, SearchError>
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let (fields, query) = dict_to_query(pairs);
        if fields.is_empty() {
            return Ok(vec![]);
        }
        self.query_multifield(&fields, &query)
    }

    /// Top `max_terms` key terms of `field` for the record `id`, best first
    pub fn keywords_for(
        &self,
        field: &str,
        id: &str,
        max_terms: usize,
    ) -> Result<Vec<String>, SearchError> {
        let terms = self.shared.store()?.key_terms(id, field, max_terms)?;
        Ok(terms.into_iter().map(|(term, _)| term).collect())
    }

    /// `keywords_for` with [`DEFAULT_KEY_TERMS`] terms
    pub fn default_keywords_for(&self, field: &str, id: &str) -> Result<Vec<String>, SearchError> {
        self.keywords_for(field, id, DEFAULT_KEY_TERMS)
    }

    /// Ids of documents similar to record `id` in `field`, most similar first
    pub fn similar_ids(
        &self,
        field: &str,
        id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<String>, SearchError> {
        let hits: Vec<SearchHit> = self.shared.store()?.more_like_this(id, field, limit)?;
        Ok(hits.into_iter().map(|hit| hit.id).collect())
    }

    /// Records similar to record `id` in `field`, resolved through `store`
    pub fn more_like_this<R, S>(
        &self,
        store: &S,
        field: &str,
        id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<R>, SearchError>
    where
        S: RecordStore<R>,
    {
        let ids = self.similar_ids(field, id, limit)?;
        resolve(store, &ids)
    }
}
