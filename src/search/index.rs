use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tantivy::collector::TopDocs;
use tantivy::query::{MoreLikeThisQuery, Query, QueryParser, QueryParserError, TermQuery};
use tantivy::schema::{Field, FieldType, IndexRecordOption, OwnedValue, Value};
use tantivy::tokenizer::TokenStream;
use tantivy::{
    DocAddress, Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term,
};

use super::error::SearchError;
use super::schema::{IndexSchema, FIELD_ID};
use crate::models::Record;

/// Default heap handed to each index writer
pub const DEFAULT_WRITER_HEAP_BYTES: usize = 50_000_000;

/// Upper bound on terms seeding a "more like this" query
const MORE_LIKE_THIS_QUERY_TERMS: usize = 5;

/// How a document write treats an existing document with the same id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Add,
    Update,
}

/// Stringified field values for one record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDocument {
    values: Vec<(String, String)>,
}

impl IndexDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.push((field.into(), value.into()));
        self
    }

    /// Collect the schema's fields from `record`; fields without a value are left out
    pub fn from_record<R: Record>(schema: &IndexSchema, record: &R) -> Self {
        let values = schema
            .field_names()
            .filter_map(|name| {
                let value = if name == FIELD_ID {
                    Some(record.id())
                } else {
                    record.field_value(name)
                };
                value.map(|value| (name.to_string(), value))
            })
            .collect();
        Self { values }
    }

    pub fn values(&self) -> &[(String, String)] {
        &self.values
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.get(FIELD_ID)
    }
}

/// A search match with its record id and relevance score
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
}

/// Check whether an index has been created at `location`
pub fn index_exists(location: &Path) -> bool {
    location.join("meta.json").exists()
}

/// Create an index with `schema` at `location` unless one already exists.
///
/// An existing index is left untouched even if its schema differs.
/// Returns whether a new index was created.
pub fn ensure_index(location: &Path, schema: &IndexSchema) -> Result<bool, SearchError> {
    std::fs::create_dir_all(location)?;

    if index_exists(location) {
        log::debug!("Reusing existing index at {:?}", location);
        return Ok(false);
    }

    Index::create_in_dir(location, schema.to_tantivy())?;
    log::info!(
        "Created index at {:?} with fields {:?}",
        location,
        schema.field_names().collect::<Vec<_>>()
    );
    Ok(true)
}

/// Parse a datetime value; accepts RFC 3339 and `%Y-%m-%d %H:%M:%S` (UTC)
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Most hits a search can return: every live document, at least one
fn collect_cap(searcher: &Searcher) -> usize {
    usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX).max(1)
}

/// An open handle on an on-disk Tantivy index
pub struct IndexStore {
    location: PathBuf,
    index: Index,
    reader: IndexReader,
    id_field: Field,
    writer_heap_bytes: usize,
}

impl IndexStore {
    /// Open the existing index at `location`
    pub fn open(location: &Path) -> Result<Self, SearchError> {
        Self::open_with_heap(location, DEFAULT_WRITER_HEAP_BYTES)
    }

    pub fn open_with_heap(location: &Path, writer_heap_bytes: usize) -> Result<Self, SearchError> {
        if !index_exists(location) {
            return Err(SearchError::IndexNotFound(location.to_path_buf()));
        }

        let index = Index::open_in_dir(location)?;
        let id_field = index.schema().get_field(FIELD_ID)?;

        // Reloaded explicitly after each commit and before each search
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            location: location.to_path_buf(),
            index,
            reader,
            id_field,
            writer_heap_bytes,
        })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Convert stringified values according to the field types of the opened index
    fn to_tantivy_doc(&self, document: &IndexDocument) -> Result<TantivyDocument, SearchError> {
        let schema = self.index.schema();
        let mut doc = TantivyDocument::new();

        for (name, value) in document.values() {
            let field = schema.get_field(name)?;
            let invalid = || SearchError::InvalidFieldValue {
                field: name.clone(),
                value: value.clone(),
            };

            match schema.get_field_entry(field).field_type() {
                FieldType::Str(_) => doc.add_text(field, value),
                FieldType::Date(_) => {
                    let dt = parse_datetime(value).ok_or_else(invalid)?;
                    doc.add_date(
                        field,
                        tantivy::DateTime::from_timestamp_micros(dt.timestamp_micros()),
                    );
                }
                FieldType::U64(_) => doc.add_u64(field, value.parse().map_err(|_| invalid())?),
                FieldType::I64(_) => doc.add_i64(field, value.parse().map_err(|_| invalid())?),
                FieldType::F64(_) => doc.add_f64(field, value.parse().map_err(|_| invalid())?),
                FieldType::Bool(_) => doc.add_bool(field, value.parse().map_err(|_| invalid())?),
                _ => return Err(invalid()),
            }
        }

        Ok(doc)
    }

    /// Write one document and commit it before returning.
    ///
    /// The writer lock is taken for this call only. If another process holds
    /// it the call fails with `WriteConflict`.
    pub fn write(&self, document: &IndexDocument, mode: WriteMode) -> Result<(), SearchError> {
        let id = document.id().ok_or_else(|| SearchError::InvalidFieldValue {
            field: FIELD_ID.to_string(),
            value: String::new(),
        })?;
        let doc = self.to_tantivy_doc(document)?;

        let mut writer: IndexWriter = self
            .index
            .writer_with_num_threads(1, self.writer_heap_bytes)?;

        if mode == WriteMode::Update {
            writer.delete_term(Term::from_field_text(self.id_field, id));
        }
        writer.add_document(doc)?;
        writer.commit()?;
        writer.wait_merging_threads()?;

        // Reload reader to see committed changes immediately
        self.reader.reload()?;

        log::debug!("Indexed document {} ({:?}) at {:?}", id, mode, self.location);
        Ok(())
    }

    fn searcher(&self) -> Result<Searcher, SearchError> {
        self.reader.reload()?;
        Ok(self.reader.searcher())
    }

    /// Parse `query` with `fields` as the default search fields
    pub fn parse(&self, fields: &[&str], query: &str) -> Result<Box<dyn Query>, SearchError> {
        let schema = self.index.schema();
        let fields = fields
            .iter()
            .map(|name| {
                schema
                    .get_field(name)
                    .map_err(|_| QueryParserError::FieldDoesNotExist(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut query_parser = QueryParser::for_index(&self.index, fields);
        query_parser.set_conjunction_by_default();

        Ok(query_parser.parse_query(query)?)
    }

    /// Run `query`, returning hits in relevance order; no limit means every match
    pub fn search(
        &self,
        query: &dyn Query,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let searcher = self.searcher()?;
        let limit = match limit {
            Some(0) => return Ok(vec![]),
            Some(limit) => limit.min(collect_cap(&searcher)),
            None => collect_cap(&searcher),
        };

        let top_docs = searcher.search(query, &TopDocs::with_limit(limit))?;
        self.collect_hits(&searcher, top_docs)
    }

    fn collect_hits(
        &self,
        searcher: &Searcher,
        top_docs: Vec<(f32, DocAddress)>,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let retrieved_doc: TantivyDocument = searcher.doc(doc_address)?;
            if let Some(id) = retrieved_doc.get_first(self.id_field).and_then(|v| v.as_str()) {
                results.push(SearchHit {
                    id: id.to_string(),
                    score,
                });
            }
        }
        Ok(results)
    }

    fn find_address(&self, searcher: &Searcher, id: &str) -> Result<DocAddress, SearchError> {
        let query = TermQuery::new(
            Term::from_field_text(self.id_field, id),
            IndexRecordOption::Basic,
        );
        searcher
            .search(&query, &TopDocs::with_limit(1))?
            .first()
            .map(|(_, address)| *address)
            .ok_or_else(|| SearchError::DocumentNotFound(id.to_string()))
    }

    /// Stored, indexed text field named `name`
    fn text_field(&self, name: &str) -> Result<Field, SearchError> {
        let schema = self.index.schema();
        let field = schema.get_field(name)?;
        let entry = schema.get_field_entry(field);
        let is_text = matches!(entry.field_type(), FieldType::Str(_));
        if !(is_text && entry.is_stored() && entry.is_indexed()) {
            return Err(SearchError::FieldNotStored(name.to_string()));
        }
        Ok(field)
    }

    /// Highest-weighted terms of `field` in the document for `id`
    pub fn key_terms(
        &self,
        id: &str,
        field_name: &str,
        max_terms: usize,
    ) -> Result<Vec<(String, f32)>, SearchError> {
        let field = self.text_field(field_name)?;
        let searcher = self.searcher()?;
        let address = self.find_address(&searcher, id)?;
        let doc: TantivyDocument = searcher.doc(address)?;

        let mut analyzer = self.index.tokenizer_for_field(field)?;
        let mut frequencies: HashMap<String, u32> = HashMap::new();
        for text in doc.get_all(field).filter_map(|v| v.as_str()) {
            let mut stream = analyzer.token_stream(text);
            while stream.advance() {
                *frequencies.entry(stream.token().text.clone()).or_default() += 1;
            }
        }

        let num_docs = searcher.num_docs() as f32;
        let mut scored = Vec::with_capacity(frequencies.len());
        for (term_text, tf) in frequencies {
            let df = searcher.doc_freq(&Term::from_field_text(field, &term_text))? as f32;
            let idf = (1.0 + (num_docs - df + 0.5) / (df + 0.5)).ln();
            scored.push((term_text, tf as f32 * idf));
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(max_terms);
        Ok(scored)
    }

    /// Documents whose `field` resembles that of the document for `id`, excluding it
    pub fn more_like_this(
        &self,
        id: &str,
        field_name: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let field = self.text_field(field_name)?;
        let searcher = self.searcher()?;
        let address = self.find_address(&searcher, id)?;
        let doc: TantivyDocument = searcher.doc(address)?;

        let values: Vec<OwnedValue> = doc
            .get_all(field)
            .filter_map(|v| v.as_str())
            .map(|text| OwnedValue::Str(text.to_string()))
            .collect();
        if values.is_empty() || limit == Some(0) {
            return Ok(vec![]);
        }

        let query = MoreLikeThisQuery::builder()
            .with_min_doc_frequency(1)
            .with_min_term_frequency(1)
            .with_max_query_terms(MORE_LIKE_THIS_QUERY_TERMS)
            .with_document_fields(vec![(field, values)]);

        let cap = collect_cap(&searcher);
        let limit = limit.map_or(cap, |limit| limit.min(cap));
        let top_docs: Vec<(f32, DocAddress)> = searcher
            .search(&query, &TopDocs::with_limit(limit.saturating_add(1)))?
            .into_iter()
            .filter(|(_, candidate)| *candidate != address)
            .take(limit)
            .collect();

        self.collect_hits(&searcher, top_docs)
    }

    /// Number of live documents in the last committed state
    pub fn doc_count(&self) -> Result<u64, SearchError> {
        Ok(self.searcher()?.num_docs())
    }
}

/// Index location shared by every record type registered on it.
///
/// Caches one open handle and serializes in-process writers, so a write
/// waits for any other write on the same location to commit first.
pub struct SharedIndex {
    location: PathBuf,
    writer_heap_bytes: usize,
    store: RwLock<Option<Arc<IndexStore>>>,
    write_gate: Mutex<()>,
}

impl SharedIndex {
    pub fn new(location: PathBuf, writer_heap_bytes: usize) -> Self {
        Self {
            location,
            writer_heap_bytes,
            store: RwLock::new(None),
            write_gate: Mutex::new(()),
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn ensure(&self, schema: &IndexSchema) -> Result<bool, SearchError> {
        ensure_index(&self.location, schema)
    }

    /// The cached handle, opening the index on first use
    pub fn store(&self) -> Result<Arc<IndexStore>, SearchError> {
        if let Some(store) = self.store.read()?.as_ref() {
            return Ok(Arc::clone(store));
        }

        let mut guard = self.store.write()?;
        if let Some(store) = guard.as_ref() {
            return Ok(Arc::clone(store));
        }
        let store = Arc::new(IndexStore::open_with_heap(
            &self.location,
            self.writer_heap_bytes,
        )?);
        *guard = Some(Arc::clone(&store));
        Ok(store)
    }

    pub fn write(&self, document: &IndexDocument, mode: WriteMode) -> Result<(), SearchError> {
        let _gate = self.write_gate.lock()?;
        let result = self.store()?.write(document, mode);
        if let Err(SearchError::WriteConflict(reason)) = &result {
            log::warn!("Index write at {:?} blocked by another writer: {}", self.location, reason);
        }
        result
    }

    /// Drop the cached handle; the next access reopens the index
    pub fn invalidate(&self) -> Result<(), SearchError> {
        self.store.write()?.take();
        Ok(())
    }

    /// Delete everything at the location and create a fresh index with `schema`
    pub fn reset(&self, schema: &IndexSchema) -> Result<(), SearchError> {
        let _gate = self.write_gate.lock()?;
        self.invalidate()?;

        if self.location.exists() {
            std::fs::remove_dir_all(&self.location)?;
        }
        ensure_index(&self.location, schema)?;
        Ok(())
    }
}
