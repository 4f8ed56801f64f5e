use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tantivy::schema::{
    IndexRecordOption, Schema, TextFieldIndexing, TextOptions, INDEXED, STORED, STRING, TEXT,
};

use super::error::SearchError;
use crate::models::RecordType;

/// Field name every index document carries
pub const FIELD_ID: &str = "id";

/// Tokenizer used for keyword fields (split on whitespace, no lowercasing)
const KEYWORD_TOKENIZER: &str = "whitespace";

/// How a field is represented inside the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexFieldType {
    /// Untokenized, stored and unique per document
    UniqueId,
    /// Untokenized and indexed, not stored
    Id,
    /// Stored verbatim, not searchable
    Stored,
    /// Tokenized and stored
    Text,
    /// Whitespace-separated keywords
    Keyword,
    DateTime,
}

/// Kinds of record fields that can be mirrored into the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    AutoId,
    Boolean,
    NullBoolean,
    Char,
    Text,
    Slug,
    Email,
    Url,
    IpAddress,
    File,
    FilePath,
    Image,
    Date,
    Time,
    DateTime,
    Decimal,
    Float,
    Integer,
    SmallInteger,
    PositiveInteger,
    PositiveSmallInteger,
    CommaSeparatedInteger,
    ForeignKey,
}

impl FieldKind {
    pub const ALL: [FieldKind; 23] = [
        FieldKind::AutoId,
        FieldKind::Boolean,
        FieldKind::NullBoolean,
        FieldKind::Char,
        FieldKind::Text,
        FieldKind::Slug,
        FieldKind::Email,
        FieldKind::Url,
        FieldKind::IpAddress,
        FieldKind::File,
        FieldKind::FilePath,
        FieldKind::Image,
        FieldKind::Date,
        FieldKind::Time,
        FieldKind::DateTime,
        FieldKind::Decimal,
        FieldKind::Float,
        FieldKind::Integer,
        FieldKind::SmallInteger,
        FieldKind::PositiveInteger,
        FieldKind::PositiveSmallInteger,
        FieldKind::CommaSeparatedInteger,
        FieldKind::ForeignKey,
    ];

    /// The index representation for this kind of field
    pub fn index_type(self) -> IndexFieldType {
        match self {
            FieldKind::AutoId => IndexFieldType::UniqueId,
            FieldKind::Boolean
            | FieldKind::NullBoolean
            | FieldKind::Decimal
            | FieldKind::Float
            | FieldKind::Integer
            | FieldKind::SmallInteger
            | FieldKind::PositiveInteger
            | FieldKind::PositiveSmallInteger
            | FieldKind::CommaSeparatedInteger => IndexFieldType::Stored,
            FieldKind::Char | FieldKind::Text | FieldKind::ForeignKey => IndexFieldType::Text,
            FieldKind::Slug => IndexFieldType::Keyword,
            FieldKind::Email
            | FieldKind::Url
            | FieldKind::IpAddress
            | FieldKind::File
            | FieldKind::FilePath
            | FieldKind::Image
            | FieldKind::Date
            | FieldKind::Time => IndexFieldType::Id,
            FieldKind::DateTime => IndexFieldType::DateTime,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::AutoId => "auto_id",
            FieldKind::Boolean => "boolean",
            FieldKind::NullBoolean => "null_boolean",
            FieldKind::Char => "char",
            FieldKind::Text => "text",
            FieldKind::Slug => "slug",
            FieldKind::Email => "email",
            FieldKind::Url => "url",
            FieldKind::IpAddress => "ip_address",
            FieldKind::File => "file",
            FieldKind::FilePath => "file_path",
            FieldKind::Image => "image",
            FieldKind::Date => "date",
            FieldKind::Time => "time",
            FieldKind::DateTime => "date_time",
            FieldKind::Decimal => "decimal",
            FieldKind::Float => "float",
            FieldKind::Integer => "integer",
            FieldKind::SmallInteger => "small_integer",
            FieldKind::PositiveInteger => "positive_integer",
            FieldKind::PositiveSmallInteger => "positive_small_integer",
            FieldKind::CommaSeparatedInteger => "comma_separated_integer",
            FieldKind::ForeignKey => "foreign_key",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SearchError::UnmappedFieldKind(s.to_string()))
    }
}

/// Ordered field-name to index-type mapping for one record type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    fields: Vec<(String, IndexFieldType)>,
}

impl IndexSchema {
    /// Derive the index schema for `field_names` of `record_type`.
    ///
    /// Fields keep the requested order with duplicates removed; `id` is
    /// appended when not requested and is always a unique identifier.
    pub fn derive<S: AsRef<str>>(
        record_type: &RecordType,
        field_names: &[S],
    ) -> Result<Self, SearchError> {
        let mut fields: Vec<(String, IndexFieldType)> = Vec::with_capacity(field_names.len() + 1);

        let requested = field_names
            .iter()
            .map(AsRef::as_ref)
            .chain(std::iter::once(FIELD_ID));

        for name in requested {
            if fields.iter().any(|(existing, _)| existing == name) {
                continue;
            }
            let field_type = if name == FIELD_ID {
                IndexFieldType::UniqueId
            } else {
                record_type
                    .field_kind(name)
                    .ok_or_else(|| SearchError::UnknownField {
                        record_type: record_type.name.clone(),
                        field: name.to_string(),
                    })?
                    .index_type()
            };
            fields.push((name.to_string(), field_type));
        }

        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[(String, IndexFieldType)] {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn field_type(&self, name: &str) -> Option<IndexFieldType> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, field_type)| *field_type)
    }

    /// Build the Tantivy schema for this index
    pub fn to_tantivy(&self) -> Schema {
        let mut schema_builder = Schema::builder();

        for (name, field_type) in &self.fields {
            match field_type {
                IndexFieldType::UniqueId => {
                    schema_builder.add_text_field(name, STRING | STORED);
                }
                IndexFieldType::Id => {
                    schema_builder.add_text_field(name, STRING);
                }
                IndexFieldType::Stored => {
                    schema_builder.add_text_field(name, STORED);
                }
                IndexFieldType::Text => {
                    schema_builder.add_text_field(name, TEXT | STORED);
                }
                IndexFieldType::Keyword => {
                    let indexing = TextFieldIndexing::default()
                        .set_tokenizer(KEYWORD_TOKENIZER)
                        .set_index_option(IndexRecordOption::WithFreqs);
                    schema_builder
                        .add_text_field(name, TextOptions::default().set_indexing_options(indexing));
                }
                IndexFieldType::DateTime => {
                    schema_builder.add_date_field(name, INDEXED);
                }
            }
        }

        schema_builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldDef;
    use tantivy::schema::FieldType;

    fn article_type() -> RecordType {
        RecordType::new(
            "article",
            vec![
                FieldDef::new("id", FieldKind::AutoId),
                FieldDef::new("title", FieldKind::Char),
                FieldDef::new("body", FieldKind::Text),
                FieldDef::new("slug", FieldKind::Slug),
                FieldDef::new("published", FieldKind::DateTime),
                FieldDef::new("rating", FieldKind::Decimal),
                FieldDef::new("email", FieldKind::Email),
            ],
        )
    }

    #[test]
    fn test_derive_keeps_order_and_appends_id() {
        let schema = IndexSchema::derive(&article_type(), &["title", "body"]).unwrap();
        let names: Vec<&str> = schema.field_names().collect();
        assert_eq!(names, vec!["title", "body", "id"]);
        assert_eq!(schema.field_type("title"), Some(IndexFieldType::Text));
        assert_eq!(schema.field_type("id"), Some(IndexFieldType::UniqueId));
    }

    #[test]
    fn test_derive_removes_duplicates() {
        let schema =
            IndexSchema::derive(&article_type(), &["body", "id", "body", "title"]).unwrap();
        let names: Vec<&str> = schema.field_names().collect();
        assert_eq!(names, vec!["body", "id", "title"]);
    }

    #[test]
    fn test_derive_is_idempotent() {
        let fields = ["slug", "published", "rating"];
        let first = IndexSchema::derive(&article_type(), &fields).unwrap();
        let second = IndexSchema::derive(&article_type(), &fields).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.fields().len(), 4);
    }

    #[test]
    fn test_derive_unknown_field() {
        let err = IndexSchema::derive(&article_type(), &["missing"]).unwrap_err();
        assert!(matches!(err, SearchError::UnknownField { ref field, .. } if field == "missing"));
    }

    #[test]
    fn test_every_kind_round_trips_through_its_name() {
        for kind in FieldKind::ALL {
            assert_eq!(kind.as_str().parse::<FieldKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unmapped_kind_name() {
        let err = "geometry".parse::<FieldKind>().unwrap_err();
        assert!(matches!(err, SearchError::UnmappedFieldKind(ref kind) if kind == "geometry"));
    }

    #[test]
    fn test_kind_mapping_table() {
        assert_eq!(FieldKind::AutoId.index_type(), IndexFieldType::UniqueId);
        assert_eq!(FieldKind::Boolean.index_type(), IndexFieldType::Stored);
        assert_eq!(FieldKind::Char.index_type(), IndexFieldType::Text);
        assert_eq!(FieldKind::ForeignKey.index_type(), IndexFieldType::Text);
        assert_eq!(FieldKind::Slug.index_type(), IndexFieldType::Keyword);
        assert_eq!(FieldKind::Date.index_type(), IndexFieldType::Id);
        assert_eq!(FieldKind::DateTime.index_type(), IndexFieldType::DateTime);
        assert_eq!(FieldKind::Decimal.index_type(), IndexFieldType::Stored);
    }

    #[test]
    fn test_tantivy_schema_field_options() {
        let schema = IndexSchema::derive(
            &article_type(),
            &["title", "slug", "published", "rating", "email"],
        )
        .unwrap()
        .to_tantivy();

        let id = schema.get_field_entry(schema.get_field("id").unwrap());
        assert!(id.is_indexed());
        assert!(id.is_stored());

        let title = schema.get_field_entry(schema.get_field("title").unwrap());
        assert!(title.is_indexed());
        assert!(title.is_stored());

        let rating = schema.get_field_entry(schema.get_field("rating").unwrap());
        assert!(!rating.is_indexed());
        assert!(rating.is_stored());

        let email = schema.get_field_entry(schema.get_field("email").unwrap());
        assert!(email.is_indexed());
        assert!(!email.is_stored());

        let published = schema.get_field_entry(schema.get_field("published").unwrap());
        assert!(matches!(published.field_type(), FieldType::Date(_)));
    }
}
