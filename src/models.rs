use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::search::{FieldKind, HookError, SearchError};

/// A named, typed field of a record type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Field introspection for a record type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordType {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl RecordType {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Build a record type from `(field name, kind name)` pairs.
    /// Fails with `UnmappedFieldKind` on a kind name with no index mapping.
    pub fn from_declared(name: &str, fields: &[(&str, &str)]) -> Result<Self, SearchError> {
        let fields = fields
            .iter()
            .map(|(field, kind)| -> Result<FieldDef, SearchError> {
                Ok(FieldDef::new(*field, kind.parse()?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(name, fields))
    }

    pub fn field_kind(&self, field: &str) -> Option<FieldKind> {
        self.fields.iter().find(|f| f.name == field).map(|f| f.kind)
    }
}

/// A record whose fields can be mirrored into the search index
pub trait Record {
    /// Identity used to key index registrations and event subscriptions
    const TYPE_NAME: &'static str;

    fn record_type() -> RecordType;

    fn id(&self) -> String;

    /// Stringified value of `field`, or `None` when the record has no value
    fn field_value(&self, field: &str) -> Option<String>;

    /// Called after the record's index document has been committed
    fn on_indexed(&self) -> Result<(), HookError>;
}

/// A blog post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub date_posted: DateTime<Utc>,
}

impl Record for Post {
    const TYPE_NAME: &'static str = "post";

    fn record_type() -> RecordType {
        RecordType::new(
            Self::TYPE_NAME,
            vec![
                FieldDef::new("id", FieldKind::AutoId),
                FieldDef::new("title", FieldKind::Char),
                FieldDef::new("body", FieldKind::Text),
                FieldDef::new("date_posted", FieldKind::DateTime),
            ],
        )
    }

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn field_value(&self, field: &str) -> Option<String> {
        match field {
            "id" => Some(self.id.to_string()),
            "title" => Some(self.title.clone()),
            "body" => Some(self.body.clone()),
            "date_posted" => Some(self.date_posted.to_rfc3339()),
            _ => None,
        }
    }

    fn on_indexed(&self) -> Result<(), HookError> {
        log::trace!("Post {} indexed", self.id);
        Ok(())
    }
}

/// Input for creating a new post
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostInput {
    pub title: String,
    pub body: String,
}

/// Input for updating an existing post
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostInput {
    pub title: Option<String>,
    pub body: Option<String>,
}
