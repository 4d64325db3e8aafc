//! Documents and their identifiers

use std::fmt;
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Field map of a document
pub type Fields = Map<String, Value>;

/// Per-table document identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(pub u64);

impl DocId {
    /// Identifier following this one, `None` after `u64::MAX`
    pub fn next(self) -> Option<DocId> {
        self.0.checked_add(1).map(DocId)
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for DocId {
    fn from(id: u64) -> Self {
        DocId(id)
    }
}

impl PartialEq<u64> for DocId {
    fn eq(&self, other: &u64) -> bool {
        self.0 == *other
    }
}

/// A stored document: its fields tagged with the identifier they live under
///
/// Dereferences to the field map, so `doc["name"]` and `doc.get("name")`
/// work as on a plain map.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    doc_id: DocId,
    fields: Fields,
}

impl Document {
    /// Tag `fields` with `doc_id`
    ///
    /// Passing a `Document` to [`Table::insert`](crate::Table::insert)
    /// stores it under this exact identifier.
    pub fn new(fields: Fields, doc_id: DocId) -> Self {
        Self { doc_id, fields }
    }

    /// The document's identifier
    pub fn doc_id(&self) -> DocId {
        self.doc_id
    }

    /// Borrow the field map
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Consume the document, returning its field map
    pub fn into_fields(self) -> Fields {
        self.fields
    }
}

impl Deref for Document {
    type Target = Fields;

    fn deref(&self) -> &Fields {
        &self.fields
    }
}

impl DerefMut for Document {
    fn deref_mut(&mut self) -> &mut Fields {
        &mut self.fields
    }
}

impl PartialEq<Fields> for Document {
    fn eq(&self, other: &Fields) -> bool {
        &self.fields == other
    }
}

impl PartialEq<Value> for Document {
    fn eq(&self, other: &Value) -> bool {
        matches!(other, Value::Object(map) if map == &self.fields)
    }
}

/// Anything that can be inserted into a table
///
/// Plain field maps get a fresh identifier; a [`Document`] keeps its own.
/// A [`Value`] must be a JSON object.
pub trait IntoDocument {
    /// Split into an optional caller-chosen identifier and the fields
    fn into_document(self) -> Result<(Option<DocId>, Fields)>;
}

impl IntoDocument for Fields {
    fn into_document(self) -> Result<(Option<DocId>, Fields)> {
        Ok((None, self))
    }
}

impl IntoDocument for Document {
    fn into_document(self) -> Result<(Option<DocId>, Fields)> {
        Ok((Some(self.doc_id), self.fields))
    }
}

impl IntoDocument for Value {
    fn into_document(self) -> Result<(Option<DocId>, Fields)> {
        match self {
            Value::Object(fields) => Ok((None, fields)),
            other => Err(Error::usage(format!(
                "Document is not a Mapping: {}",
                other
            ))),
        }
    }
}
