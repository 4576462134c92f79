//! Records read from source files.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a record is written to the destination index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    /// Index by id, replacing the whole document when it already exists.
    Upsert,
    /// Insert with an id generated by the index.
    Create,
}

/// One record: a mapping from field name to a scalar or nested value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Document fields.
    pub fields: Map<String, Value>,
    /// Document id taken from the identifier field, if present and non-empty.
    pub id: Option<String>,
    /// 1-based position of the record within its source file.
    pub position: u64,
}

impl Record {
    pub fn new(fields: Map<String, Value>, id: Option<String>, position: u64) -> Self {
        Self {
            fields,
            id,
            position,
        }
    }

    pub fn action(&self) -> WriteAction {
        match self.id {
            Some(_) => WriteAction::Upsert,
            None => WriteAction::Create,
        }
    }

    /// The record fields as a JSON object.
    pub fn document(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}
