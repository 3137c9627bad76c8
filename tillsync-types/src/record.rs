//! The record envelope shared by every synchronized table.

use crate::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A raw settings row as the backend returns it: a flat JSON object whose
/// shape depends on the table.
pub type RawRow = Map<String, Value>;

/// An identified, opaque payload.
///
/// Sync is whole-record overwrite: two records with the same id are never
/// merged field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Key, unique within its collection.
    pub id: RecordId,
    /// Application-defined JSON payload.
    pub data: Value,
}

impl Record {
    /// Creates a record from a key and payload.
    pub fn new(id: impl Into<RecordId>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Creates a record with a freshly generated key.
    pub fn create(data: Value) -> Self {
        Self {
            id: RecordId::generate(),
            data,
        }
    }

    /// Reads a string field from an object payload.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}
