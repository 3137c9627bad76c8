//! Change notifications pushed by the backend.

use crate::{Error, Table};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of row change the backend observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        };
        f.write_str(s)
    }
}

impl FromStr for ChangeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "insert" => Ok(ChangeKind::Insert),
            "update" => Ok(ChangeKind::Update),
            "delete" => Ok(ChangeKind::Delete),
            _ => Err(Error::UnknownChangeKind(s.to_string())),
        }
    }
}

/// "Table X changed."
///
/// The table is kept as the backend sent it; the engine resolves it against
/// the catalogue and drops names it does not track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Backend table name.
    pub table: String,
    /// What happened to the row.
    pub kind: ChangeKind,
}

impl ChangeEvent {
    /// Creates an event for a known table.
    pub fn new(table: impl Into<Table>, kind: ChangeKind) -> Self {
        Self {
            table: table.into().name().to_string(),
            kind,
        }
    }

    /// Resolves the table name against the catalogue.
    pub fn table(&self) -> Result<Table, Error> {
        self.table.parse()
    }
}
