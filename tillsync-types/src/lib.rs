//! Core type definitions for tillsync.
//!
//! This crate defines the vocabulary shared by the sync engine and its
//! collaborators:
//! - Tenant and record identifiers
//! - The `{id, data}` record envelope and raw settings rows
//! - The closed catalogue of synchronized tables
//! - Change notifications delivered by the realtime feed
//! - Slug derivation for name-keyed settings
//!
//! Record payloads are opaque JSON. What a "product" or an "order" means is
//! the business of the application, not of this crate.

mod change;
mod ids;
mod record;
mod slug;
mod table;

pub use change::{ChangeEvent, ChangeKind};
pub use ids::{RecordId, TenantId};
pub use record::{RawRow, Record};
pub use slug::slugify;
pub use table::{DataTable, SettingsShape, SettingsTable, Table, BUSINESS_SETTINGS_ID};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid tenant id: {0:?}")]
    InvalidTenant(String),

    #[error("invalid record id: {0:?}")]
    InvalidRecordId(String),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown change kind: {0}")]
    UnknownChangeKind(String),
}
