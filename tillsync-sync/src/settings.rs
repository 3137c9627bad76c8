//! Adapters between raw settings rows and records.
//!
//! Data tables already use the `{id, data}` envelope. Settings tables do
//! not: most rows are flat objects with an `id`, categories carry only a
//! `name`, and business settings is a single row. Everything downstream of
//! these adapters (store, snapshots, deletion diffing) sees plain records.

use serde_json::Value;
use std::collections::HashSet;
use tillsync_types::{
    slugify, RawRow, Record, RecordId, SettingsShape, SettingsTable, Table, BUSINESS_SETTINGS_ID,
};
use tracing::warn;

/// The key a record is diffed by.
///
/// Categories are identified by the slug of their name, whatever id the
/// record happens to carry; every other table uses the record id.
pub fn record_key(table: Table, record: &Record) -> RecordId {
    if let Table::Settings(settings) = table {
        if settings.shape() == SettingsShape::NameOnly {
            if let Some(name) = record.str_field("name") {
                let slug = slugify(name);
                if !slug.is_empty() {
                    return RecordId::new(slug);
                }
            }
        }
    }
    record.id.clone()
}

/// Builds a local category record from a display name.
pub fn category(name: &str) -> Record {
    Record::new(slugify(name), serde_json::json!({ "name": name }))
}

/// Converts fetched rows into records. Rows that cannot be identified are
/// skipped with a warning rather than failing the whole table.
pub fn rows_to_records(table: SettingsTable, rows: Vec<RawRow>) -> Vec<Record> {
    match table.shape() {
        SettingsShape::Named => rows
            .into_iter()
            .filter_map(|mut row| {
                let id = row.remove("id").and_then(|v| id_from_value(&v));
                match id {
                    Some(id) => Some(Record::new(id, Value::Object(row))),
                    None => {
                        warn!("Skipping {} row without an id", table.name());
                        None
                    }
                }
            })
            .collect(),
        SettingsShape::NameOnly => {
            let mut seen = HashSet::new();
            rows.into_iter()
                .filter_map(|mut row| {
                    row.remove("id");
                    let slug = row
                        .get("name")
                        .and_then(Value::as_str)
                        .map(slugify)
                        .unwrap_or_default();
                    if slug.is_empty() {
                        warn!("Skipping {} row without a usable name", table.name());
                        return None;
                    }
                    if !seen.insert(slug.clone()) {
                        return None;
                    }
                    Some(Record::new(slug, Value::Object(row)))
                })
                .collect()
        }
        SettingsShape::Singleton => {
            if rows.len() > 1 {
                warn!("{} returned {} rows, keeping the first", table.name(), rows.len());
            }
            rows.into_iter()
                .next()
                .map(|mut row| {
                    row.remove("id");
                    vec![Record::new(BUSINESS_SETTINGS_ID, Value::Object(row))]
                })
                .unwrap_or_default()
        }
    }
}

/// Converts records into rows ready for upsert.
pub fn records_to_rows(table: SettingsTable, records: &[Record]) -> Vec<RawRow> {
    let records = match table.shape() {
        SettingsShape::Singleton => &records[..records.len().min(1)],
        _ => records,
    };

    records
        .iter()
        .map(|record| {
            let mut row = match &record.data {
                Value::Object(fields) => fields.clone(),
                Value::Null => RawRow::new(),
                other => {
                    let mut row = RawRow::new();
                    row.insert("value".into(), other.clone());
                    row
                }
            };
            let id = match table.shape() {
                SettingsShape::Named => record.id.clone(),
                SettingsShape::NameOnly => record_key(Table::Settings(table), record),
                SettingsShape::Singleton => RecordId::new(BUSINESS_SETTINGS_ID),
            };
            row.insert("id".into(), Value::String(id.to_string()));
            row
        })
        .collect()
}

fn id_from_value(value: &Value) -> Option<RecordId> {
    match value {
        Value::String(s) if !s.is_empty() => Some(RecordId::new(s.as_str())),
        Value::Number(n) => Some(RecordId::new(n.to_string())),
        _ => None,
    }
}
