//! The closed catalogue of synchronized tables.
//!
//! Both groups are fixed at compile time. The realtime feed, the full sync
//! fan-out and the snapshot tracker all enumerate the same two lists, so a
//! table missing here is a table that never syncs.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Constant key of the singleton business settings row.
pub const BUSINESS_SETTINGS_ID: &str = "default";

/// Transactional tables using the `{id, data}` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataTable {
    Products,
    Orders,
    Customers,
    InventoryLogs,
    AuditLogs,
}

impl DataTable {
    /// Every data table, in fetch order.
    pub const ALL: [DataTable; 5] = [
        DataTable::Products,
        DataTable::Orders,
        DataTable::Customers,
        DataTable::InventoryLogs,
        DataTable::AuditLogs,
    ];

    /// The collection whose emptiness decides the bootstrap rule.
    pub const PRIMARY: DataTable = DataTable::Products;

    /// Backend table name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            DataTable::Products => "products",
            DataTable::Orders => "orders",
            DataTable::Customers => "customers",
            DataTable::InventoryLogs => "inventory_logs",
            DataTable::AuditLogs => "audit_logs",
        }
    }

    /// Log-like tables whose new local entries are pushed as soon as they
    /// appear.
    #[must_use]
    pub const fn is_append_only(self) -> bool {
        matches!(self, DataTable::InventoryLogs | DataTable::AuditLogs)
    }
}

/// How a settings table's rows map onto records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsShape {
    /// One row per config item, keyed by an `id` column.
    Named,
    /// Rows carry only a `name`; identity is the slug of that name.
    NameOnly,
    /// Exactly one row, keyed by [`BUSINESS_SETTINGS_ID`].
    Singleton,
}

/// Configuration tables: small, rarely edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsTable {
    OrderStatuses,
    PaymentMethods,
    TaxRates,
    Categories,
    BusinessSettings,
}

impl SettingsTable {
    /// Every settings table, in fetch order.
    pub const ALL: [SettingsTable; 5] = [
        SettingsTable::OrderStatuses,
        SettingsTable::PaymentMethods,
        SettingsTable::TaxRates,
        SettingsTable::Categories,
        SettingsTable::BusinessSettings,
    ];

    /// Backend table name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            SettingsTable::OrderStatuses => "order_statuses",
            SettingsTable::PaymentMethods => "payment_methods",
            SettingsTable::TaxRates => "tax_rates",
            SettingsTable::Categories => "categories",
            SettingsTable::BusinessSettings => "business_settings",
        }
    }

    /// Row shape of this table.
    #[must_use]
    pub const fn shape(self) -> SettingsShape {
        match self {
            SettingsTable::Categories => SettingsShape::NameOnly,
            SettingsTable::BusinessSettings => SettingsShape::Singleton,
            _ => SettingsShape::Named,
        }
    }
}

/// Any synchronized table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Table {
    Data(DataTable),
    Settings(SettingsTable),
}

impl Table {
    /// Every table: the data group followed by the settings group.
    pub fn all() -> impl Iterator<Item = Table> {
        DataTable::ALL
            .into_iter()
            .map(Table::Data)
            .chain(SettingsTable::ALL.into_iter().map(Table::Settings))
    }

    /// The data group.
    pub fn data_group() -> Vec<Table> {
        DataTable::ALL.into_iter().map(Table::Data).collect()
    }

    /// The settings group.
    pub fn settings_group() -> Vec<Table> {
        SettingsTable::ALL.into_iter().map(Table::Settings).collect()
    }

    /// Backend table name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Table::Data(t) => t.name(),
            Table::Settings(t) => t.name(),
        }
    }

    /// Whether removals from this table are propagated by diffing.
    #[must_use]
    pub const fn tracks_deletions(self) -> bool {
        !matches!(self, Table::Settings(SettingsTable::BusinessSettings))
    }

    /// Whether new local entries are pushed immediately.
    #[must_use]
    pub const fn is_append_only(self) -> bool {
        match self {
            Table::Data(t) => t.is_append_only(),
            Table::Settings(_) => false,
        }
    }
}

impl From<DataTable> for Table {
    fn from(t: DataTable) -> Self {
        Table::Data(t)
    }
}

impl From<SettingsTable> for Table {
    fn from(t: SettingsTable) -> Self {
        Table::Settings(t)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::all()
            .find(|t| t.name() == s)
            .ok_or_else(|| Error::UnknownTable(s.to_string()))
    }
}

impl From<Table> for String {
    fn from(t: Table) -> Self {
        t.name().to_string()
    }
}

impl TryFrom<String> for Table {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
