//! Known schema and default seed data for the test store.
//!
//! The schema version is a single integer stamped in the `system` table;
//! reconciliation compares it against [`DB_VERSION`] and only ever clears
//! (on match) or destroys and rebuilds (on mismatch). There is no
//! incremental migration path.

use serde_json::json;

use crate::db::traits::{Row, TableDef};

/// Expected schema version for the current table layout.
pub const DB_VERSION: u32 = 29;

/// Name of the metadata table carrying the version stamp.
pub const SYSTEM_TABLE: &str = "system";

/// Key of the version row inside [`SYSTEM_TABLE`].
pub const VERSION_KEY: &str = "database_version";

/// The full table layout for version [`DB_VERSION`].
#[must_use]
pub fn schema() -> Vec<TableDef> {
    vec![
        TableDef::new(SYSTEM_TABLE, &["name", "value"]),
        TableDef::new("session", &["sid", "authenticated", "last_visit"]),
        TableDef::new("session_attribute", &["sid", "authenticated", "name", "value"]),
        TableDef::new("permission", &["username", "action"]),
        TableDef::new("enum", &["type", "name", "value"]),
    ]
}

/// Rows to seed into one table.
#[derive(Debug, Clone)]
pub struct TableData {
    /// Target table name.
    pub table: String,
    /// Rows in schema column order.
    pub rows: Vec<Row>,
}

/// Provider of table-name → row sets, consumed by
/// [`DatabaseManager::insert_into_tables`](crate::db::DatabaseManager::insert_into_tables).
pub trait DataProvider {
    /// The data to insert, grouped per table.
    fn data(&self) -> Vec<TableData>;
}

/// The built-in default data set.
///
/// Includes the version stamp row, so seeding with defaults leaves the
/// store at [`DB_VERSION`] without a separate stamping step.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultData;

impl DataProvider for DefaultData {
    fn data(&self) -> Vec<TableData> {
        vec![
            TableData {
                table: SYSTEM_TABLE.to_string(),
                rows: vec![vec![json!(VERSION_KEY), json!(DB_VERSION)]],
            },
            TableData {
                table: "permission".to_string(),
                rows: vec![
                    vec![json!("anonymous"), json!("WIKI_VIEW")],
                    vec![json!("anonymous"), json!("TICKET_VIEW")],
                    vec![json!("authenticated"), json!("TICKET_CREATE")],
                ],
            },
            TableData {
                table: "enum".to_string(),
                rows: vec![
                    vec![json!("priority"), json!("blocker"), json!("1")],
                    vec![json!("priority"), json!("critical"), json!("2")],
                    vec![json!("priority"), json!("major"), json!("3")],
                    vec![json!("priority"), json!("minor"), json!("4")],
                    vec![json!("priority"), json!("trivial"), json!("5")],
                ],
            },
        ]
    }
}
