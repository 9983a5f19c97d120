//! Embedded reference backend.
//!
//! A thread-safe in-memory implementation of [`StorageBackend`] standing in
//! for the real sqlite/postgres/mysql drivers. It is intended for tests and
//! as a reference implementation of the contract: every lifecycle path
//! (version stamping, clear, drop, file removal) is observable without a
//! database server.
//!
//! With a backing path the backend behaves like a file sqlite store: state
//! is written through to a JSON file, `shutdown` drops the cached state, and
//! the next access reloads from disk. That is what makes the "shutdown
//! before deleting the file" sequencing observable in tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::db::defaults::{SYSTEM_TABLE, VERSION_KEY};
use crate::db::traits::{Row, StorageBackend, TableDef};
use crate::error::StoreError;

fn lock_err(context: &'static str) -> StoreError {
    StoreError::Backend(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TableState {
    columns: Vec<String>,
    rows: Vec<Row>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SchemaState {
    tables: BTreeMap<String, TableState>,
}

#[derive(Debug)]
enum Cache {
    /// Backing file not consulted yet (fresh open, or after `shutdown`).
    Unloaded,
    /// No schema exists.
    Empty,
    /// Live schema.
    Ready(SchemaState),
}

/// In-memory [`StorageBackend`] with an optional JSON backing file.
#[derive(Debug)]
pub struct MemoryBackend {
    state: RwLock<Cache>,
    backing: Option<PathBuf>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Creates a pure in-memory backend (the `sqlite::memory:` shape).
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Cache::Empty),
            backing: None,
        }
    }

    /// Creates a backend persisted to `path` (the file sqlite shape).
    /// Existing state at `path` is loaded lazily on first access.
    #[must_use]
    pub fn with_backing(path: impl Into<PathBuf>) -> Self {
        Self {
            state: RwLock::new(Cache::Unloaded),
            backing: Some(path.into()),
        }
    }

    /// The backing file path, if this backend persists one.
    #[must_use]
    pub fn backing_path(&self) -> Option<&Path> {
        self.backing.as_deref()
    }

    fn load(&self, cache: &mut Cache) -> Result<(), StoreError> {
        if !matches!(cache, Cache::Unloaded) {
            return Ok(());
        }
        let Some(path) = &self.backing else {
            *cache = Cache::Empty;
            return Ok(());
        };
        *cache = match fs::read(path) {
            Ok(bytes) => Cache::Ready(
                serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?,
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Cache::Empty,
            Err(e) => return Err(e.into()),
        };
        Ok(())
    }

    fn flush(&self, cache: &Cache) -> Result<(), StoreError> {
        let Some(path) = &self.backing else {
            return Ok(());
        };
        match cache {
            Cache::Ready(state) => {
                let bytes = serde_json::to_vec(state)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                fs::write(path, bytes)?;
            }
            Cache::Empty => match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
            Cache::Unloaded => {}
        }
        Ok(())
    }

    fn ready<'a>(cache: &'a Cache) -> Result<&'a SchemaState, StoreError> {
        match cache {
            Cache::Ready(state) => Ok(state),
            _ => Err(StoreError::Absent("store holds no schema".to_string())),
        }
    }

    fn ready_mut<'a>(cache: &'a mut Cache) -> Result<&'a mut SchemaState, StoreError> {
        match cache {
            Cache::Ready(state) => Ok(state),
            _ => Err(StoreError::Absent("store holds no schema".to_string())),
        }
    }
}

impl StorageBackend for MemoryBackend {
    fn rollback(&self) -> Result<(), StoreError> {
        // transactions are not modeled here; there is nothing dangling
        Ok(())
    }

    fn database_version(&self) -> Result<Option<u32>, StoreError> {
        let mut cache = self.state.write().map_err(|_| lock_err("version"))?;
        self.load(&mut cache)?;
        let state = Self::ready(&cache)?;
        let system = state
            .tables
            .get(SYSTEM_TABLE)
            .ok_or_else(|| StoreError::NoSuchTable(SYSTEM_TABLE.to_string()))?;
        let version = system.rows.iter().find_map(|row| {
            if row.first().and_then(|v| v.as_str()) == Some(VERSION_KEY) {
                row.get(1).and_then(version_value)
            } else {
                None
            }
        });
        Ok(version)
    }

    fn set_database_version(&self, version: u32) -> Result<(), StoreError> {
        let mut cache = self.state.write().map_err(|_| lock_err("set version"))?;
        self.load(&mut cache)?;
        let state = Self::ready_mut(&mut cache)?;
        let system = state
            .tables
            .get_mut(SYSTEM_TABLE)
            .ok_or_else(|| StoreError::NoSuchTable(SYSTEM_TABLE.to_string()))?;
        system
            .rows
            .retain(|row| row.first().and_then(|v| v.as_str()) != Some(VERSION_KEY));
        system
            .rows
            .push(vec![VERSION_KEY.into(), serde_json::json!(version)]);
        self.flush(&cache)
    }

    fn create_tables(&self, schema: &[TableDef]) -> Result<(), StoreError> {
        let mut cache = self.state.write().map_err(|_| lock_err("create"))?;
        let mut state = SchemaState::default();
        for def in schema {
            state.tables.insert(
                def.name.clone(),
                TableState {
                    columns: def.columns.clone(),
                    rows: Vec::new(),
                },
            );
        }
        *cache = Cache::Ready(state);
        self.flush(&cache)
    }

    fn table_names(&self) -> Result<Vec<String>, StoreError> {
        let mut cache = self.state.write().map_err(|_| lock_err("table names"))?;
        self.load(&mut cache)?;
        let state = Self::ready(&cache)?;
        Ok(state.tables.keys().cloned().collect())
    }

    fn clear_tables(&self) -> Result<Vec<String>, StoreError> {
        let mut cache = self.state.write().map_err(|_| lock_err("clear"))?;
        self.load(&mut cache)?;
        let state = Self::ready_mut(&mut cache)?;
        let mut cleared = Vec::with_capacity(state.tables.len());
        for (name, table) in &mut state.tables {
            table.rows.clear();
            cleared.push(name.clone());
        }
        self.flush(&cache)?;
        Ok(cleared)
    }

    fn drop_table(&self, name: &str) -> Result<(), StoreError> {
        let mut cache = self.state.write().map_err(|_| lock_err("drop table"))?;
        self.load(&mut cache)?;
        let state = Self::ready_mut(&mut cache)?;
        if state.tables.remove(name).is_none() {
            return Err(StoreError::NoSuchTable(name.to_string()));
        }
        self.flush(&cache)
    }

    fn drop_schema(&self, schema: &str) -> Result<(), StoreError> {
        let mut cache = self.state.write().map_err(|_| lock_err("drop schema"))?;
        self.load(&mut cache)?;
        if !matches!(*cache, Cache::Ready(_)) {
            return Err(StoreError::NoSuchSchema(schema.to_string()));
        }
        *cache = Cache::Empty;
        self.flush(&cache)
    }

    fn insert(&self, table: &str, rows: &[Row]) -> Result<(), StoreError> {
        let mut cache = self.state.write().map_err(|_| lock_err("insert"))?;
        self.load(&mut cache)?;
        let state = Self::ready_mut(&mut cache)?;
        let target = state
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::NoSuchTable(table.to_string()))?;
        for row in rows {
            if row.len() != target.columns.len() {
                return Err(StoreError::Backend(format!(
                    "table {table}: row has {} values, schema has {} columns",
                    row.len(),
                    target.columns.len()
                )));
            }
            target.rows.push(row.clone());
        }
        self.flush(&cache)
    }

    fn rows(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let mut cache = self.state.write().map_err(|_| lock_err("rows"))?;
        self.load(&mut cache)?;
        let state = Self::ready(&cache)?;
        state
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .ok_or_else(|| StoreError::NoSuchTable(table.to_string()))
    }

    fn shutdown(&self) {
        let Ok(mut cache) = self.state.write() else {
            return;
        };
        if self.backing.is_some() {
            // best effort: state was written through on every mutation
            let _ = self.flush(&cache);
            *cache = Cache::Unloaded;
        }
    }
}

fn version_value(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
