//! Database lifecycle management.
//!
//! The manager drives a [`StorageBackend`] to a known, versioned state per
//! test run. Reconciliation is deliberately binary: a matching schema
//! version clears table rows in place (fast), anything else destroys the
//! store and rebuilds from scratch. There is no incremental migration path.
//!
//! Error policy: version-read and destroy failures are expected (the store
//! may simply not exist yet); they are logged and reconciliation proceeds
//! to rebuild. Failures while creating, clearing or seeding the schema
//! propagate; without a usable store the test run cannot continue.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::db::defaults::{schema, DataProvider, DB_VERSION};
use crate::db::memory::MemoryBackend;
use crate::db::traits::StorageBackend;
use crate::db::uri::{ConnectionInfo, Scheme};
use crate::error::StoreError;

/// What a destroy call actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyOutcome {
    /// Backend objects existed and were dropped.
    Dropped,
    /// There was nothing to drop; the desired end state already held.
    NothingToDrop,
}

/// Lifecycle manager for one test store.
///
/// Cheap to share: test sessions hold it in an `Arc` and thread it through
/// every environment stub rather than reopening connections per test.
pub struct DatabaseManager {
    backend: Arc<dyn StorageBackend>,
    info: ConnectionInfo,
}

impl DatabaseManager {
    /// Wraps an existing backend.
    #[must_use]
    pub fn new(info: ConnectionInfo, backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend, info }
    }

    /// Opens the embedded reference backend for `info`. File sqlite paths
    /// resolve against `root` when relative; every other shape runs purely
    /// in memory.
    #[must_use]
    pub fn open(info: ConnectionInfo, root: &Path) -> Self {
        let backend: Arc<dyn StorageBackend> =
            if info.scheme == Scheme::Sqlite && !info.is_memory() {
                Arc::new(MemoryBackend::with_backing(resolve_sqlite_path(&info, root)))
            } else {
                Arc::new(MemoryBackend::new())
            };
        Self::new(info, backend)
    }

    /// The connection descriptor this manager was opened with.
    #[must_use]
    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// The underlying backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Reads the stamped schema version.
    ///
    /// # Errors
    /// Propagates backend errors; absent-kind errors mean "no store yet".
    pub fn database_version(&self) -> Result<Option<u32>, StoreError> {
        self.backend.database_version()
    }

    /// Stamps the schema version.
    ///
    /// # Errors
    /// Propagates backend errors.
    pub fn set_database_version(&self, version: u32) -> Result<(), StoreError> {
        self.backend.set_database_version(version)
    }

    /// Deletes all rows from every known table, keeping schema objects.
    /// Returns the names of the cleared tables.
    ///
    /// # Errors
    /// Propagates backend errors; fatal to test setup.
    pub fn reset_tables(&self) -> Result<Vec<String>, StoreError> {
        self.backend.clear_tables()
    }

    /// (Re)creates the schema from scratch.
    ///
    /// # Errors
    /// Propagates backend errors; fatal to test setup.
    pub fn init_db(&self) -> Result<(), StoreError> {
        self.backend.create_tables(&schema())
    }

    /// Populates tables from a data provider.
    ///
    /// # Errors
    /// Propagates backend errors; fatal to test setup.
    pub fn insert_into_tables(&self, provider: &dyn DataProvider) -> Result<(), StoreError> {
        for table in provider.data() {
            self.backend.insert(&table.table, &table.rows)?;
        }
        Ok(())
    }

    /// Reconciles the store against [`DB_VERSION`].
    ///
    /// Version matches → clear rows in place. Version missing, unreadable
    /// or different → destroy and rebuild. Afterwards the store is seeded
    /// from `default_data` when given (the default set stamps the version
    /// itself), or stamped with [`DB_VERSION`] directly.
    ///
    /// Calling this twice in a row leaves the same observable state as
    /// calling it once.
    ///
    /// # Errors
    /// Propagates schema-creation, clearing and seeding failures. Version
    /// read and destroy failures are logged and treated as "store absent".
    pub fn reset(
        &self,
        default_data: Option<&dyn DataProvider>,
        root: &Path,
    ) -> Result<(), StoreError> {
        // a prior failed test may have left a transaction open
        if let Err(err) = self.backend.rollback() {
            debug!(error = %err, "rollback before reset failed");
        }

        let version = match self.backend.database_version() {
            Ok(version) => version,
            Err(err) => {
                debug!(error = %err, "schema version unreadable, treating as absent");
                None
            }
        };

        let mut cleared = Vec::new();
        if version == Some(DB_VERSION) {
            cleared = self.backend.clear_tables()?;
        } else {
            match self.destroy_from(root) {
                Ok(outcome) => debug!(?outcome, "destroyed stale store"),
                Err(err) if err.is_absent() => {
                    debug!(error = %err, "nothing to destroy");
                }
                Err(err) => warn!(error = %err, "destroy failed, rebuilding anyway"),
            }
        }

        if cleared.is_empty() {
            self.init_db()?;
            // make sure the next connection observes the fresh schema
            // instead of a stale cached one
            if !self.info.is_memory() {
                self.shutdown();
            }
        }

        match default_data {
            Some(provider) => self.insert_into_tables(provider)?,
            None => self.backend.set_database_version(DB_VERSION)?,
        }
        Ok(())
    }

    /// Destroys the store, scheme-specifically:
    ///
    /// - postgres: cascading drop of the configured schema
    /// - mysql: every table dropped individually
    /// - sqlite: backing file removed (after shutting the backend down so
    ///   no handle still holds it open); the in-memory sentinel has no
    ///   file and nothing to destroy
    ///
    /// Relative sqlite paths resolve against `root`.
    ///
    /// # Errors
    /// Genuine failures return `StoreError`; "already absent" is the
    /// successful [`DestroyOutcome::NothingToDrop`], not an error.
    pub fn destroy_from(&self, root: &Path) -> Result<DestroyOutcome, StoreError> {
        match &self.info.scheme {
            Scheme::Postgres => match self.info.params.get("schema") {
                Some(schema_name) => match self.backend.drop_schema(schema_name) {
                    Ok(()) => Ok(DestroyOutcome::Dropped),
                    Err(err) if err.is_absent() => Ok(DestroyOutcome::NothingToDrop),
                    Err(err) => Err(err),
                },
                None => Ok(DestroyOutcome::NothingToDrop),
            },
            Scheme::Mysql => {
                let tables = match self.backend.table_names() {
                    Ok(tables) => tables,
                    Err(err) if err.is_absent() => return Ok(DestroyOutcome::NothingToDrop),
                    Err(err) => return Err(err),
                };
                if tables.is_empty() {
                    return Ok(DestroyOutcome::NothingToDrop);
                }
                for table in tables {
                    self.backend.drop_table(&table)?;
                }
                Ok(DestroyOutcome::Dropped)
            }
            Scheme::Sqlite => {
                if self.info.is_memory() {
                    return Ok(DestroyOutcome::NothingToDrop);
                }
                let path = resolve_sqlite_path(&self.info, root);
                self.backend.shutdown();
                match fs::remove_file(&path) {
                    Ok(()) => Ok(DestroyOutcome::Dropped),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        Ok(DestroyOutcome::NothingToDrop)
                    }
                    Err(err) => Err(err.into()),
                }
            }
            Scheme::Other(scheme) => Err(StoreError::UnsupportedScheme(scheme.clone())),
        }
    }

    /// Releases cached connection state.
    pub fn shutdown(&self) {
        self.backend.shutdown();
    }
}

fn resolve_sqlite_path(info: &ConnectionInfo, root: &Path) -> PathBuf {
    let path = Path::new(&info.path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::defaults::{DefaultData, SYSTEM_TABLE};
    use crate::db::uri::parse_connection_uri;
    use serde_json::json;

    fn memory_manager() -> DatabaseManager {
        let info = parse_connection_uri("sqlite::memory:").unwrap();
        DatabaseManager::open(info, Path::new("."))
    }

    fn manager_for(uri: &str) -> DatabaseManager {
        manager_at(uri, Path::new("."))
    }

    fn manager_at(uri: &str, root: &Path) -> DatabaseManager {
        let info = parse_connection_uri(uri).unwrap();
        DatabaseManager::open(info, root)
    }

    #[test]
    fn test_reset_builds_fresh_store() {
        let dbm = memory_manager();
        dbm.reset(None, Path::new(".")).unwrap();
        assert_eq!(dbm.database_version().unwrap(), Some(DB_VERSION));
        assert!(dbm.backend().rows("session").unwrap().is_empty());
    }

    #[test]
    fn test_reset_is_idempotent() {
        let dbm = memory_manager();
        dbm.reset(None, Path::new(".")).unwrap();
        dbm.backend()
            .insert("session", &[vec![json!("alice"), json!(1), json!(0)]])
            .unwrap();

        dbm.reset(None, Path::new(".")).unwrap();
        dbm.reset(None, Path::new(".")).unwrap();

        assert_eq!(dbm.database_version().unwrap(), Some(DB_VERSION));
        assert!(dbm.backend().rows("session").unwrap().is_empty());
        // version row not duplicated by repeated stamping
        assert_eq!(dbm.backend().rows(SYSTEM_TABLE).unwrap().len(), 1);
    }

    #[test]
    fn test_reset_rebuilds_on_version_mismatch() {
        let dbm = memory_manager();
        dbm.reset(None, Path::new(".")).unwrap();
        dbm.set_database_version(DB_VERSION + 7).unwrap();
        dbm.backend()
            .insert("permission", &[vec![json!("eve"), json!("TRAC_ADMIN")]])
            .unwrap();

        dbm.reset(None, Path::new(".")).unwrap();
        assert_eq!(dbm.database_version().unwrap(), Some(DB_VERSION));
        assert!(dbm.backend().rows("permission").unwrap().is_empty());
    }

    #[test]
    fn test_reset_with_default_data_seeds_rows() {
        let dbm = memory_manager();
        dbm.reset(Some(&DefaultData), Path::new(".")).unwrap();
        assert_eq!(dbm.database_version().unwrap(), Some(DB_VERSION));
        assert!(!dbm.backend().rows("permission").unwrap().is_empty());
        assert!(!dbm.backend().rows("enum").unwrap().is_empty());
    }

    #[test]
    fn test_destroy_postgres_drops_schema_once() {
        let dbm = manager_for("postgres://host/db");
        dbm.reset(None, Path::new(".")).unwrap();

        assert_eq!(
            dbm.destroy_from(Path::new(".")).unwrap(),
            DestroyOutcome::Dropped
        );
        // second destroy: nothing there, which is the desired end state
        assert_eq!(
            dbm.destroy_from(Path::new(".")).unwrap(),
            DestroyOutcome::NothingToDrop
        );
    }

    #[test]
    fn test_destroy_mysql_drops_each_table() {
        let dbm = manager_for("mysql://localhost/testdb");
        dbm.reset(None, Path::new(".")).unwrap();

        assert_eq!(
            dbm.destroy_from(Path::new(".")).unwrap(),
            DestroyOutcome::Dropped
        );
        assert!(dbm.backend().table_names().unwrap().is_empty());
    }

    #[test]
    fn test_destroy_memory_sqlite_is_noop() {
        let dbm = memory_manager();
        dbm.reset(None, Path::new(".")).unwrap();
        assert_eq!(
            dbm.destroy_from(Path::new(".")).unwrap(),
            DestroyOutcome::NothingToDrop
        );
        // the store itself is untouched
        assert_eq!(dbm.database_version().unwrap(), Some(DB_VERSION));
    }

    #[test]
    fn test_destroy_sqlite_file_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let uri = format!("sqlite:{}", db_path.display());
        let dbm = manager_at(&uri, dir.path());

        dbm.reset(None, dir.path()).unwrap();
        assert!(db_path.exists());

        assert_eq!(
            dbm.destroy_from(dir.path()).unwrap(),
            DestroyOutcome::Dropped
        );
        assert!(!db_path.exists());

        // rebuilding recreates the expected version
        dbm.init_db().unwrap();
        dbm.set_database_version(DB_VERSION).unwrap();
        assert_eq!(dbm.database_version().unwrap(), Some(DB_VERSION));
    }

    #[test]
    fn test_destroy_relative_sqlite_path_resolves_against_root() {
        let dir = tempfile::tempdir().unwrap();
        let dbm = manager_at("sqlite:trac.db", dir.path());

        dbm.reset(None, dir.path()).unwrap();
        assert!(dir.path().join("trac.db").exists());

        dbm.destroy_from(dir.path()).unwrap();
        assert!(!dir.path().join("trac.db").exists());
    }

    #[test]
    fn test_destroy_unknown_scheme_is_an_error() {
        let dbm = manager_for("oracle://host/db");
        let err = dbm.destroy_from(Path::new(".")).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedScheme(_)));
    }
}
