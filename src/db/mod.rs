//! Test store orchestration: connection descriptors, the uniform backend
//! contract, the embedded reference backend and the lifecycle manager.

mod defaults;
mod manager;
mod memory;
mod traits;
pub mod uri;

pub use defaults::{schema, DataProvider, DefaultData, TableData, DB_VERSION, SYSTEM_TABLE, VERSION_KEY};
pub use manager::{DatabaseManager, DestroyOutcome};
pub use memory::MemoryBackend;
pub use traits::{Row, StorageBackend, TableDef};
pub use uri::{parse_connection_uri, test_dburi, ConnectionInfo, Scheme, DB_URI_VAR, MEMORY_PATH, TEST_SCHEMA};
