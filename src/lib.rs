//! # testfix - test fixtures and mock synthesis
//!
//! testfix exercises a database-backed host application without depending
//! on its real runtime. It provides:
//!
//! - **Mock synthesis**: throwaway objects satisfying interface contracts,
//!   where every abstract member not explicitly overridden fails loudly
//!   instead of silently returning a default
//! - **Store lifecycle**: a disposable test store reconciled to a known,
//!   versioned, empty-or-seeded state per test run, across three
//!   substitutable backend schemes behind one trait
//! - **Environment stubs**: disposable runtime contexts composing
//!   configuration, component enablement, captured logging and the shared
//!   store manager
//! - **Fixture-sharing suites**: one expensive fixture constructed once,
//!   injected into every wrapped case, torn down once
//!
//! ## Usage
//!
//! ```rust,ignore
//! use testfix::env::{EnvironmentStub, TestSession};
//!
//! let session = TestSession::new()?;
//! let env = EnvironmentStub::builder(&session)
//!     .default_data(true)
//!     .build()?;
//! env.insert_known_users([("jane", "Jane Doe", "jane@example.org")])?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod db;
pub mod env;
pub mod error;
pub mod log;
pub mod mock;
pub mod perm;
pub mod suite;
pub mod util;

// Re-export primary types at crate root for convenience
pub use config::ConfigurationStub;
pub use db::{
    parse_connection_uri, test_dburi, ConnectionInfo, DatabaseManager, DestroyOutcome, Scheme,
    StorageBackend, DB_VERSION,
};
pub use env::{ComponentPolicy, ComponentRegistry, EnvironmentStub, KnownUser, TestSession};
pub use error::{ConfigError, FixtureError, FixtureResult, MockError, StoreError, UriError};
pub use mock::{make_mock, Attr, InterfaceDescriptor, Mock, MockBuilder};
pub use perm::{AllowAllPerm, PermissionCheck};
pub use suite::{FixtureSuite, SuiteOptions, SuiteResult, TestCase};
pub use util::locate;
