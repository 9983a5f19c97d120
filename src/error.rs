//! Error types for testfix.
//!
//! All errors are strongly typed using thiserror. The split mirrors the
//! propagation policy: `MockError`, `ConfigError` and `UriError` always
//! surface to the caller; `StoreError` is partitioned into a recoverable
//! "store absent" kind (see [`StoreError::is_absent`]) that the lifecycle
//! manager logs and ignores, and everything else, which aborts test setup.

use thiserror::Error;

/// Errors raised by synthesized mock instances.
#[derive(Debug, Error)]
pub enum MockError {
    /// An abstract member was invoked without an override. This always
    /// surfaces to the caller; it signals a gap in the test's stubbing,
    /// never a condition to recover from.
    #[error("{interface}.{member} is abstract and was not overridden")]
    NotImplemented {
        /// Interface descriptor that declared the member.
        interface: String,
        /// Member name that was invoked.
        member: String,
    },

    /// The mock has no member (abstract or overridden) with this name.
    #[error("mock has no member {member:?}")]
    UnknownMember {
        member: String,
    },

    /// A plain value member was invoked as a method.
    #[error("member {member:?} is not callable")]
    NotCallable {
        member: String,
    },

    /// A method member was read as a plain value.
    #[error("member {member:?} is a method, not a readable value")]
    NotAValue {
        member: String,
    },
}

/// Invalid constructor arguments for an environment stub.
///
/// Always fatal, raised at construction time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid component pattern {pattern:?}: {reason}")]
    InvalidPattern {
        pattern: String,
        reason: String,
    },

    #[error("component pattern cannot be empty")]
    EmptyPattern,
}

/// Malformed storage connection URI.
#[derive(Debug, Error)]
#[error("invalid connection URI {uri:?}: {reason}")]
pub struct UriError {
    /// The URI as given.
    pub uri: String,
    /// What made it unparseable.
    pub reason: String,
}

impl UriError {
    pub(crate) fn new(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from storage backends and the lifecycle manager.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store holds no schema at all (never initialized or destroyed).
    #[error("store absent: {0}")]
    Absent(String),

    /// A named table does not exist.
    #[error("no such table: {0}")]
    NoSuchTable(String),

    /// A named schema does not exist.
    #[error("schema {0:?} does not exist")]
    NoSuchSchema(String),

    /// Backend failure that does not mean simple absence.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Filesystem failure while manipulating a file-backed store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backing-state (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The connection scheme is not one the lifecycle manager can tear down.
    #[error("unsupported storage scheme: {0}")]
    UnsupportedScheme(String),
}

impl StoreError {
    /// Returns true if this error means "there was nothing there" rather
    /// than a genuine failure. The reconciliation algorithm treats these
    /// as the desired end state when destroying, and as "version absent"
    /// when reading the schema version.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        match self {
            Self::Absent(_) | Self::NoSuchTable(_) | Self::NoSuchSchema(_) => true,
            Self::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Permission denial from a real permission checker.
///
/// The always-grant stand-in never produces this; the type exists so the
/// [`crate::perm::PermissionCheck`] contract has a failure mode for real
/// implementations.
#[derive(Debug, Error)]
#[error("permission denied: {action}")]
pub struct PermissionError {
    /// The action that was refused.
    pub action: String,
}

/// Top-level error type for testfix.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("connection URI error: {0}")]
    Uri(#[from] UriError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl FixtureError {
    /// Returns true if this is a construction-time configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

/// Result type alias for fixture construction and teardown.
pub type FixtureResult<T> = Result<T, FixtureError>;
