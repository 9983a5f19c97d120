//! Disposable environment stubs.
//!
//! An [`EnvironmentStub`] composes a configuration stub, a component
//! enablement policy, a captured logger and a shared database lifecycle
//! manager into a throwaway runtime context. Construction reconciles the
//! test store so every test begins from a deterministic state.
//!
//! The manager is shared through an explicit [`TestSession`] handle:
//! created once per process by the test runner, threaded by reference
//! through every stub, released at session teardown. Opening a fresh
//! physical connection per test would be prohibitively slow.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use regex::Regex;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::config::{load_workflow_snippet, ConfigurationStub};
use crate::db::{
    test_dburi, ConnectionInfo, DataProvider, DatabaseManager, DefaultData, DestroyOutcome,
};
use crate::error::{ConfigError, FixtureResult, StoreError};
use crate::log::{capture_dispatch, LogBuffer};

/// Process-wide handle to the shared [`DatabaseManager`].
///
/// Cheap to clone; all clones share one manager and therefore one set of
/// cached connections.
#[derive(Clone)]
pub struct TestSession {
    manager: Arc<DatabaseManager>,
    info: ConnectionInfo,
}

impl TestSession {
    /// Bootstraps a session from the environment
    /// ([`DB_URI_VAR`](crate::db::DB_URI_VAR), defaulting to in-memory
    /// sqlite).
    ///
    /// # Errors
    /// Returns an error when the variable holds a malformed URI.
    pub fn new() -> FixtureResult<Self> {
        let info = test_dburi()?;
        let root = std::env::current_dir().unwrap_or_else(|_| std::env::temp_dir());
        Ok(Self::with_info(info, &root))
    }

    /// Bootstraps a session for an explicit connection descriptor.
    /// Relative sqlite paths resolve against `root`.
    #[must_use]
    pub fn with_info(info: ConnectionInfo, root: &Path) -> Self {
        let manager = Arc::new(DatabaseManager::open(info.clone(), root));
        Self { manager, info }
    }

    /// The shared lifecycle manager.
    #[must_use]
    pub fn manager(&self) -> Arc<DatabaseManager> {
        Arc::clone(&self.manager)
    }

    /// The session's connection descriptor.
    #[must_use]
    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// Releases cached connection state at session teardown.
    pub fn shutdown(&self) {
        self.manager.shutdown();
    }
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    regex: Regex,
    enabled: bool,
}

/// Component enablement policy: ordered glob rules over dotted component
/// names, with a mode-dependent default verdict.
#[derive(Debug, Clone)]
pub struct ComponentPolicy {
    rules: Vec<Rule>,
    default_enabled: bool,
}

impl ComponentPolicy {
    /// Creates a policy with the given default verdict for components no
    /// rule matches.
    #[must_use]
    pub fn new(default_enabled: bool) -> Self {
        Self {
            rules: Vec::new(),
            default_enabled,
        }
    }

    /// Adds a glob rule (`*` matches any run, `?` a single character).
    ///
    /// # Errors
    /// Returns [`ConfigError`] for an empty or uncompilable pattern.
    pub fn add(&mut self, pattern: &str, enabled: bool) -> Result<(), ConfigError> {
        let regex = glob_regex(pattern)?;
        self.rules.push(Rule {
            pattern: pattern.to_string(),
            regex,
            enabled,
        });
        Ok(())
    }

    /// Decides whether a component is enabled. The most specific (longest)
    /// matching pattern wins; later rules win ties; the default verdict
    /// applies when nothing matches.
    #[must_use]
    pub fn is_enabled(&self, component: &str) -> bool {
        self.rules
            .iter()
            .filter(|rule| rule.regex.is_match(component))
            .max_by_key(|rule| rule.pattern.len())
            .map_or(self.default_enabled, |rule| rule.enabled)
    }
}

fn glob_regex(pattern: &str) -> Result<Regex, ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::EmptyPattern);
    }
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Narrow contract the host's component registry expects an environment
/// to satisfy.
pub trait ComponentRegistry {
    /// Decides whether a dotted component name is active.
    fn is_component_enabled(&self, component: &str) -> bool;
}

/// A user seeded by [`EnvironmentStub::insert_known_users`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownUser {
    /// Session id the user authenticates as.
    pub username: String,
    /// Display name attribute.
    pub name: String,
    /// Email attribute.
    pub email: String,
}

/// Disposable runtime context for one test (or one shared fixture).
pub struct EnvironmentStub {
    id: Uuid,
    config: ConfigurationStub,
    policy: ComponentPolicy,
    manager: Arc<DatabaseManager>,
    info: ConnectionInfo,
    path: PathBuf,
    dispatch: tracing::Dispatch,
    logs: LogBuffer,
}

impl std::fmt::Debug for EnvironmentStub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentStub")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("info", &self.info)
            .field("path", &self.path)
            .field("logs", &self.logs)
            .finish_non_exhaustive()
    }
}

impl EnvironmentStub {
    /// Starts a builder over the session's shared manager.
    #[must_use]
    pub fn builder(session: &TestSession) -> EnvironmentStubBuilder {
        EnvironmentStubBuilder {
            session: session.clone(),
            default_data: false,
            enable: None,
            disable: Vec::new(),
            path: None,
            destroying: false,
            manager: None,
        }
    }

    /// Unique identity of this stub instance.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The captured configuration.
    #[must_use]
    pub fn config(&self) -> &ConfigurationStub {
        &self.config
    }

    /// Mutable access for tests that tweak configuration mid-run.
    pub fn config_mut(&mut self) -> &mut ConfigurationStub {
        &mut self.config
    }

    /// The shared lifecycle manager.
    #[must_use]
    pub fn manager(&self) -> &Arc<DatabaseManager> {
        &self.manager
    }

    /// The normalized connection URI this stub runs against.
    #[must_use]
    pub fn dburi(&self) -> String {
        self.info.to_uri()
    }

    /// The filesystem root. May not exist; nothing is ever created there.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decides component enablement under this stub's policy.
    #[must_use]
    pub fn is_component_enabled(&self, component: &str) -> bool {
        self.policy.is_enabled(component)
    }

    /// Installs this stub's capturing logger as the thread default.
    /// Events emitted while the guard lives land in
    /// [`captured_logs`](Self::captured_logs).
    #[must_use]
    pub fn log_scope(&self) -> tracing::dispatcher::DefaultGuard {
        tracing::dispatcher::set_default(&self.dispatch)
    }

    /// The buffer behind this stub's capturing logger.
    #[must_use]
    pub fn captured_logs(&self) -> &LogBuffer {
        &self.logs
    }

    /// Forces a mid-test reconciliation.
    ///
    /// # Errors
    /// Propagates fatal store errors (see the reconciliation policy).
    pub fn reset_db(&self, default_data: bool) -> Result<(), StoreError> {
        let provider = DefaultData;
        let data: Option<&dyn DataProvider> = if default_data { Some(&provider) } else { None };
        self.manager.reset(data, &self.path)
    }

    /// Destroys the test store.
    ///
    /// # Errors
    /// Genuine destroy failures; absence is a successful
    /// [`DestroyOutcome::NothingToDrop`].
    pub fn destroy_db(&self) -> Result<DestroyOutcome, StoreError> {
        self.manager.destroy_from(&self.path)
    }

    /// Seeds session and session-attribute rows for pre-existing
    /// authenticated users, stamped with the current time.
    ///
    /// # Errors
    /// Propagates backend errors; fatal to test setup.
    pub fn insert_known_users<'a>(
        &self,
        users: impl IntoIterator<Item = (&'a str, &'a str, &'a str)>,
    ) -> Result<(), StoreError> {
        let backend = self.manager.backend();
        let now = Utc::now().timestamp();
        for (username, name, email) in users {
            backend.insert("session", &[vec![json!(username), json!(1), json!(now)]])?;
            backend.insert(
                "session_attribute",
                &[
                    vec![json!(username), json!(1), json!("name"), json!(name)],
                    vec![json!(username), json!(1), json!("email"), json!(email)],
                ],
            )?;
        }
        Ok(())
    }

    /// Looks up a seeded user by username.
    ///
    /// # Errors
    /// Propagates backend errors.
    pub fn known_user(&self, username: &str) -> Result<Option<KnownUser>, StoreError> {
        let backend = self.manager.backend();
        let in_session = backend
            .rows("session")?
            .iter()
            .any(|row| row.first().and_then(|v| v.as_str()) == Some(username));
        if !in_session {
            return Ok(None);
        }

        let mut user = KnownUser {
            username: username.to_string(),
            name: String::new(),
            email: String::new(),
        };
        for row in backend.rows("session_attribute")? {
            if row.first().and_then(|v| v.as_str()) != Some(username) {
                continue;
            }
            let value = row.get(3).and_then(|v| v.as_str()).unwrap_or_default();
            match row.get(2).and_then(|v| v.as_str()) {
                Some("name") => user.name = value.to_string(),
                Some("email") => user.email = value.to_string(),
                _ => {}
            }
        }
        Ok(Some(user))
    }
}

impl ComponentRegistry for EnvironmentStub {
    fn is_component_enabled(&self, component: &str) -> bool {
        self.policy.is_enabled(component)
    }
}

/// Builder for [`EnvironmentStub`]. All knobs are independent and
/// optional.
pub struct EnvironmentStubBuilder {
    session: TestSession,
    default_data: bool,
    enable: Option<Vec<String>>,
    disable: Vec<String>,
    path: Option<PathBuf>,
    destroying: bool,
    manager: Option<Arc<DatabaseManager>>,
}

impl EnvironmentStubBuilder {
    /// Populate the store with the default data set after reconciliation.
    #[must_use]
    pub fn default_data(mut self, yes: bool) -> Self {
        self.default_data = yes;
        self
    }

    /// Switches to allow-list mode: everything is disabled except the
    /// store components and these globs. Giving an empty list disables
    /// everything optional.
    #[must_use]
    pub fn enable<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enable = Some(globs.into_iter().map(Into::into).collect());
        self
    }

    /// Globs to force-disable in either mode.
    #[must_use]
    pub fn disable<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disable = globs.into_iter().map(Into::into).collect();
        self
    }

    /// Explicit filesystem root. Nothing is created there.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Skip reconciliation: the caller intends to destroy the store
    /// immediately after construction.
    #[must_use]
    pub fn destroying(mut self, yes: bool) -> Self {
        self.destroying = yes;
        self
    }

    /// Replaces the session's shared manager for this stub.
    #[must_use]
    pub fn manager(mut self, manager: Arc<DatabaseManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Builds the stub: seeds configuration, compiles the enablement
    /// policy, wires the capturing logger and, unless `destroying`,
    /// reconciles the store before returning.
    ///
    /// # Errors
    /// [`ConfigError`] for invalid enable/disable globs; store errors
    /// from reconciliation.
    pub fn build(self) -> FixtureResult<EnvironmentStub> {
        let mut policy = ComponentPolicy::new(self.enable.is_none());
        // the store components stay on in every mode
        policy.add("db.*", true)?;
        match &self.enable {
            Some(globs) => {
                for glob in globs {
                    policy.add(glob, true)?;
                }
            }
            // the optional version-control subsystem is on by default
            None => policy.add("vcs.*", true)?,
        }
        for glob in &self.disable {
            policy.add(glob, false)?;
        }

        let mut config = ConfigurationStub::new();
        load_workflow_snippet(&mut config);
        config.set("logging", "log_level", "DEBUG");
        config.set("logging", "log_type", "buffer");
        match &self.enable {
            Some(globs) => {
                config.set("components", "*", "disabled");
                for glob in globs {
                    config.set("components", glob, "enabled");
                }
            }
            None => config.set("components", "vcs.*", "enabled"),
        }
        for glob in &self.disable {
            config.set("components", glob, "disabled");
        }
        config.set("components", "db.*", "enabled");

        let manager = self.manager.unwrap_or_else(|| self.session.manager());
        let info = manager.connection_info().clone();
        config.set("store", "uri", info.to_uri());

        let path = self
            .path
            .unwrap_or_else(|| std::env::temp_dir().join("testfix-env"));

        let (dispatch, logs) = capture_dispatch();
        let stub = EnvironmentStub {
            id: Uuid::new_v4(),
            config,
            policy,
            manager,
            info,
            path,
            dispatch,
            logs,
        };

        if !self.destroying {
            let _guard = stub.log_scope();
            stub.reset_db(self.default_data)?;
            debug!(env = %stub.id, "environment stub ready");
        }
        Ok(stub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{parse_connection_uri, DB_VERSION};

    fn memory_session() -> TestSession {
        let info = parse_connection_uri("sqlite::memory:").unwrap();
        TestSession::with_info(info, Path::new("."))
    }

    #[test]
    fn test_build_reconciles_store() {
        let session = memory_session();
        let env = EnvironmentStub::builder(&session).build().unwrap();
        assert_eq!(env.manager().database_version().unwrap(), Some(DB_VERSION));
        assert!(env.captured_logs().contains("environment stub ready"));
    }

    #[test]
    fn test_destroying_skips_reconciliation() {
        let session = memory_session();
        let env = EnvironmentStub::builder(&session)
            .destroying(true)
            .build()
            .unwrap();
        // the store was never initialized
        assert!(env.manager().database_version().unwrap_err().is_absent());
    }

    #[test]
    fn test_stubs_share_the_session_manager() {
        let session = memory_session();
        let first = EnvironmentStub::builder(&session).build().unwrap();
        let second = EnvironmentStub::builder(&session).build().unwrap();
        assert!(Arc::ptr_eq(first.manager(), second.manager()));
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_explicit_manager_replaces_shared_one() {
        let session = memory_session();
        let other = memory_session();
        let env = EnvironmentStub::builder(&session)
            .manager(other.manager())
            .build()
            .unwrap();
        assert!(Arc::ptr_eq(env.manager(), &other.manager()));
        assert!(!Arc::ptr_eq(env.manager(), &session.manager()));
    }

    #[test]
    fn test_default_enablement() {
        let session = memory_session();
        let env = EnvironmentStub::builder(&session).build().unwrap();
        assert!(env.is_component_enabled("db.manager"));
        assert!(env.is_component_enabled("vcs.git"));
        // ordinary components fall back to the enabled default
        assert!(env.is_component_enabled("wiki.macros"));
    }

    #[test]
    fn test_enable_list_disables_everything_else() {
        let session = memory_session();
        let env = EnvironmentStub::builder(&session)
            .enable(["wiki.*"])
            .build()
            .unwrap();
        assert!(env.is_component_enabled("wiki.macros"));
        assert!(env.is_component_enabled("db.manager"));
        assert!(!env.is_component_enabled("vcs.git"));
        assert!(!env.is_component_enabled("ticket.api"));
    }

    #[test]
    fn test_disable_wins_by_specificity() {
        let session = memory_session();
        let env = EnvironmentStub::builder(&session)
            .disable(["wiki.macros"])
            .build()
            .unwrap();
        assert!(!env.is_component_enabled("wiki.macros"));
        assert!(env.is_component_enabled("wiki.api"));
    }

    #[test]
    fn test_invalid_glob_is_a_config_error() {
        let session = memory_session();
        let err = EnvironmentStub::builder(&session)
            .enable([""])
            .build()
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_config_seeded_on_build() {
        let session = memory_session();
        let env = EnvironmentStub::builder(&session).build().unwrap();
        assert_eq!(env.config().get("ticket-workflow", "leave"), Some("* -> *"));
        assert_eq!(env.config().get("logging", "log_level"), Some("DEBUG"));
        assert_eq!(env.config().get("store", "uri"), Some("sqlite::memory:"));
    }

    #[test]
    fn test_insert_known_users_round_trip() {
        let session = memory_session();
        let env = EnvironmentStub::builder(&session).build().unwrap();
        env.insert_known_users([
            ("jane", "Jane Doe", "jane@example.org"),
            ("joe", "Joe Bloggs", "joe@example.org"),
        ])
        .unwrap();

        let jane = env.known_user("jane").unwrap().unwrap();
        assert_eq!(jane.name, "Jane Doe");
        assert_eq!(jane.email, "jane@example.org");

        let joe = env.known_user("joe").unwrap().unwrap();
        assert_eq!(joe.email, "joe@example.org");

        assert_eq!(env.known_user("nobody").unwrap(), None);
    }

    #[test]
    fn test_reset_db_clears_seeded_users() {
        let session = memory_session();
        let env = EnvironmentStub::builder(&session).build().unwrap();
        env.insert_known_users([("jane", "Jane Doe", "jane@example.org")])
            .unwrap();

        env.reset_db(false).unwrap();
        assert_eq!(env.known_user("jane").unwrap(), None);
    }

    #[test]
    fn test_component_policy_tie_breaks_to_later_rule() {
        let mut policy = ComponentPolicy::new(true);
        policy.add("wiki.?", true).unwrap();
        policy.add("wiki.*", false).unwrap();
        // equal specificity: the later rule wins
        assert!(!policy.is_enabled("wiki.x"));
    }
}
