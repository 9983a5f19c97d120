//! Fixture-sharing suite decorator and suite aggregation.
//!
//! A [`FixtureSuite`] wraps a group of test cases so that one expensive
//! fixture is constructed once, injected into every case, and torn down
//! once; teardown runs even when a case fails or panics. The aggregation
//! entry point collects smoke checks for every subsystem plus an optional
//! slow end-to-end case.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::json;

use crate::db::parse_connection_uri;
use crate::env::{EnvironmentStub, TestSession};
use crate::mock::{InterfaceDescriptor, Mock};
use crate::perm::{AllowAllPerm, PermissionCheck};

/// Command-line flag excluding the slow end-to-end cases. Recognized by
/// presence only; it takes no value.
pub const SKIP_FUNCTIONAL_FLAG: &str = "--skip-functional";

/// One recorded failure.
#[derive(Debug, Clone)]
pub struct CaseFailure {
    /// Name of the failing case.
    pub case: String,
    /// Failure or panic message.
    pub message: String,
}

/// Accumulated results across a suite run.
#[derive(Debug, Default)]
pub struct SuiteResult {
    /// Number of cases run.
    pub run: usize,
    /// Failures, in occurrence order.
    pub failures: Vec<CaseFailure>,
}

impl SuiteResult {
    /// Returns true when every case passed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// One-line human summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("ran {} case(s), {} failure(s)", self.run, self.failures.len())
    }
}

/// A runnable member of a suite: a test case or a nested suite.
pub trait SuiteMember<F> {
    /// Member name, used in failure reports.
    fn name(&self) -> &str;

    /// Receives the shared fixture before the first case runs. The
    /// default is a no-op for members that take no fixture.
    fn set_fixture(&mut self, _fixture: &Arc<F>) {}

    /// Runs the member, recording into `result`.
    fn run(&mut self, result: &mut SuiteResult);
}

/// A single test case driven by a closure.
pub struct TestCase<F> {
    name: String,
    fixture: Option<Arc<F>>,
    #[allow(clippy::type_complexity)]
    body: Box<dyn FnMut(Option<&F>) -> Result<(), String>>,
}

impl<F> TestCase<F> {
    /// Creates a case. The body receives the shared fixture when the
    /// enclosing suite has one.
    pub fn new(
        name: impl Into<String>,
        body: impl FnMut(Option<&F>) -> Result<(), String> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            fixture: None,
            body: Box::new(body),
        }
    }
}

impl<F> SuiteMember<F> for TestCase<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_fixture(&mut self, fixture: &Arc<F>) {
        self.fixture = Some(Arc::clone(fixture));
    }

    fn run(&mut self, result: &mut SuiteResult) {
        result.run += 1;
        let fixture = self.fixture.clone();
        let body = &mut self.body;
        let outcome = catch_unwind(AssertUnwindSafe(|| body(fixture.as_deref())));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(message)) => result.failures.push(CaseFailure {
                case: self.name.clone(),
                message,
            }),
            Err(payload) => result.failures.push(CaseFailure {
                case: self.name.clone(),
                message: panic_message(&payload),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SuiteState {
    Idle,
    Running,
}

/// Suite decorator sharing one fixture across all contained members.
pub struct FixtureSuite<F> {
    name: String,
    state: SuiteState,
    fixture: Option<Arc<F>>,
    #[allow(clippy::type_complexity)]
    setup: Option<Box<dyn FnMut() -> Option<F>>>,
    #[allow(clippy::type_complexity)]
    teardown: Option<Box<dyn FnMut(Option<Arc<F>>)>>,
    members: Vec<Box<dyn SuiteMember<F>>>,
}

impl<F> FixtureSuite<F> {
    /// Creates an empty suite.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: SuiteState::Idle,
            fixture: None,
            setup: None,
            teardown: None,
            members: Vec::new(),
        }
    }

    /// Sets the fixture directly, without a setup hook.
    #[must_use]
    pub fn with_fixture(mut self, fixture: F) -> Self {
        self.fixture = Some(Arc::new(fixture));
        self
    }

    /// Setup hook, invoked once before any case. Returning a fixture
    /// makes it the shared one.
    #[must_use]
    pub fn with_setup(mut self, setup: impl FnMut() -> Option<F> + 'static) -> Self {
        self.setup = Some(Box::new(setup));
        self
    }

    /// Teardown hook, invoked exactly once after all cases, even when
    /// cases failed or panicked.
    #[must_use]
    pub fn with_teardown(mut self, teardown: impl FnMut(Option<Arc<F>>) + 'static) -> Self {
        self.teardown = Some(Box::new(teardown));
        self
    }

    /// Appends a member.
    pub fn push(&mut self, member: impl SuiteMember<F> + 'static) {
        self.members.push(Box::new(member));
    }

    /// Number of contained members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true when the suite has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Runs setup, pushes the fixture into every member, runs every
    /// member, and tears down unconditionally.
    pub fn run(&mut self, result: &mut SuiteResult) {
        debug_assert_eq!(self.state, SuiteState::Idle, "suite re-entered");
        self.state = SuiteState::Running;

        if let Some(setup) = self.setup.as_mut() {
            if let Some(fixture) = setup() {
                self.fixture = Some(Arc::new(fixture));
            }
        }
        if let Some(fixture) = self.fixture.clone() {
            for member in &mut self.members {
                member.set_fixture(&fixture);
            }
        }

        for member in &mut self.members {
            let outcome = catch_unwind(AssertUnwindSafe(|| member.run(result)));
            if let Err(payload) = outcome {
                result.failures.push(CaseFailure {
                    case: member.name().to_string(),
                    message: panic_message(&payload),
                });
            }
        }

        if let Some(teardown) = self.teardown.as_mut() {
            teardown(self.fixture.take());
        }
        self.state = SuiteState::Idle;
    }
}

// nested suites are members too; each manages its own fixture
impl<F, G> SuiteMember<G> for FixtureSuite<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, result: &mut SuiteResult) {
        FixtureSuite::run(self, result);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "case panicked".to_string()
    }
}

/// Options for the aggregated suite.
#[derive(Debug, Clone)]
pub struct SuiteOptions {
    /// Whether the slow end-to-end cases run.
    pub include_functional: bool,
}

impl Default for SuiteOptions {
    fn default() -> Self {
        Self {
            include_functional: true,
        }
    }
}

impl SuiteOptions {
    /// Derives options from command-line arguments. Only the presence of
    /// [`SKIP_FUNCTIONAL_FLAG`] matters; everything else is ignored.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let skip = args.into_iter().any(|a| a.as_ref() == SKIP_FUNCTIONAL_FLAG);
        Self {
            include_functional: !skip,
        }
    }
}

/// The top-level aggregated suite: smoke checks for every subsystem plus
/// the slow environment round trip unless excluded.
#[must_use]
pub fn full_suite(options: &SuiteOptions) -> FixtureSuite<TestSession> {
    let mut suite = FixtureSuite::new("testfix")
        .with_setup(|| TestSession::new().ok())
        .with_teardown(|session| {
            if let Some(session) = session {
                session.shutdown();
            }
        });

    suite.push(TestCase::new("mock_overrides_and_stubs", |_| {
        let policy = InterfaceDescriptor::new("PermissionPolicy")
            .method("check")
            .property("username");
        let mock = Mock::builder()
            .base(policy)
            .with_method("check", |_| json!(true))
            .build();
        if mock.call("check", &[]).map_err(|e| e.to_string())? != json!(true) {
            return Err("override did not win".to_string());
        }
        if mock.get("username").is_ok() {
            return Err("stubbed property returned a value".to_string());
        }
        Ok(())
    }));

    suite.push(TestCase::new("uri_normalization", |_| {
        let sqlite = parse_connection_uri("sqlite:db/test.db").map_err(|e| e.to_string())?;
        if sqlite.params.get("synchronous").map(String::as_str) != Some("off") {
            return Err("sqlite file store not normalized".to_string());
        }
        let postgres = parse_connection_uri("postgres://host/db").map_err(|e| e.to_string())?;
        if postgres.params.get("schema").map(String::as_str) != Some("tractest") {
            return Err("postgres store not normalized".to_string());
        }
        Ok(())
    }));

    suite.push(TestCase::new("permission_allows_everything", |_| {
        let perm = AllowAllPerm::new();
        if !perm.has_permission("TICKET_ADMIN") || !perm.contains("WIKI_DELETE") {
            return Err("permission stand-in refused".to_string());
        }
        perm.require("REPORT_VIEW").map_err(|e| e.to_string())
    }));

    if options.include_functional {
        suite.push(TestCase::new("environment_round_trip", |session| {
            let session = session.ok_or("no test session")?;
            let env = EnvironmentStub::builder(session)
                .default_data(true)
                .build()
                .map_err(|e| e.to_string())?;
            env.insert_known_users([("jane", "Jane Doe", "jane@example.org")])
                .map_err(|e| e.to_string())?;
            let jane = env
                .known_user("jane")
                .map_err(|e| e.to_string())?
                .ok_or("seeded user not found")?;
            if jane.email != "jane@example.org" {
                return Err("seeded email does not match".to_string());
            }
            env.reset_db(false).map_err(|e| e.to_string())?;
            if env.known_user("jane").map_err(|e| e.to_string())?.is_some() {
                return Err("reset left seeded rows behind".to_string());
            }
            Ok(())
        }));
    }

    suite
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_fixture_reaches_every_case() {
        let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

        let mut suite = FixtureSuite::new("shared")
            .with_setup(|| Some("fixture".to_string()));
        for _ in 0..3 {
            let seen = Arc::clone(&seen);
            suite.push(TestCase::new("observer", move |fixture: Option<&String>| {
                let fixture = fixture.ok_or("fixture missing")?;
                seen.lock().unwrap().push(fixture as *const String as usize);
                Ok(())
            }));
        }

        let mut result = SuiteResult::default();
        suite.run(&mut result);

        assert!(result.is_success(), "{:?}", result.failures);
        assert_eq!(result.run, 3);
        let seen = seen.lock().unwrap();
        // every case observed the identical fixture instance
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|&ptr| ptr == seen[0]));
    }

    #[test]
    fn test_teardown_runs_once_despite_panicking_case() {
        let torn_down: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&torn_down);

        let mut suite = FixtureSuite::new("panicky")
            .with_fixture(())
            .with_teardown(move |_| *counter.lock().unwrap() += 1);
        suite.push(TestCase::new("explodes", |_: Option<&()>| {
            panic!("deliberate");
        }));
        suite.push(TestCase::new("survives", |_: Option<&()>| Ok(())));

        let mut result = SuiteResult::default();
        suite.run(&mut result);

        assert_eq!(*torn_down.lock().unwrap(), 1);
        assert_eq!(result.run, 2);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].case, "explodes");
        assert!(result.failures[0].message.contains("deliberate"));
    }

    #[test]
    fn test_suite_without_fixture_runs_cases() {
        let mut suite: FixtureSuite<()> = FixtureSuite::new("bare");
        suite.push(TestCase::new("no_fixture", |fixture: Option<&()>| {
            if fixture.is_some() {
                return Err("unexpected fixture".to_string());
            }
            Ok(())
        }));

        let mut result = SuiteResult::default();
        suite.run(&mut result);
        assert!(result.is_success());
    }

    #[test]
    fn test_nested_suites_manage_independent_fixtures() {
        let mut inner = FixtureSuite::new("inner").with_fixture(42_u32);
        inner.push(TestCase::new("inner_case", |fixture: Option<&u32>| {
            (fixture == Some(&42)).then_some(()).ok_or("wrong fixture".to_string())
        }));

        let mut outer: FixtureSuite<String> =
            FixtureSuite::new("outer").with_fixture("outer".to_string());
        outer.push(inner);
        outer.push(TestCase::new("outer_case", |fixture: Option<&String>| {
            (fixture.map(String::as_str) == Some("outer"))
                .then_some(())
                .ok_or("wrong fixture".to_string())
        }));

        let mut result = SuiteResult::default();
        outer.run(&mut result);
        assert!(result.is_success(), "{:?}", result.failures);
        assert_eq!(result.run, 2);
    }

    #[test]
    fn test_failure_reported_without_stopping_suite() {
        let mut suite: FixtureSuite<()> = FixtureSuite::new("mixed");
        suite.push(TestCase::new("fails", |_| Err("nope".to_string())));
        suite.push(TestCase::new("passes", |_| Ok(())));

        let mut result = SuiteResult::default();
        suite.run(&mut result);
        assert_eq!(result.run, 2);
        assert_eq!(result.failures.len(), 1);
        assert!(!result.is_success());
        assert!(result.summary().contains("2 case(s)"));
    }

    #[test]
    fn test_options_from_args_presence_only() {
        let options = SuiteOptions::from_args(["--verbose", "--skip-functional"]);
        assert!(!options.include_functional);

        let options = SuiteOptions::from_args(["--skip-functional=yes"]);
        // the flag takes no value; anything else is not the flag
        assert!(options.include_functional);

        let options = SuiteOptions::from_args(Vec::<String>::new());
        assert!(options.include_functional);
    }

    #[test]
    fn test_full_suite_respects_functional_toggle() {
        let with = full_suite(&SuiteOptions::default());
        let without = full_suite(&SuiteOptions {
            include_functional: false,
        });
        assert_eq!(with.len(), without.len() + 1);
    }
}
