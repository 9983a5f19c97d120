//! Mock synthesis: merge interface descriptors into a single instance
//! whose un-overridden abstract members fail loudly.
//!
//! Synthesis merges the abstract member sets of the given bases into one
//! map (first occurrence wins on name collisions), installs a
//! not-implemented stub for every member the caller did not override, and
//! applies overrides per instance so that customizing one mock can never
//! leak into another built from the same bases.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::error::MockError;
use crate::mock::descriptor::{InterfaceDescriptor, MemberKind};

/// A concrete member installed on a mock.
pub enum Attr {
    /// A plain value, read with [`Mock::get`].
    Value(Value),
    /// A callable, invoked with [`Mock::call`].
    Method(Box<dyn Fn(&[Value]) -> Value>),
}

impl Attr {
    /// Convenience constructor for a method override.
    #[must_use]
    pub fn method(f: impl Fn(&[Value]) -> Value + 'static) -> Self {
        Self::Method(Box::new(f))
    }

    /// Convenience constructor for a value override.
    #[must_use]
    pub fn value(v: impl Into<Value>) -> Self {
        Self::Value(v.into())
    }
}

impl fmt::Debug for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Method(_) => f.write_str("Method(..)"),
        }
    }
}

#[derive(Debug)]
enum Slot {
    /// Synthesized stub bound to the descriptor that declared the member.
    Stub { interface: String, kind: MemberKind },
    /// Caller-supplied override; always wins over a stub of the same name.
    Concrete(Attr),
}

/// A synthesized object satisfying zero or more interface descriptors.
///
/// Created once per test assertion and discarded at the end of the test;
/// nothing about a `Mock` is persistent or shared.
#[derive(Debug)]
pub struct Mock {
    bases: Vec<InterfaceDescriptor>,
    slots: HashMap<String, Slot>,
}

impl Mock {
    /// Starts a builder with no bases (a bare extensible object).
    #[must_use]
    pub fn builder() -> MockBuilder {
        MockBuilder::default()
    }

    /// Invokes a member.
    ///
    /// # Errors
    /// - `NotImplemented` for an un-overridden abstract member
    /// - `UnknownMember` if no member of that name exists
    /// - `NotCallable` if the member is a plain value
    pub fn call(&self, member: &str, args: &[Value]) -> Result<Value, MockError> {
        match self.slots.get(member) {
            Some(Slot::Concrete(Attr::Method(f))) => Ok(f(args)),
            Some(Slot::Concrete(Attr::Value(_))) => Err(MockError::NotCallable {
                member: member.to_string(),
            }),
            Some(Slot::Stub { interface, .. }) => Err(MockError::NotImplemented {
                interface: interface.clone(),
                member: member.to_string(),
            }),
            None => Err(MockError::UnknownMember {
                member: member.to_string(),
            }),
        }
    }

    /// Reads a member as a plain value.
    ///
    /// # Errors
    /// - `NotImplemented` for an un-overridden abstract member
    /// - `UnknownMember` if no member of that name exists
    /// - `NotAValue` if the member is a method
    pub fn get(&self, member: &str) -> Result<Value, MockError> {
        match self.slots.get(member) {
            Some(Slot::Concrete(Attr::Value(v))) => Ok(v.clone()),
            Some(Slot::Concrete(Attr::Method(_))) => Err(MockError::NotAValue {
                member: member.to_string(),
            }),
            Some(Slot::Stub { interface, .. }) => Err(MockError::NotImplemented {
                interface: interface.clone(),
                member: member.to_string(),
            }),
            None => Err(MockError::UnknownMember {
                member: member.to_string(),
            }),
        }
    }

    /// Installs or replaces a member on this instance only.
    pub fn set(&mut self, member: impl Into<String>, attr: Attr) {
        self.slots.insert(member.into(), Slot::Concrete(attr));
    }

    /// Returns true if the mock has a member of this name, stub or not.
    #[must_use]
    pub fn has(&self, member: &str) -> bool {
        self.slots.contains_key(member)
    }

    /// Returns true if the named member is still the synthesized stub.
    #[must_use]
    pub fn is_stubbed(&self, member: &str) -> bool {
        matches!(self.slots.get(member), Some(Slot::Stub { .. }))
    }

    /// The descriptors this mock was synthesized from, in declared order.
    #[must_use]
    pub fn bases(&self) -> &[InterfaceDescriptor] {
        &self.bases
    }

    /// Returns true if every abstract member of `descriptor` has a slot on
    /// this mock (stubbed or overridden).
    #[must_use]
    pub fn satisfies(&self, descriptor: &InterfaceDescriptor) -> bool {
        descriptor
            .members()
            .iter()
            .all(|m| self.slots.contains_key(&m.name))
    }
}

/// Builder for [`Mock`] instances.
#[derive(Debug, Default)]
pub struct MockBuilder {
    bases: Vec<InterfaceDescriptor>,
    overrides: Vec<(String, Attr)>,
}

impl MockBuilder {
    /// Appends a base descriptor. On member-name collisions across bases,
    /// the first-declared base wins.
    #[must_use]
    pub fn base(mut self, descriptor: InterfaceDescriptor) -> Self {
        self.bases.push(descriptor);
        self
    }

    /// Overrides a member with a plain value.
    #[must_use]
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.overrides.push((name.into(), Attr::Value(value.into())));
        self
    }

    /// Overrides a member with a callable.
    #[must_use]
    pub fn with_method(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&[Value]) -> Value + 'static,
    ) -> Self {
        self.overrides.push((name.into(), Attr::method(f)));
        self
    }

    /// Synthesizes the instance: merged stubs first, then overrides on top.
    #[must_use]
    pub fn build(self) -> Mock {
        let mut slots: HashMap<String, Slot> = HashMap::new();
        for base in &self.bases {
            for member in base.members() {
                // first occurrence across bases wins
                slots.entry(member.name.clone()).or_insert(Slot::Stub {
                    interface: base.name().to_string(),
                    kind: member.kind,
                });
            }
        }
        for (name, attr) in self.overrides {
            slots.insert(name, Slot::Concrete(attr));
        }
        Mock {
            bases: self.bases,
            slots,
        }
    }
}

/// Synthesizes a mock in one call: `bases` merged in order, `overrides`
/// applied on top.
///
/// ```
/// use testfix::mock::{make_mock, Attr, InterfaceDescriptor};
/// use serde_json::json;
///
/// let cache = InterfaceDescriptor::new("CacheSystem")
///     .method("invalidate")
///     .method("lookup");
/// let mock = make_mock(
///     vec![cache],
///     vec![("lookup".to_string(), Attr::method(|_| json!("hit")))],
/// );
/// assert_eq!(mock.call("lookup", &[]).unwrap(), json!("hit"));
/// assert!(mock.call("invalidate", &[]).is_err());
/// ```
#[must_use]
pub fn make_mock(bases: Vec<InterfaceDescriptor>, overrides: Vec<(String, Attr)>) -> Mock {
    let mut builder = MockBuilder::default();
    for base in bases {
        builder = builder.base(base);
    }
    for (name, attr) in overrides {
        builder.overrides.push((name, attr));
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy() -> InterfaceDescriptor {
        InterfaceDescriptor::new("PermissionPolicy")
            .method("check")
            .property("username")
    }

    fn registry() -> InterfaceDescriptor {
        InterfaceDescriptor::new("ComponentRegistry")
            .method("check") // collides with PermissionPolicy.check
            .method("activate")
    }

    #[test]
    fn test_stub_raises_not_implemented() {
        let mock = Mock::builder().base(policy()).build();

        let err = mock.call("check", &[]).unwrap_err();
        match err {
            MockError::NotImplemented { interface, member } => {
                assert_eq!(interface, "PermissionPolicy");
                assert_eq!(member, "check");
            }
            other => panic!("unexpected error: {other}"),
        }

        // properties fail on read as well, never a silent default
        assert!(matches!(
            mock.get("username").unwrap_err(),
            MockError::NotImplemented { .. }
        ));
    }

    #[test]
    fn test_override_wins_over_stub() {
        let mock = Mock::builder()
            .base(policy())
            .with_method("check", |_| json!(true))
            .with_value("username", "anonymous")
            .build();

        assert_eq!(mock.call("check", &[]).unwrap(), json!(true));
        assert_eq!(mock.get("username").unwrap(), json!("anonymous"));
        assert!(!mock.is_stubbed("check"));
    }

    #[test]
    fn test_first_base_wins_on_collision() {
        let mock = Mock::builder().base(policy()).base(registry()).build();

        let err = mock.call("check", &[]).unwrap_err();
        match err {
            MockError::NotImplemented { interface, .. } => {
                assert_eq!(interface, "PermissionPolicy");
            }
            other => panic!("unexpected error: {other}"),
        }
        // non-colliding members from the second base are still present
        assert!(mock.is_stubbed("activate"));
    }

    #[test]
    fn test_empty_bases_is_bare_extensible_object() {
        let mut mock = Mock::builder().build();
        assert!(matches!(
            mock.call("anything", &[]).unwrap_err(),
            MockError::UnknownMember { .. }
        ));

        mock.set("add", Attr::method(|args| {
            let a = args[0].as_i64().unwrap_or(0);
            let b = args[1].as_i64().unwrap_or(0);
            json!(a + b)
        }));
        assert_eq!(mock.call("add", &[json!(1), json!(1)]).unwrap(), json!(2));
    }

    #[test]
    fn test_overrides_do_not_leak_between_instances() {
        let base = policy();
        let mut first = Mock::builder().base(base.clone()).build();
        let second = Mock::builder().base(base).build();

        first.set("check", Attr::method(|_| json!("granted")));
        assert_eq!(first.call("check", &[]).unwrap(), json!("granted"));
        // the sibling built from the same descriptor still stubs
        assert!(second.call("check", &[]).is_err());
    }

    #[test]
    fn test_value_is_not_callable_and_method_is_not_a_value() {
        let mock = Mock::builder()
            .with_value("count", 3)
            .with_method("bump", |_| json!(4))
            .build();

        assert!(matches!(
            mock.call("count", &[]).unwrap_err(),
            MockError::NotCallable { .. }
        ));
        assert!(matches!(
            mock.get("bump").unwrap_err(),
            MockError::NotAValue { .. }
        ));
    }

    #[test]
    fn test_satisfies_merged_contract() {
        let mock = make_mock(vec![policy(), registry()], Vec::new());
        assert!(mock.satisfies(&policy()));
        assert!(mock.satisfies(&registry()));
        assert_eq!(mock.bases().len(), 2);
    }

    #[test]
    fn test_method_arguments_pass_through_unvalidated() {
        // stubs perform no argument validation; overrides see args verbatim
        let mock = Mock::builder()
            .with_method("echo", |args| json!(args.len()))
            .build();
        assert_eq!(
            mock.call("echo", &[json!(1), json!("two"), json!(null)]).unwrap(),
            json!(3)
        );
    }
}
