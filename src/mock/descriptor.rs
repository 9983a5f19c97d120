//! Interface descriptors: the static contracts mocks are synthesized from.
//!
//! A descriptor is a named set of abstract members (methods and
//! properties). It is the explicit, introspection-free replacement for
//! discovering abstract members at runtime: test code declares the
//! contract once and hands it to the synthesizer.

/// Whether an abstract member is invoked or read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// Callable member; stubs raise not-implemented when invoked.
    Method,
    /// Readable member; stubs raise not-implemented when read.
    Property,
}

/// One abstract member of an interface.
#[derive(Debug, Clone)]
pub struct AbstractMember {
    /// Member name, unique within its descriptor.
    pub name: String,
    /// Method or property.
    pub kind: MemberKind,
}

/// A named set of abstract members that any conforming object must provide.
///
/// Built incrementally:
///
/// ```
/// use testfix::mock::InterfaceDescriptor;
///
/// let policy = InterfaceDescriptor::new("PermissionPolicy")
///     .method("check")
///     .property("username");
/// assert!(policy.is_abstract("check"));
/// assert!(!policy.is_abstract("unrelated"));
/// ```
#[derive(Debug, Clone)]
pub struct InterfaceDescriptor {
    name: String,
    members: Vec<AbstractMember>,
}

impl InterfaceDescriptor {
    /// Creates an empty descriptor with the given interface name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Adds an abstract method. Re-declaring an existing name is a no-op;
    /// the first declaration wins, matching the merge rule across bases.
    #[must_use]
    pub fn method(self, name: impl Into<String>) -> Self {
        self.member(name, MemberKind::Method)
    }

    /// Adds an abstract property.
    #[must_use]
    pub fn property(self, name: impl Into<String>) -> Self {
        self.member(name, MemberKind::Property)
    }

    fn member(mut self, name: impl Into<String>, kind: MemberKind) -> Self {
        let name = name.into();
        if !self.members.iter().any(|m| m.name == name) {
            self.members.push(AbstractMember { name, kind });
        }
        self
    }

    /// The interface name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All abstract members, in declaration order.
    #[must_use]
    pub fn members(&self) -> &[AbstractMember] {
        &self.members
    }

    /// Returns true if the named member is abstract in this descriptor.
    #[must_use]
    pub fn is_abstract(&self, name: &str) -> bool {
        self.members.iter().any(|m| m.name == name)
    }
}
