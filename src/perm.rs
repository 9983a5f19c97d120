//! Permission stand-ins.
//!
//! [`Mock`](crate::mock::Mock) cannot model the permission checker's
//! filter-style call shape, so a fixed always-grant type is provided
//! instead.

use crate::error::PermissionError;

/// Narrow contract for the host application's permission checker.
pub trait PermissionCheck {
    /// Returns whether `action` is permitted.
    fn has_permission(&self, action: &str) -> bool;

    /// Fails with [`PermissionError`] unless `action` is permitted.
    ///
    /// # Errors
    /// Returns `PermissionError` when the action is refused.
    fn require(&self, action: &str) -> Result<(), PermissionError>;
}

/// Fixed, non-configurable "allow everything" permission checker.
#[derive(Debug, Clone, Default)]
pub struct AllowAllPerm {
    /// Username the checker reports; empty by default.
    pub username: String,
}

impl AllowAllPerm {
    /// Creates the stand-in with an empty username.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Containment check; always true.
    #[must_use]
    pub fn contains(&self, _action: &str) -> bool {
        true
    }

    /// Call-as-filter: narrowing to a resource yields the same
    /// all-granting checker.
    #[must_use]
    pub fn scoped(&self, _realm: &str, _id: Option<&str>) -> &Self {
        self
    }

    /// No-op assertion, kept as an alias for `require`.
    pub fn assert_permission(&self, _action: &str) {}
}

impl PermissionCheck for AllowAllPerm {
    fn has_permission(&self, _action: &str) -> bool {
        true
    }

    fn require(&self, _action: &str) -> Result<(), PermissionError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all_grants_everything() {
        let perm = AllowAllPerm::new();
        assert!(perm.has_permission("TICKET_ADMIN"));
        assert!(perm.contains("WIKI_DELETE"));
        assert!(perm.require("MILESTONE_MODIFY").is_ok());
        perm.assert_permission("REPORT_VIEW");
        assert_eq!(perm.username, "");
    }

    #[test]
    fn test_scoped_filter_still_grants() {
        let perm = AllowAllPerm::new();
        let narrowed = perm.scoped("wiki", Some("StartPage"));
        assert!(narrowed.has_permission("WIKI_VIEW"));
    }

    // the contract stays object-safe for host code taking &dyn
    fn _assert_object_safe(_: &dyn PermissionCheck) {}
}
