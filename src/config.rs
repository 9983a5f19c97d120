//! Configuration stub.
//!
//! A writable section/key/value map whose write hook captures the rendered
//! content instead of persisting it, so tests can inspect "what would have
//! been written" without touching disk.

use std::collections::BTreeMap;

/// In-memory stand-in for the host application's configuration object.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationStub {
    sections: BTreeMap<String, BTreeMap<String, String>>,
    file_content: Option<String>,
}

impl ConfigurationStub {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a key, creating the section as needed.
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// Reads a key.
    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }

    /// All key/value pairs of a section, in key order.
    #[must_use]
    pub fn section(&self, name: &str) -> Vec<(&str, &str)> {
        self.sections
            .get(name)
            .map(|s| s.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect())
            .unwrap_or_default()
    }

    /// The write hook: renders the configuration and captures it in
    /// memory. Nothing is written to the filesystem.
    pub fn write(&mut self) {
        let mut out = String::new();
        for (section, entries) in &self.sections {
            out.push_str(&format!("[{section}]\n"));
            for (key, value) in entries {
                out.push_str(&format!("{key} = {value}\n"));
            }
            out.push('\n');
        }
        self.file_content = Some(out);
    }

    /// Content captured by the last [`write`](Self::write), if any.
    #[must_use]
    pub fn file_content(&self) -> Option<&str> {
        self.file_content.as_deref()
    }
}

/// Seeds the minimal ticket-workflow block lots of host subsystems expect
/// to find. Invoked once per environment stub construction.
pub fn load_workflow_snippet(config: &mut ConfigurationStub) {
    const SECTION: &str = "ticket-workflow";
    config.set(SECTION, "leave", "* -> *");
    config.set(SECTION, "leave.operations", "leave_status");
    config.set(SECTION, "leave.default", "1");
    config.set(SECTION, "accept", "new,assigned,accepted,reopened -> accepted");
    config.set(SECTION, "accept.permissions", "TICKET_MODIFY");
    config.set(SECTION, "resolve", "new,assigned,accepted,reopened -> closed");
    config.set(SECTION, "resolve.operations", "set_resolution");
    config.set(SECTION, "resolve.permissions", "TICKET_MODIFY");
    config.set(SECTION, "reopen", "closed -> reopened");
    config.set(SECTION, "reopen.operations", "del_resolution");
    config.set(SECTION, "reopen.permissions", "TICKET_CREATE");
}
