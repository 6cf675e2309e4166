//! Authoring diagnostics.
//!
//! Misconfigured nodes never raise errors during activation. They fail
//! closed and leave a [`Diagnostic`] here, which authoring tools read back
//! through the world. Every diagnostic is also logged at `warn`.

use tracing::warn;
use tripwire_types::NodeId;

/// One authoring problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// The node the problem belongs to, if any.
    pub node: Option<NodeId>,
    /// Human-readable description.
    pub message: String,
}

impl core::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.node {
            Some(node) => write!(f, "node {node}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Collected diagnostics. Identical entries are kept once.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a problem. Returns `false` if the same entry is already held.
    pub fn report(&mut self, node: Option<NodeId>, message: impl Into<String>) -> bool {
        let entry = Diagnostic {
            node,
            message: message.into(),
        };
        if self.entries.contains(&entry) {
            return false;
        }
        warn!(node = ?entry.node, message = %entry.message, "authoring diagnostic");
        self.entries.push(entry);
        true
    }

    /// Entries in the order they were reported.
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Remove and return every entry.
    pub fn take(&mut self) -> Vec<Diagnostic> {
        core::mem::take(&mut self.entries)
    }

    /// Whether nothing has been reported.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_reports_are_kept_once() {
        let mut diagnostics = Diagnostics::new();
        assert!(diagnostics.report(Some(NodeId(1)), "no source"));
        assert!(!diagnostics.report(Some(NodeId(1)), "no source"));
        assert!(diagnostics.report(Some(NodeId(2)), "no source"));
        assert_eq!(diagnostics.entries().len(), 2);
        assert_eq!(diagnostics.take().len(), 2);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn display_includes_node() {
        let d = Diagnostic {
            node: Some(NodeId(4)),
            message: "cycle".to_owned(),
        };
        assert_eq!(d.to_string(), "node #4: cycle");
    }
}
