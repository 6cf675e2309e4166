//! Error types for graph construction.
//!
//! Activation itself never returns errors: a misconfigured node fails
//! closed and leaves a [`Diagnostic`](crate::diagnostic::Diagnostic) behind.
//! [`GraphError`] covers the authoring-time operations that can refuse a
//! request outright.

use tripwire_types::NodeId;

/// Errors that can occur while building or editing a trigger graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The referenced node does not exist in this world.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// Another node already owns the event name.
    #[error("event name `{name}` is already owned by node {owner}")]
    EventNameTaken {
        /// The contested name.
        name: String,
        /// The current owner.
        owner: NodeId,
    },

    /// A blueprint refers to a node name that was never declared.
    #[error("node `{referenced_by}` refers to unknown node `{name}`")]
    UnknownNodeName {
        /// The missing name.
        name: String,
        /// The node holding the reference.
        referenced_by: String,
    },

    /// A blueprint or sandbox refers to an actor, entity or group that was
    /// never declared.
    #[error("unknown {what} `{name}`")]
    UnknownReference {
        /// What kind of thing was referenced.
        what: &'static str,
        /// The missing name.
        name: String,
    },

    /// Two blueprint nodes share a name.
    #[error("duplicate node name `{0}`")]
    DuplicateNodeName(String),

    /// A node definition is internally inconsistent.
    #[error("invalid node `{name}`: {reason}")]
    InvalidNode {
        /// The node's name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The operation does not apply to this kind of node.
    #[error("node {node} does not support {operation}")]
    Unsupported {
        /// The node.
        node: NodeId,
        /// The rejected operation.
        operation: &'static str,
    },
}
