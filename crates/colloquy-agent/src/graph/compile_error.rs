//! Graph compilation error.

use thiserror::Error;

/// Error when compiling a state graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompilationError {
    #[error("graph has no nodes")]
    EmptyGraph,

    /// Nothing leaves START
    #[error("graph has no entry point; add an edge from START")]
    MissingEntry,

    /// An edge references an id that was never added with `add_node`
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("'{0}' is a reserved node name")]
    ReservedName(String),

    #[error("node '{0}' added twice")]
    DuplicateNode(String),

    /// A node may have one static edge or one conditional edge set, not both
    #[error("node '{0}' already has an outgoing edge")]
    DuplicateEdge(String),

    #[error("conditional edges from '{0}' have no targets")]
    NoTargets(String),

    #[error("invalid edge {from} -> {to}")]
    InvalidEdge { from: String, to: String },
}
