//! Error types for colloquy-agent

use thiserror::Error;

use crate::checkpoint::CheckpointError;
use crate::graph::CompilationError;
use crate::interrupt::Interrupt;

/// Result type alias using colloquy-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running models, tools and graphs
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the AI provider layer
    #[error(transparent)]
    Ai(#[from] colloquy_ai::Error),

    /// A node paused for human input. The graph runner turns this into
    /// an interrupted run outcome; callers only see it outside a graph.
    #[error("interrupted: {0}")]
    Interrupted(Interrupt),

    /// Resume was requested but the thread has nothing to resume
    #[error("no pending interrupt for thread '{0}'")]
    NoPendingInterrupt(String),

    /// Checkpoint storage failure
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Graph definition is invalid
    #[error(transparent)]
    Compilation(#[from] CompilationError),

    /// The run executed more node steps than allowed
    #[error("recursion limit of {0} reached without hitting a stop condition")]
    RecursionLimit(usize),

    /// A node failed
    #[error("node '{node}' failed: {message}")]
    Node { node: String, message: String },

    /// A generic agent error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a node failure
    pub fn node(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Node {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Check if retrying the same request might succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Ai(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<Interrupt> for Error {
    fn from(interrupt: Interrupt) -> Self {
        Error::Interrupted(interrupt)
    }
}
