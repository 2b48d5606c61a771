//! State graphs: nodes joined by static and conditional edges.
//!
//! Build a [`StateGraph`] with `add_node`, `add_edge` and `add_conditional_edges`,
//! then `compile` (or `compile_with_checkpointer`) to get a [`CompiledGraph`] that
//! can be invoked or streamed. Every graph starts at [`START`] and stops when a
//! route reaches [`END`] or a node has no outgoing edge.

mod compile_error;
mod compiled;
mod node;
mod state_graph;

pub use compile_error::CompilationError;
pub use compiled::{
    CompiledGraph, DEFAULT_RECURSION_LIMIT, GraphInput, RunConfig, RunOutcome, StateSnapshot,
};
pub use node::{FnNode, Node, NodeContext, node_fn};
pub use state_graph::{END, Router, START, StateGraph};
