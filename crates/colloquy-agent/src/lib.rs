//! colloquy-agent: conversation graphs with tools, memory and human-in-the-loop
//!
//! This crate provides the chat model handle, tools, history trimming, state
//! graphs with per-thread checkpoints, interrupts, and the prebuilt chatbot
//! and agent graphs built on top of them.

pub mod checkpoint;
pub mod error;
pub mod events;
pub mod graph;
pub mod interrupt;
pub mod model;
pub mod prebuilt;
pub mod react;
pub mod state;
pub mod tool;
pub mod trim;

#[cfg(test)]
pub(crate) mod test_support;

pub use checkpoint::{Checkpoint, CheckpointError, Checkpointer, MemorySaver};
pub use error::{Error, Result};
pub use events::{GraphEvent, GraphEventStream, StreamMode};
pub use graph::{
    CompilationError, CompiledGraph, END, GraphInput, Node, NodeContext, RunConfig, RunOutcome,
    START, StateGraph, StateSnapshot, node_fn,
};
pub use interrupt::Interrupt;
pub use model::{ChatModel, RetryConfig};
pub use prebuilt::{
    ChatModelNode, ToolNode, chat_graph, create_react_agent, tool_calling_graph, tools_condition,
};
pub use react::{AgentExecutor, ExecutorOutput};
pub use state::{GraphState, StateUpdate};
pub use tool::{BoxedTool, Tool, ToolContext, ToolRegistry, ToolResult};
pub use trim::{ApproxTokenCounter, MessageCounter, TokenCounter, TrimConfig, TrimStrategy, Trimmer, trim_messages};
