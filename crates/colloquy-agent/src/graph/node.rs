//! Graph node trait: one step in a StateGraph.

use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::events::{EventSink, GraphEvent, StreamMode};
use crate::state::{GraphState, StateUpdate};
use crate::tool::ToolContext;

/// What a node sees besides the state
#[derive(Debug, Clone)]
pub struct NodeContext {
    node_id: String,
    tools: ToolContext,
    sink: Option<EventSink>,
}

impl NodeContext {
    pub fn new(node_id: impl Into<String>, tools: ToolContext, sink: Option<EventSink>) -> Self {
        Self {
            node_id: node_id.into(),
            tools,
            sink,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Context to hand to tools; carries cancellation and any resume value
    pub fn tool_context(&self) -> &ToolContext {
        &self.tools
    }

    /// Pause the run for human input; see [`ToolContext::interrupt`]
    pub fn interrupt(&self, payload: Value) -> Result<Value> {
        Ok(self.tools.interrupt(payload)?)
    }

    /// Whether the caller is streaming model text
    pub fn streams_messages(&self) -> bool {
        self.sink
            .as_ref()
            .is_some_and(|s| s.mode() == StreamMode::Messages)
    }

    /// Report a model text fragment to a streaming caller
    pub fn emit_delta(&self, delta: &str) {
        if let Some(sink) = &self.sink {
            sink.emit(GraphEvent::MessageDelta {
                node: self.node_id.clone(),
                delta: delta.to_string(),
            });
        }
    }
}

/// One step in a graph: reads the state, returns an update.
#[async_trait]
pub trait Node: Send + Sync {
    async fn run(&self, state: &GraphState, ctx: &NodeContext) -> Result<StateUpdate>;
}

/// A node backed by an async function of the state
pub struct FnNode<F>(F);

/// Wrap an async function as a node
pub fn node_fn<F, Fut>(f: F) -> FnNode<F>
where
    F: Fn(GraphState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StateUpdate>> + Send + 'static,
{
    FnNode(f)
}

#[async_trait]
impl<F, Fut> Node for FnNode<F>
where
    F: Fn(GraphState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StateUpdate>> + Send + 'static,
{
    async fn run(&self, state: &GraphState, _ctx: &NodeContext) -> Result<StateUpdate> {
        (self.0)(state.clone()).await
    }
}
