//! Ready-made nodes and graphs
//!
//! - [`ChatModelNode`] calls a chat model on the (optionally trimmed and templated) history.
//! - [`ToolNode`] answers every tool call in the last assistant message.
//! - [`tools_condition`] routes to `"tools"` while the model keeps asking for tools.
//! - [`chat_graph`], [`tool_calling_graph`] and [`create_react_agent`] wire them together.

use std::sync::Arc;

use async_trait::async_trait;
use colloquy_ai::{ChatPromptTemplate, Message, PromptValues};

use crate::checkpoint::Checkpointer;
use crate::error::{Error, Result};
use crate::graph::{CompilationError, CompiledGraph, END, Node, NodeContext, START, StateGraph};
use crate::model::ChatModel;
use crate::state::{GraphState, StateUpdate};
use crate::tool::ToolRegistry;
use crate::trim::Trimmer;

/// Node id the tool node is registered under
pub const TOOLS_NODE: &str = "tools";

/// Calls a chat model with the state's messages and appends its reply
pub struct ChatModelNode {
    model: ChatModel,
    prompt: Option<ChatPromptTemplate>,
    trimmer: Option<Trimmer>,
    max_tool_calls: Option<usize>,
}

impl ChatModelNode {
    pub fn new(model: ChatModel) -> Self {
        Self {
            model,
            prompt: None,
            trimmer: None,
            max_tool_calls: None,
        }
    }

    /// Render the request through a template.
    ///
    /// The history is bound to the `messages` placeholder and every state value
    /// is bound as a variable (strings as-is, other JSON as text).
    pub fn with_prompt(mut self, prompt: ChatPromptTemplate) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Trim the history before rendering
    pub fn with_trimmer(mut self, trimmer: Trimmer) -> Self {
        self.trimmer = Some(trimmer);
        self
    }

    /// Fail the step if the model asks for more tool calls than this in one reply
    pub fn with_max_tool_calls(mut self, max: usize) -> Self {
        self.max_tool_calls = Some(max);
        self
    }

    /// Messages sent to the model for this state
    pub fn render(&self, state: &GraphState) -> Result<Vec<Message>> {
        let history = match &self.trimmer {
            Some(trimmer) => trimmer.trim(&state.messages),
            None => state.messages.clone(),
        };

        let Some(prompt) = &self.prompt else {
            return Ok(history);
        };

        let mut values = PromptValues::new().messages("messages", history);
        for (key, value) in &state.values {
            match value.as_str() {
                Some(s) => values.set_var(key.as_str(), s),
                None => values.set_var(key.as_str(), value.to_string()),
            }
        }
        Ok(prompt.invoke(&values)?)
    }
}

#[async_trait]
impl Node for ChatModelNode {
    async fn run(&self, state: &GraphState, ctx: &NodeContext) -> Result<StateUpdate> {
        let messages = self.render(state)?;

        let response = if ctx.streams_messages() {
            self.model
                .invoke_streaming(&messages, |delta| ctx.emit_delta(delta))
                .await?
        } else {
            self.model.invoke(&messages).await?
        };

        if let Some(max) = self.max_tool_calls {
            let requested = response.tool_calls().len();
            if requested > max {
                return Err(Error::node(
                    ctx.node_id(),
                    format!(
                        "model requested {} tool calls, at most {} allowed",
                        requested, max
                    ),
                ));
            }
        }

        Ok(StateUpdate::message(response))
    }
}

/// Runs the tool calls of the last assistant message, in order
pub struct ToolNode {
    tools: Arc<ToolRegistry>,
}

impl ToolNode {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl Node for ToolNode {
    async fn run(&self, state: &GraphState, ctx: &NodeContext) -> Result<StateUpdate> {
        let Some(last @ Message::Assistant { .. }) = state.last_message() else {
            return Err(Error::node(
                ctx.node_id(),
                "expected an assistant message with tool calls",
            ));
        };

        let mut results = Vec::new();
        for call in last.tool_calls() {
            let result = self.tools.execute(&call, ctx.tool_context()).await?;
            results.push(Message::tool_result(
                call.id,
                call.name,
                result.content,
                result.is_error,
            ));
        }
        Ok(StateUpdate::messages(results))
    }
}

/// Route to the tool node if the last message asks for tools, else finish
pub fn tools_condition(state: &GraphState) -> String {
    match state.last_message() {
        Some(message) if message.has_tool_calls() => TOOLS_NODE.to_string(),
        _ => END.to_string(),
    }
}

/// START -> model -> END
pub fn chat_graph(
    node: ChatModelNode,
    checkpointer: Option<Arc<dyn Checkpointer>>,
) -> std::result::Result<CompiledGraph, CompilationError> {
    let mut graph = StateGraph::new();
    graph.add_node("model", node).add_edge(START, "model");
    compile(graph, checkpointer)
}

/// START -> `node_id`, which loops through the tool node until the model stops calling tools.
///
/// The model inside `node` should already have the registry's tools bound.
pub fn tool_calling_graph(
    node_id: &str,
    node: ChatModelNode,
    tools: Arc<ToolRegistry>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
) -> std::result::Result<CompiledGraph, CompilationError> {
    let mut graph = StateGraph::new();
    graph
        .add_node(node_id, node)
        .add_node(TOOLS_NODE, ToolNode::new(tools))
        .add_edge(START, node_id)
        .add_conditional_edges(node_id, tools_condition, [TOOLS_NODE, END])
        .add_edge(TOOLS_NODE, node_id);
    compile(graph, checkpointer)
}

/// A tool-calling agent: binds `tools` to `model` and loops "agent" <-> "tools"
pub fn create_react_agent(
    model: &ChatModel,
    tools: Arc<ToolRegistry>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
) -> std::result::Result<CompiledGraph, CompilationError> {
    let node = ChatModelNode::new(model.bind_tools(&tools));
    tool_calling_graph("agent", node, tools, checkpointer)
}

fn compile(
    graph: StateGraph,
    checkpointer: Option<Arc<dyn Checkpointer>>,
) -> std::result::Result<CompiledGraph, CompilationError> {
    match checkpointer {
        Some(c) => graph.compile_with_checkpointer(c),
        None => graph.compile(),
    }
}
