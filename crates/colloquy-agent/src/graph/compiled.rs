//! Compiled state graph: immutable, supports invoke and stream.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use colloquy_ai::Message;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{Checkpoint, CheckpointError, CheckpointSource, CheckpointSummary, Checkpointer};
use crate::error::{Error, Result};
use crate::events::{EventSink, GraphEvent, GraphEventStream, StreamMode};
use crate::interrupt::{Interrupt, ResumeSlot};
use crate::state::{GraphState, StateUpdate};
use crate::tool::ToolContext;

use super::node::{Node, NodeContext};
use super::state_graph::{END, Edge, START};

/// Default cap on node executions per run
pub const DEFAULT_RECURSION_LIMIT: usize = 25;

/// Result text for tool calls abandoned when a thread moves on
const ABANDONED_TOOL_CALL: &str = "Tool call was not completed: the run stopped before it finished.";

/// Per-run configuration
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Conversation thread; required when the graph has a checkpointer
    pub thread_id: Option<String>,
    /// Maximum node executions before the run fails
    pub recursion_limit: usize,
    pub cancel: CancellationToken,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            thread_id: None,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            cancel: CancellationToken::new(),
        }
    }
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config for a conversation thread
    pub fn thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            ..Self::default()
        }
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Run input
#[derive(Debug, Clone)]
pub enum GraphInput {
    /// Apply an update and start from the entry point
    Update(StateUpdate),
    /// Answer the thread's pending interrupt and continue
    Resume(Value),
}

impl GraphInput {
    pub fn message(message: Message) -> Self {
        Self::Update(StateUpdate::message(message))
    }
}

impl From<StateUpdate> for GraphInput {
    fn from(update: StateUpdate) -> Self {
        Self::Update(update)
    }
}

impl From<Message> for GraphInput {
    fn from(message: Message) -> Self {
        Self::message(message)
    }
}

/// How a run ended
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Complete(GraphState),
    /// Paused; resume the thread with [`GraphInput::Resume`]
    Interrupted {
        state: GraphState,
        interrupt: Interrupt,
    },
}

impl RunOutcome {
    pub fn state(&self) -> &GraphState {
        match self {
            RunOutcome::Complete(state) => state,
            RunOutcome::Interrupted { state, .. } => state,
        }
    }

    pub fn into_state(self) -> GraphState {
        match self {
            RunOutcome::Complete(state) => state,
            RunOutcome::Interrupted { state, .. } => state,
        }
    }

    pub fn interrupt(&self) -> Option<&Interrupt> {
        match self {
            RunOutcome::Interrupted { interrupt, .. } => Some(interrupt),
            RunOutcome::Complete(_) => None,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt().is_some()
    }

    /// Last message of the final state
    pub fn last_message(&self) -> Option<&Message> {
        self.state().last_message()
    }
}

/// The saved view of a thread
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub state: GraphState,
    /// Node that runs next; `None` when the last run finished
    pub next: Option<String>,
    pub pending_interrupt: Option<Interrupt>,
    pub step: u64,
    pub checkpoint_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<Checkpoint> for StateSnapshot {
    fn from(c: Checkpoint) -> Self {
        Self {
            state: c.state,
            next: c.next,
            pending_interrupt: c.pending_interrupt,
            step: c.step,
            checkpoint_id: c.id,
            created_at: c.created_at,
        }
    }
}

pub(crate) struct GraphInner {
    pub(crate) nodes: HashMap<String, Arc<dyn Node>>,
    pub(crate) node_order: Vec<String>,
    pub(crate) edges: HashMap<String, Edge>,
    pub(crate) checkpointer: Option<Arc<dyn Checkpointer>>,
}

/// Executable graph.
///
/// Cheap to clone; clones share nodes and the checkpointer.
#[derive(Clone)]
pub struct CompiledGraph {
    inner: Arc<GraphInner>,
}

/// Where the run is writing checkpoints
struct Saver<'a> {
    checkpointer: &'a dyn Checkpointer,
    thread_id: &'a str,
    step: u64,
}

impl Saver<'_> {
    async fn save(
        &mut self,
        source: CheckpointSource,
        state: &GraphState,
        next: Option<&str>,
        interrupt: Option<&Interrupt>,
    ) -> Result<()> {
        let mut checkpoint = Checkpoint::new(
            self.thread_id,
            self.step,
            source,
            state.clone(),
            next.map(str::to_string),
        );
        if let Some(interrupt) = interrupt {
            checkpoint = checkpoint.with_interrupt(interrupt.clone());
        }
        self.checkpointer.put(checkpoint).await?;
        self.step += 1;
        Ok(())
    }
}

impl CompiledGraph {
    pub(crate) fn from_inner(inner: GraphInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Node ids in insertion order
    pub fn node_ids(&self) -> &[String] {
        &self.inner.node_order
    }

    pub fn has_checkpointer(&self) -> bool {
        self.inner.checkpointer.is_some()
    }

    /// Run to completion or to the first interrupt.
    pub async fn invoke(&self, input: impl Into<GraphInput>, config: &RunConfig) -> Result<RunOutcome> {
        self.run(input.into(), config, None).await
    }

    /// Run in the background, reporting events for `mode`.
    ///
    /// Interrupts and errors are always reported. The stream ends when the run does.
    pub fn stream(
        &self,
        input: impl Into<GraphInput>,
        config: RunConfig,
        mode: StreamMode,
    ) -> GraphEventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let graph = self.clone();
        let input = input.into();

        tokio::spawn(async move {
            let sink = EventSink::new(tx, mode);
            if let Err(e) = graph.run(input, &config, Some(&sink)).await {
                tracing::debug!("streamed run failed: {}", e);
                sink.emit(GraphEvent::Error {
                    message: e.to_string(),
                });
            }
        });

        Box::pin(UnboundedReceiverStream::new(rx))
    }

    /// Latest saved state for the thread; `None` without a checkpointer or history
    pub async fn get_state(&self, config: &RunConfig) -> Result<Option<StateSnapshot>> {
        let Some(checkpointer) = &self.inner.checkpointer else {
            return Ok(None);
        };
        let thread_id = config
            .thread_id
            .as_deref()
            .ok_or(CheckpointError::ThreadIdRequired)?;
        Ok(checkpointer
            .get_latest(thread_id)
            .await?
            .map(StateSnapshot::from))
    }

    /// Checkpoint history for the thread, newest first
    pub async fn get_state_history(
        &self,
        config: &RunConfig,
        limit: Option<usize>,
    ) -> Result<Vec<CheckpointSummary>> {
        let Some(checkpointer) = &self.inner.checkpointer else {
            return Ok(Vec::new());
        };
        let thread_id = config
            .thread_id
            .as_deref()
            .ok_or(CheckpointError::ThreadIdRequired)?;
        Ok(checkpointer.list(thread_id, limit).await?)
    }

    async fn run(
        &self,
        input: GraphInput,
        config: &RunConfig,
        sink: Option<&EventSink>,
    ) -> Result<RunOutcome> {
        let emit = |event: GraphEvent| {
            if let Some(sink) = sink {
                sink.emit(event);
            }
        };

        let (previous, mut saver) = match &self.inner.checkpointer {
            Some(checkpointer) => {
                let thread_id = config
                    .thread_id
                    .as_deref()
                    .ok_or(CheckpointError::ThreadIdRequired)?;
                let previous = checkpointer.get_latest(thread_id).await?;
                let step = previous.as_ref().map(|c| c.step + 1).unwrap_or(0);
                let saver = Saver {
                    checkpointer: checkpointer.as_ref(),
                    thread_id,
                    step,
                };
                (previous, Some(saver))
            }
            None => (None, None),
        };

        let (mut state, mut current, resume) = match input {
            GraphInput::Update(update) => {
                let mut state = GraphState::default();
                if let Some(previous) = previous {
                    state = previous.state;
                    if previous.pending_interrupt.is_some() {
                        tracing::info!("new input discards the pending interrupt");
                    }
                    if previous.next.is_some() {
                        state.close_pending_tool_calls(ABANDONED_TOOL_CALL);
                    }
                }
                state.apply(update);
                let entry = self.route(START, &state)?;
                if let Some(saver) = saver.as_mut() {
                    saver
                        .save(CheckpointSource::Input, &state, Some(&entry), None)
                        .await?;
                }
                emit(GraphEvent::Values {
                    state: state.clone(),
                });
                (state, entry, ResumeSlot::default())
            }
            GraphInput::Resume(value) => {
                let thread = config.thread_id.clone().unwrap_or_default();
                let previous = previous.ok_or_else(|| Error::NoPendingInterrupt(thread.clone()))?;
                let interrupt = previous
                    .pending_interrupt
                    .ok_or(Error::NoPendingInterrupt(thread))?;
                tracing::debug!(node = %interrupt.node, "resuming interrupted node");
                (previous.state, interrupt.node, ResumeSlot::new(Some(value)))
            }
        };

        let mut executed = 0usize;
        while current != END {
            if config.cancel.is_cancelled() {
                return Err(Error::Other("run cancelled".into()));
            }
            executed += 1;
            if executed > config.recursion_limit {
                return Err(Error::RecursionLimit(config.recursion_limit));
            }

            let node = self
                .inner
                .nodes
                .get(&current)
                .ok_or_else(|| Error::Other(format!("node not found: {}", current)))?;
            let tools = ToolContext::new(config.cancel.child_token()).with_resume(resume.clone());
            let ctx = NodeContext::new(current.clone(), tools, sink.cloned());

            tracing::debug!(node = %current, "running node");
            match node.run(&state, &ctx).await {
                Ok(update) => {
                    state.apply(update.clone());
                    let next = self.route(&current, &state)?;
                    if let Some(saver) = saver.as_mut() {
                        let pending = (next != END).then_some(next.as_str());
                        saver
                            .save(CheckpointSource::Loop, &state, pending, None)
                            .await?;
                    }
                    emit(GraphEvent::Updates {
                        node: current.clone(),
                        update,
                    });
                    emit(GraphEvent::Values {
                        state: state.clone(),
                    });
                    current = next;
                }
                Err(Error::Interrupted(mut interrupt)) => {
                    interrupt.node = current.clone();
                    tracing::info!(node = %current, "run interrupted");
                    if let Some(saver) = saver.as_mut() {
                        saver
                            .save(
                                CheckpointSource::Interrupt,
                                &state,
                                Some(&current),
                                Some(&interrupt),
                            )
                            .await?;
                    }
                    emit(GraphEvent::Interrupt {
                        interrupt: interrupt.clone(),
                    });
                    return Ok(RunOutcome::Interrupted { state, interrupt });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(RunOutcome::Complete(state))
    }

    /// Where to go after `from`. A node without an outgoing edge ends the run.
    fn route(&self, from: &str, state: &GraphState) -> Result<String> {
        match self.inner.edges.get(from) {
            None => Ok(END.to_string()),
            Some(Edge::Static(to)) => Ok(to.clone()),
            Some(Edge::Conditional { router, targets }) => {
                let to = router(state);
                if targets.contains(&to) {
                    Ok(to)
                } else {
                    Err(Error::node(
                        from,
                        format!("router chose '{}', expected one of [{}]", to, targets.join(", ")),
                    ))
                }
            }
        }
    }

    /// Render the graph as a Mermaid flowchart
    pub fn draw_mermaid(&self) -> String {
        let mut out = String::from("graph TD;\n");
        out.push_str(&format!("\t{}([<p>{}</p>]):::first\n", START, START));
        for id in &self.inner.node_order {
            out.push_str(&format!("\t{}({})\n", id, id));
        }
        out.push_str(&format!("\t{}([<p>{}</p>]):::last\n", END, END));

        let sources = std::iter::once(START.to_string()).chain(self.inner.node_order.iter().cloned());
        for from in sources {
            match self.inner.edges.get(&from) {
                Some(Edge::Static(to)) => out.push_str(&format!("\t{} --> {};\n", from, to)),
                Some(Edge::Conditional { targets, .. }) => {
                    for to in targets {
                        out.push_str(&format!("\t{} -.-> {};\n", from, to));
                    }
                }
                None => out.push_str(&format!("\t{} --> {};\n", from, END)),
            }
        }

        out.push_str("\tclassDef default fill:#f2f0ff,line-height:1.2\n");
        out.push_str("\tclassDef first fill-opacity:0\n");
        out.push_str("\tclassDef last fill:#bfb6fc\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemorySaver;
    use crate::graph::{StateGraph, node_fn};
    use futures::StreamExt;
    use serde_json::json;

    /// Echoes the last user message back, prefixed with everything it has seen
    fn echo_graph(checkpointer: Option<Arc<dyn Checkpointer>>) -> CompiledGraph {
        let mut graph = StateGraph::new();
        graph
            .add_node(
                "model",
                node_fn(|state: GraphState| async move {
                    let seen = state
                        .messages
                        .iter()
                        .filter(|m| m.role() == "user")
                        .map(Message::text)
                        .collect::<Vec<_>>()
                        .join(", ");
                    Ok(StateUpdate::message(Message::assistant(seen)))
                }),
            )
            .add_edge(START, "model");
        match checkpointer {
            Some(c) => graph.compile_with_checkpointer(c).unwrap(),
            None => graph.compile().unwrap(),
        }
    }

    /// Asks a human once, then records the answer
    struct AskNode;

    #[async_trait::async_trait]
    impl Node for AskNode {
        async fn run(&self, _state: &GraphState, ctx: &NodeContext) -> Result<StateUpdate> {
            let answer = ctx.interrupt(json!({"query": "name?"}))?;
            Ok(StateUpdate::message(Message::assistant(
                answer["data"].as_str().unwrap_or_default(),
            )))
        }
    }

    fn ask_graph() -> CompiledGraph {
        let mut graph = StateGraph::new();
        graph.add_node("ask", AskNode).add_edge(START, "ask").add_edge("ask", END);
        graph
            .compile_with_checkpointer(Arc::new(MemorySaver::new()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_invoke_without_checkpointer() {
        let graph = echo_graph(None);
        let outcome = graph
            .invoke(Message::user("hi"), &RunConfig::new())
            .await
            .unwrap();
        assert!(!outcome.is_interrupted());
        assert_eq!(outcome.last_message().unwrap().text(), "hi");

        // No memory between runs
        let outcome = graph
            .invoke(Message::user("again"), &RunConfig::new())
            .await
            .unwrap();
        assert_eq!(outcome.last_message().unwrap().text(), "again");
    }

    #[tokio::test]
    async fn test_thread_memory_is_isolated() {
        let graph = echo_graph(Some(Arc::new(MemorySaver::new())));
        let abc123 = RunConfig::thread("abc123");
        let abc456 = RunConfig::thread("abc456");

        graph.invoke(Message::user("Hi! I'm Bob."), &abc123).await.unwrap();
        let outcome = graph.invoke(Message::user("What's my name?"), &abc123).await.unwrap();
        assert_eq!(
            outcome.last_message().unwrap().text(),
            "Hi! I'm Bob., What's my name?"
        );
        assert_eq!(outcome.state().messages.len(), 4);

        let outcome = graph.invoke(Message::user("What's my name?"), &abc456).await.unwrap();
        assert_eq!(outcome.last_message().unwrap().text(), "What's my name?");
    }

    #[tokio::test]
    async fn test_checkpointer_requires_thread_id() {
        let graph = echo_graph(Some(Arc::new(MemorySaver::new())));
        let err = graph
            .invoke(Message::user("hi"), &RunConfig::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Checkpoint(CheckpointError::ThreadIdRequired)));
    }

    #[tokio::test]
    async fn test_checkpoint_saved_per_step() {
        let graph = echo_graph(Some(Arc::new(MemorySaver::new())));
        let config = RunConfig::thread("t");
        graph.invoke(Message::user("hi"), &config).await.unwrap();

        let history = graph.get_state_history(&config, None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].source, CheckpointSource::Loop);
        assert_eq!(history[0].next, None);
        assert_eq!(history[1].source, CheckpointSource::Input);
        assert_eq!(history[1].next.as_deref(), Some("model"));

        let snapshot = graph.get_state(&config).await.unwrap().unwrap();
        assert_eq!(snapshot.step, 1);
        assert_eq!(snapshot.state.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_values_overwrite_and_persist() {
        let mut graph = StateGraph::new();
        graph
            .add_node(
                "model",
                node_fn(|state: GraphState| async move {
                    let language = state.value_str("language").unwrap_or("English").to_string();
                    Ok(StateUpdate::message(Message::assistant(language)))
                }),
            )
            .add_edge(START, "model");
        let graph = graph
            .compile_with_checkpointer(Arc::new(MemorySaver::new()))
            .unwrap();
        let config = RunConfig::thread("lang");

        let first = StateUpdate::message(Message::user("hi")).with_value("language", "Spanish");
        let outcome = graph.invoke(first, &config).await.unwrap();
        assert_eq!(outcome.last_message().unwrap().text(), "Spanish");

        // Omitted value persists on the thread
        let outcome = graph.invoke(Message::user("again"), &config).await.unwrap();
        assert_eq!(outcome.last_message().unwrap().text(), "Spanish");
    }

    #[tokio::test]
    async fn test_conditional_loop_and_recursion_limit() {
        let mut graph = StateGraph::new();
        graph
            .add_node(
                "count",
                node_fn(|_state: GraphState| async { Ok(StateUpdate::message(Message::assistant("tick"))) }),
            )
            .add_edge(START, "count")
            .add_conditional_edges(
                "count",
                |state: &GraphState| {
                    if state.messages.len() < 4 {
                        "count".to_string()
                    } else {
                        END.to_string()
                    }
                },
                ["count", END],
            );
        let graph = graph.compile().unwrap();

        let outcome = graph.invoke(Message::user("go"), &RunConfig::new()).await.unwrap();
        assert_eq!(outcome.state().messages.len(), 4);

        let err = graph
            .invoke(Message::user("go"), &RunConfig::new().with_recursion_limit(2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RecursionLimit(2)));
    }

    #[tokio::test]
    async fn test_router_outside_targets_fails() {
        let mut graph = StateGraph::new();
        graph
            .add_node("a", node_fn(|_s: GraphState| async { Ok(StateUpdate::new()) }))
            .add_edge(START, "a")
            .add_conditional_edges("a", |_: &GraphState| "nowhere".to_string(), [END]);
        let err = graph
            .compile()
            .unwrap()
            .invoke(Message::user("go"), &RunConfig::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }

    #[tokio::test]
    async fn test_interrupt_and_resume() {
        let graph = ask_graph();
        let config = RunConfig::thread("hitl");

        let outcome = graph.invoke(Message::user("help"), &config).await.unwrap();
        let interrupt = outcome.interrupt().unwrap();
        assert_eq!(interrupt.node, "ask");
        assert_eq!(interrupt.value, json!({"query": "name?"}));

        let snapshot = graph.get_state(&config).await.unwrap().unwrap();
        assert_eq!(snapshot.next.as_deref(), Some("ask"));
        assert!(snapshot.pending_interrupt.is_some());

        let outcome = graph
            .invoke(GraphInput::Resume(json!({"data": "Ada"})), &config)
            .await
            .unwrap();
        assert!(!outcome.is_interrupted());
        assert_eq!(outcome.last_message().unwrap().text(), "Ada");

        let snapshot = graph.get_state(&config).await.unwrap().unwrap();
        assert!(snapshot.pending_interrupt.is_none());
        assert_eq!(snapshot.next, None);
    }

    #[tokio::test]
    async fn test_resume_without_pending_interrupt() {
        let graph = ask_graph();
        let err = graph
            .invoke(GraphInput::Resume(json!({"data": "x"})), &RunConfig::thread("fresh"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoPendingInterrupt(ref t) if t == "fresh"));
    }

    #[tokio::test]
    async fn test_new_input_discards_pending_interrupt() {
        let graph = ask_graph();
        let config = RunConfig::thread("hitl");
        graph.invoke(Message::user("help"), &config).await.unwrap();

        // Starts over from the entry point and pauses again
        let outcome = graph.invoke(Message::user("never mind"), &config).await.unwrap();
        assert!(outcome.is_interrupted());
        assert_eq!(outcome.state().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_stream_values_and_updates() {
        let graph = echo_graph(None);

        let events: Vec<GraphEvent> = graph
            .stream(Message::user("hi"), RunConfig::new(), StreamMode::Values)
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], GraphEvent::Values { state } if state.messages.len() == 2));

        let events: Vec<GraphEvent> = graph
            .stream(Message::user("hi"), RunConfig::new(), StreamMode::Updates)
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], GraphEvent::Updates { node, .. } if node == "model"));
    }

    #[tokio::test]
    async fn test_stream_reports_interrupt_and_errors() {
        let events: Vec<GraphEvent> = ask_graph()
            .stream(Message::user("help"), RunConfig::thread("s"), StreamMode::Messages)
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_terminal());
        assert!(matches!(&events[0], GraphEvent::Interrupt { .. }));

        let events: Vec<GraphEvent> = ask_graph()
            .stream(Message::user("help"), RunConfig::new(), StreamMode::Values)
            .collect()
            .await;
        assert!(matches!(events.last(), Some(GraphEvent::Error { .. })));
    }

    #[test]
    fn test_draw_mermaid() {
        let mut graph = StateGraph::new();
        graph
            .add_node("chatbot", node_fn(|_s: GraphState| async { Ok(StateUpdate::new()) }))
            .add_node("tools", node_fn(|_s: GraphState| async { Ok(StateUpdate::new()) }))
            .add_edge(START, "chatbot")
            .add_conditional_edges("chatbot", |_: &GraphState| END.to_string(), ["tools", END])
            .add_edge("tools", "chatbot");
        let diagram = graph.compile().unwrap().draw_mermaid();

        assert!(diagram.starts_with("graph TD;\n"));
        assert!(diagram.contains("\t__start__ --> chatbot;\n"));
        assert!(diagram.contains("\tchatbot -.-> tools;\n"));
        assert!(diagram.contains("\tchatbot -.-> __end__;\n"));
        assert!(diagram.contains("\ttools --> chatbot;\n"));
    }
}
