use std::io::{BufRead, Write};
use std::sync::Arc;

use colloquy_agent::{
    ChatModel, ChatModelNode, CompiledGraph, GraphEvent, GraphInput, MemorySaver, RunConfig,
    StateUpdate, StreamMode, ToolRegistry, tool_calling_graph,
};
use colloquy_ai::Message;
use serde_json::json;

use super::drain;
use crate::app::App;
use crate::repl::Repl;
use crate::tools::HumanAssistanceTool;

/// "chatbot" <-> "tools" with memory.
///
/// At most one tool call per reply, so a resumed step never repeats a call.
pub fn build_graph(model: &ChatModel, tools: Arc<ToolRegistry>) -> anyhow::Result<CompiledGraph> {
    let node = ChatModelNode::new(model.bind_tools(&tools)).with_max_tool_calls(1);
    Ok(tool_calling_graph(
        "chatbot",
        node,
        tools,
        Some(Arc::new(MemorySaver::new())),
    )?)
}

/// Chat turns; an interrupt asks the operator and resumes with `{"data": answer}`.
///
/// A failed turn is replaced by the fallback question once.
pub async fn converse<R: BufRead, W: Write>(
    graph: &CompiledGraph,
    repl: &mut Repl<R, W>,
    config: &RunConfig,
) -> anyhow::Result<()> {
    while let Some(line) = repl.next_turn()? {
        let answered = match turn(graph, repl, config, line).await {
            Ok(answered) => answered,
            Err(e) => {
                tracing::warn!("turn failed: {:#}", e);
                match repl.fallback()? {
                    Some(question) => turn(graph, repl, config, question).await?,
                    None => return Err(e),
                }
            }
        };
        if !answered {
            break;
        }
    }
    Ok(())
}

/// Run one user turn to completion; `false` when the operator gave no answer
async fn turn<R: BufRead, W: Write>(
    graph: &CompiledGraph,
    repl: &mut Repl<R, W>,
    config: &RunConfig,
    line: String,
) -> anyhow::Result<bool> {
    let mut input = GraphInput::from(StateUpdate::message(Message::user(line)));

    loop {
        let events = graph.stream(input, config.clone(), StreamMode::Values);
        let interrupt = drain(events, repl.output(), |out, event| {
            if let GraphEvent::Values { state } = event {
                if let Some(message) = state.last_message() {
                    writeln!(out, "{}", message.pretty())?;
                }
            }
            Ok(())
        })
        .await?;

        let Some(interrupt) = interrupt else {
            return Ok(true);
        };
        let query = match interrupt.value.get("query").and_then(|q| q.as_str()) {
            Some(q) => q.to_string(),
            None => interrupt.value.to_string(),
        };
        writeln!(repl.output(), "Human assistance requested: {}", query)?;

        match repl.ask("Expert: ")? {
            Some(answer) => input = GraphInput::Resume(json!({ "data": answer })),
            None => {
                tracing::warn!("no answer given; thread left waiting for human input");
                return Ok(false);
            }
        }
    }
}

pub async fn run(app: &App) -> anyhow::Result<()> {
    if app.config.get_api_key("tavily").is_none() {
        tracing::warn!("TAVILY_API_KEY is not set; web searches will fail");
    }
    let tools = ToolRegistry::new()
        .with(app.search_tool())
        .with(HumanAssistanceTool::new());
    let graph = build_graph(&app.chat_model()?, Arc::new(tools))?;
    let config = app.run_config("123");

    converse(&graph, &mut Repl::stdio(), &config).await
}
