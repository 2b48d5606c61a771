use std::io::Write;
use std::sync::Arc;

use colloquy_agent::{
    ChatModel, CompiledGraph, GraphEvent, MemorySaver, RunConfig, StateUpdate, StreamMode,
    ToolRegistry, create_react_agent,
};
use colloquy_ai::Message;

use super::drain;
use crate::app::App;
use crate::repl::Repl;

/// "agent" <-> "tools" loop over `tools`, remembering each thread
pub fn build_graph(model: &ChatModel, tools: ToolRegistry) -> anyhow::Result<CompiledGraph> {
    Ok(create_react_agent(
        model,
        Arc::new(tools),
        Some(Arc::new(MemorySaver::new())),
    )?)
}

/// Stream one user turn, printing every node's new messages
pub async fn ask<W: Write>(
    graph: &CompiledGraph,
    config: &RunConfig,
    query: &str,
    out: &mut W,
) -> anyhow::Result<()> {
    let events = graph.stream(
        StateUpdate::message(Message::user(query)),
        config.clone(),
        StreamMode::Updates,
    );
    drain(events, out, |out, event| {
        if let GraphEvent::Updates { node, update } = event {
            tracing::debug!("node '{}' added {} messages", node, update.messages.len());
            for message in &update.messages {
                writeln!(out, "{}", message.pretty())?;
            }
            writeln!(out, "----")?;
        }
        Ok(())
    })
    .await?;
    Ok(())
}

/// Ask the tool-bound model once and print the tool calls it requests without running them
pub async fn plan<W: Write>(
    model: &ChatModel,
    tools: &ToolRegistry,
    query: &str,
    out: &mut W,
) -> anyhow::Result<()> {
    let reply = model.bind_tools(tools).invoke(&[Message::user(query)]).await?;
    writeln!(out, "Content String : {}", reply.text())?;
    writeln!(out, "Tool Calls : {}", serde_json::to_string(&reply.tool_calls())?)?;
    Ok(())
}

pub async fn run(app: &App, query: &str, plan_only: bool) -> anyhow::Result<()> {
    let search = app.search_tool();
    if app.config.get_api_key("tavily").is_none() {
        tracing::warn!("TAVILY_API_KEY is not set; web searches will fail");
    }
    let tools = ToolRegistry::new().with(search);
    let model = app.chat_model()?;

    if plan_only {
        anyhow::ensure!(!query.trim().is_empty(), "--plan needs a query");
        return plan(&model, &tools, query, &mut std::io::stdout()).await;
    }

    let graph = build_graph(&model, tools)?;
    let config = app.run_config("abc123");

    if !query.trim().is_empty() {
        return ask(&graph, &config, query, &mut std::io::stdout()).await;
    }

    let mut repl = Repl::stdio();
    while let Some(line) = repl.next_turn()? {
        if let Err(e) = ask(&graph, &config, &line, repl.output()).await {
            tracing::warn!("turn failed: {:#}", e);
            match repl.fallback()? {
                Some(question) => ask(&graph, &config, &question, repl.output()).await?,
                None => return Err(e),
            }
        }
    }
    Ok(())
}
