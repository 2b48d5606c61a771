use std::sync::Arc;

use clap::ValueEnum;
use colloquy_agent::{ChatModel, CompiledGraph, ToolRegistry};
use colloquy_ai::providers::openai::OpenAIProvider;

use super::{agent, chat, support};
use crate::app::App;
use crate::tools::{HumanAssistanceTool, TavilySearchTool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    Chat,
    Agent,
    Support,
}

pub fn demo_graph(demo: Demo, model: &ChatModel) -> anyhow::Result<CompiledGraph> {
    let search = || TavilySearchTool::new(None, 2);
    match demo {
        Demo::Chat => chat::build_graph(model.clone(), chat::LANGUAGE_PROMPT, 65, true),
        Demo::Agent => agent::build_graph(model, ToolRegistry::new().with(search())),
        Demo::Support => {
            let tools = ToolRegistry::new()
                .with(search())
                .with(HumanAssistanceTool::new());
            support::build_graph(model, Arc::new(tools))
        }
    }
}

pub fn run(app: &App, demo: Demo) -> anyhow::Result<()> {
    // Drawing never calls the model, so no key is needed
    let model = ChatModel::new(Arc::new(OpenAIProvider::new("")), app.model.clone());
    print!("{}", demo_graph(demo, &model)?.draw_mermaid());
    Ok(())
}
