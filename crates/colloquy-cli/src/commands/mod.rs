//! Subcommands, one demo each

mod agent;
mod chat;
mod graph;
mod react;
mod search;
mod support;
mod translate;

use clap::Subcommand;
use colloquy_agent::{GraphEvent, GraphEventStream};
use tokio_stream::StreamExt;
use std::io::Write;

use crate::app::App;

pub use chat::Persona;
pub use graph::Demo;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Translate text with a prompt template
    Translate {
        /// Target language
        #[arg(short, long, default_value = "italian")]
        language: String,
        /// Text to translate
        #[arg(default_value = "hi")]
        text: Vec<String>,
        /// Also print the response metadata (model, token usage, stop reason)
        #[arg(long)]
        metadata: bool,
    },

    /// Chat with memory, history trimming and token streaming
    Chat {
        /// Language the assistant answers in
        #[arg(short, long, default_value = "English")]
        language: String,
        #[arg(long, value_enum, default_value_t = Persona::Assistant)]
        persona: Persona,
        /// Print whole replies instead of streaming tokens
        #[arg(long)]
        no_stream: bool,
        /// Forget each turn instead of keeping the thread's history
        #[arg(long)]
        no_memory: bool,
    },

    /// Tool-calling agent with web search and memory
    Agent {
        /// Ask once and exit; without a query an interactive session starts
        query: Vec<String>,
        /// Show the tool calls the model requests without running them
        #[arg(long)]
        plan: bool,
    },

    /// Support chatbot that can ask a human expert for help
    Support,

    /// Thought/Action/Observation agent with the system clock tool
    React {
        #[arg(default_value = "What is the current time in Auckland considering you are in India? Just show the time not date.")]
        query: Vec<String>,
    },

    /// Run the web search tool directly
    Search {
        #[arg(required = true)]
        query: Vec<String>,
    },

    /// Print a demo graph as a Mermaid diagram
    Graph {
        #[arg(value_enum, default_value_t = Demo::Support)]
        demo: Demo,
    },
}

pub async fn run(app: &App, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Translate {
            language,
            text,
            metadata,
        } => translate::run(app, &language, &text.join(" "), metadata).await,
        Command::Chat {
            language,
            persona,
            no_stream,
            no_memory,
        } => chat::run(app, &language, persona, !no_stream, !no_memory).await,
        Command::Agent { query, plan } => agent::run(app, &query.join(" "), plan).await,
        Command::Support => support::run(app).await,
        Command::React { query } => react::run(app, &query.join(" ")).await,
        Command::Search { query } => search::run(app, &query.join(" ")).await,
        Command::Graph { demo } => graph::run(app, demo),
    }
}

/// Drain a graph stream, handing each event to `on_event`.
///
/// Returns the interrupt that paused the run, if any; a stream error fails.
pub(crate) async fn drain<W, F>(
    mut events: GraphEventStream,
    out: &mut W,
    mut on_event: F,
) -> anyhow::Result<Option<colloquy_agent::Interrupt>>
where
    W: Write,
    F: FnMut(&mut W, GraphEvent) -> std::io::Result<()>,
{
    let mut interrupt = None;
    while let Some(event) = events.next().await {
        match event {
            GraphEvent::Error { message } => anyhow::bail!(message),
            GraphEvent::Interrupt { interrupt: i } => interrupt = Some(i),
            other => on_event(out, other)?,
        }
    }
    Ok(interrupt)
}
