//! colloquy - chat, agent and human-in-the-loop demos over hosted language models

mod app;
mod commands;
mod config;
mod repl;
mod tools;

#[cfg(test)]
mod test_support;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

/// colloquy - conversation graphs with tools, memory and human help
#[derive(Parser, Debug)]
#[command(name = "colloquy")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Provider (openai, groq, ollama, custom)
    #[arg(short, long, global = true)]
    provider: Option<String>,

    /// Model to use (default: gpt-4o-mini, or llama-3.3-70b-versatile on groq)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Conversation thread id
    #[arg(short, long, global = true)]
    thread: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    #[command(subcommand)]
    command: Option<commands::Command>,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("colloquy=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    let args = Args::parse();
    init_tracing(args.verbose);

    if args.init_config {
        let path = config::Config::init()?;
        println!("Config file at: {}", path.display());
        println!("\nExample config:\n{}", config::example_config());
        return Ok(());
    }

    let Some(command) = args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    let cfg = config::Config::load();
    let app = app::App::new(cfg, args.provider, args.model, args.thread, args.verbose)?;
    commands::run(&app, command).await
}
