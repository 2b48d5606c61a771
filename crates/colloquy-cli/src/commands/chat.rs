use std::io::{BufRead, Write};
use std::sync::Arc;

use clap::ValueEnum;
use colloquy_agent::{
    ApproxTokenCounter, ChatModel, ChatModelNode, Checkpointer, CompiledGraph, GraphEvent,
    MemorySaver, RunConfig, StateUpdate, StreamMode, TrimConfig, Trimmer, chat_graph,
};
use colloquy_ai::{ChatPromptTemplate, Message, PromptPart};

use super::drain;
use crate::app::App;
use crate::repl::Repl;

pub const PIRATE_PROMPT: &str =
    "You are a helpful assistant who sounds like a pirate. Answer all questions to the best of your ability.";
pub const LANGUAGE_PROMPT: &str =
    "You are a helpful assistant. Answer all questions to the best of your ability in {language}.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Persona {
    Pirate,
    Assistant,
}

/// START -> model -> END, trimming the history to `max_tokens`.
///
/// Without `memory` every turn starts from an empty history.
pub fn build_graph(
    model: ChatModel,
    system_prompt: &str,
    max_tokens: u32,
    memory: bool,
) -> anyhow::Result<CompiledGraph> {
    let prompt = ChatPromptTemplate::from_messages([
        PromptPart::System(system_prompt.to_string()),
        PromptPart::Placeholder("messages".into()),
    ]);
    let trimmer = Trimmer::new(
        TrimConfig::last(max_tokens)
            .include_system(true)
            .start_on("user"),
        Arc::new(ApproxTokenCounter),
    );
    let node = ChatModelNode::new(model)
        .with_prompt(prompt)
        .with_trimmer(trimmer);
    let checkpointer: Option<Arc<dyn Checkpointer>> = if memory {
        Some(Arc::new(MemorySaver::new()))
    } else {
        None
    };
    Ok(chat_graph(node, checkpointer)?)
}

/// One reply per user turn until the REPL ends.
///
/// A failed turn is replaced by the fallback question once; a second failure
/// is returned.
pub async fn converse<R: BufRead, W: Write>(
    graph: &CompiledGraph,
    repl: &mut Repl<R, W>,
    config: &RunConfig,
    language: &str,
    stream: bool,
) -> anyhow::Result<()> {
    while let Some(line) = repl.next_turn()? {
        if let Err(e) = reply(graph, repl, config, language, stream, line).await {
            tracing::warn!("turn failed: {:#}", e);
            if stream {
                writeln!(repl.output())?;
            }
            match repl.fallback()? {
                Some(question) => reply(graph, repl, config, language, stream, question).await?,
                None => return Err(e),
            }
        }
    }
    Ok(())
}

async fn reply<R: BufRead, W: Write>(
    graph: &CompiledGraph,
    repl: &mut Repl<R, W>,
    config: &RunConfig,
    language: &str,
    stream: bool,
    line: String,
) -> anyhow::Result<()> {
    let input = StateUpdate::message(Message::user(line)).with_value("language", language);

    if stream {
        write!(repl.output(), "Assistant: ")?;
        let events = graph.stream(input, config.clone(), StreamMode::Messages);
        drain(events, repl.output(), |out, event| {
            if let GraphEvent::MessageDelta { delta, .. } = event {
                write!(out, "{}", delta)?;
                out.flush()?;
            }
            Ok(())
        })
        .await?;
        writeln!(repl.output())?;
    } else {
        let outcome = graph.invoke(input, config).await?;
        if let Some(reply) = outcome.last_message() {
            writeln!(repl.output(), "Assistant: {}", reply.text())?;
        }
    }
    Ok(())
}

pub async fn run(
    app: &App,
    language: &str,
    persona: Persona,
    stream: bool,
    memory: bool,
) -> anyhow::Result<()> {
    let system_prompt = match persona {
        Persona::Pirate => PIRATE_PROMPT,
        Persona::Assistant => app.config.system_prompt.as_deref().unwrap_or(LANGUAGE_PROMPT),
    };
    let max_tokens = app.config.trim_max_tokens();
    let graph = build_graph(app.chat_model()?, system_prompt, max_tokens, memory)?;
    let config = app.run_config("abc123");

    converse(&graph, &mut Repl::stdio(), &config, language, stream).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repl::FALLBACK_QUESTION;
    use crate::test_support::{CannedProvider, chat_model};
    use std::io::Cursor;

    fn repl(input: &str) -> Repl<Cursor<Vec<u8>>, Vec<u8>> {
        Repl::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[tokio::test]
    async fn test_thread_remembers_previous_turns() {
        let provider = CannedProvider::new([
            Message::assistant("Hola Sushant!"),
            Message::assistant("Te llamas Sushant."),
        ]);
        let graph = build_graph(chat_model(provider.clone()), LANGUAGE_PROMPT, 65, true).unwrap();
        let mut repl = repl("Hi! I'm Sushant\nWhat's my name?\nexit\n");

        converse(&graph, &mut repl, &RunConfig::thread("abc456"), "Spanish", false)
            .await
            .unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1].system_prompt.as_deref(),
            Some("You are a helpful assistant. Answer all questions to the best of your ability in Spanish.")
        );
        let texts: Vec<String> = requests[1].messages.iter().map(Message::text).collect();
        assert_eq!(texts, vec!["Hi! I'm Sushant", "Hola Sushant!", "What's my name?"]);

        let printed = String::from_utf8(repl.output().clone()).unwrap();
        assert!(printed.contains("Assistant: Te llamas Sushant.\n"));
        assert!(printed.ends_with("Goodbye!\n"));
    }

    #[tokio::test]
    async fn test_streamed_reply_is_printed() {
        let provider = CannedProvider::new([Message::assistant("Arr, a joke!")]);
        let graph = build_graph(chat_model(provider), PIRATE_PROMPT, 65, true).unwrap();
        let mut repl = repl("Tell me a joke\n");

        converse(&graph, &mut repl, &RunConfig::thread("abc678"), "English", true)
            .await
            .unwrap();

        let printed = String::from_utf8(repl.output().clone()).unwrap();
        assert!(printed.contains("Assistant: Arr, a joke!\n"));
    }

    #[tokio::test]
    async fn test_long_history_is_trimmed() {
        let replies = (0..6).map(|i| Message::assistant(format!("reply number {}", i)));
        let provider = CannedProvider::new(replies);
        let graph = build_graph(chat_model(provider.clone()), PIRATE_PROMPT, 30, true).unwrap();
        let mut input: String = (0..6).map(|i| format!("question number {}\n", i)).collect();
        input.push_str("q\n");

        converse(&graph, &mut repl(&input), &RunConfig::thread("t"), "English", false)
            .await
            .unwrap();

        let last = provider.requests().pop().unwrap();
        assert!(last.messages.len() < 11);
        assert_eq!(last.messages[0].role(), "user");
        assert_eq!(last.messages.last().unwrap().text(), "question number 5");
    }

    #[tokio::test]
    async fn test_end_of_input_asks_fallback_question() {
        let provider = CannedProvider::new([
            Message::assistant("Hello!"),
            Message::assistant("LangGraph builds stateful agents."),
        ]);
        let graph = build_graph(chat_model(provider.clone()), PIRATE_PROMPT, 65, true).unwrap();
        let mut repl = repl("hi\n");

        converse(&graph, &mut repl, &RunConfig::thread("abc123"), "English", false)
            .await
            .unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages.last().unwrap().text(), FALLBACK_QUESTION);
        let printed = String::from_utf8(repl.output().clone()).unwrap();
        assert!(printed.ends_with("Assistant: LangGraph builds stateful agents.\n"));
    }

    #[tokio::test]
    async fn test_failed_turn_asks_fallback_question_then_ends() {
        // The first request fails on the bad prompt variable; the fallback
        // turn fails the same way and is reported
        let provider = CannedProvider::new([]);
        let graph = build_graph(chat_model(provider.clone()), "Answer in {dialect}.", 65, true).unwrap();
        let mut repl = repl("hi\nnever read\n");

        let err = converse(&graph, &mut repl, &RunConfig::thread("abc123"), "English", false)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("dialect"), "{}", err);
        assert!(provider.requests().is_empty());
        let printed = String::from_utf8(repl.output().clone()).unwrap();
        assert_eq!(printed, format!("User: User: {}\n", FALLBACK_QUESTION));
    }

    #[tokio::test]
    async fn test_without_memory_turns_are_independent() {
        let provider = CannedProvider::new([
            Message::assistant("Hello Sushant!"),
            Message::assistant("I don't know your name."),
        ]);
        let graph = build_graph(chat_model(provider.clone()), PIRATE_PROMPT, 65, false).unwrap();
        let mut repl = repl("Hi! I'm Sushant\nWhat's my name?\nq\n");

        converse(&graph, &mut repl, &RunConfig::thread("abc123"), "English", false)
            .await
            .unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        let texts: Vec<String> = requests[1].messages.iter().map(Message::text).collect();
        assert_eq!(texts, vec!["What's my name?"]);
    }
}
