use std::io::Write;

use colloquy_agent::ChatModel;
use colloquy_ai::{ChatPromptTemplate, Message, PromptPart, PromptValues};

use crate::app::App;

pub fn translation_prompt() -> ChatPromptTemplate {
    ChatPromptTemplate::from_messages([
        PromptPart::System("Translate the following into {language}:".into()),
        PromptPart::User("{text}".into()),
    ])
}

pub async fn translate(model: &ChatModel, language: &str, text: &str) -> anyhow::Result<Message> {
    let messages = translation_prompt().invoke(
        &PromptValues::new()
            .var("language", language)
            .var("text", text),
    )?;
    Ok(model.invoke(&messages).await?)
}

/// Reply text, followed by the response metadata as JSON when asked for
pub fn print_reply<W: Write>(out: &mut W, reply: &Message, metadata: bool) -> anyhow::Result<()> {
    writeln!(out, "{}", reply.text())?;
    if !metadata {
        return Ok(());
    }
    if let Message::Assistant { metadata, .. } = reply {
        writeln!(out, "{}", serde_json::to_string_pretty(metadata)?)?;
    }
    Ok(())
}

pub async fn run(app: &App, language: &str, text: &str, metadata: bool) -> anyhow::Result<()> {
    let model = app.chat_model()?;
    let reply = translate(&model, language, text).await?;
    print_reply(&mut std::io::stdout(), &reply, metadata)
}
