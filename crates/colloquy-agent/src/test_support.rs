//! Scripted provider used by unit tests

use std::collections::VecDeque;
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use colloquy_ai::providers::LlmProvider;
use colloquy_ai::stream::{MessageEvent, MessageEventStream};
use colloquy_ai::{
    AssistantMetadata, Content, Context, Message, Model, Provider, StopReason, StreamOptions,
    Usage,
};
use parking_lot::Mutex;

use crate::model::ChatModel;

pub(crate) enum Reply {
    Message(Message),
    RateLimited,
    Fatal,
}

/// Replays queued replies and records every context it was asked about
#[derive(Default)]
pub(crate) struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    pub(crate) requests: Mutex<Vec<Context>>,
}

impl ScriptedProvider {
    pub(crate) fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn texts(texts: &[&str]) -> Arc<Self> {
        Self::new(texts.iter().map(|t| Reply::Message(assistant_text(t))))
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub(crate) fn last_request(&self) -> Context {
        self.requests.lock().last().cloned().expect("no requests")
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn stream(
        &self,
        _model: &Model,
        context: &Context,
        _options: &StreamOptions,
    ) -> colloquy_ai::Result<MessageEventStream> {
        self.requests.lock().push(context.clone());
        let reply = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Reply::Message(assistant_text("(script exhausted)")));
        let message = match reply {
            Reply::Message(m) => m,
            Reply::RateLimited => return Err(colloquy_ai::Error::RateLimited { retry_after: None }),
            Reply::Fatal => return Err(colloquy_ai::Error::InvalidApiKey),
        };

        Ok(Box::pin(stream! {
            yield MessageEvent::Start { message: Message::Assistant { content: vec![], metadata: AssistantMetadata::default() } };
            for c in message.content() {
                if let Content::Text { text } = c {
                    for word in text.split_inclusive(' ') {
                        yield MessageEvent::TextDelta { content_index: 0, delta: word.to_string() };
                    }
                }
            }
            let stop_reason = if message.has_tool_calls() { StopReason::ToolUse } else { StopReason::Stop };
            yield MessageEvent::Done { message, stop_reason, usage: Usage { input: 10, output: 5 } };
        }))
    }
}

pub(crate) fn test_model() -> Model {
    colloquy_ai::models::resolve_model(Provider::OpenAI, "gpt-4o-mini")
}

pub(crate) fn chat_model(provider: Arc<ScriptedProvider>) -> ChatModel {
    ChatModel::new(provider, test_model())
}

pub(crate) fn assistant_text(text: &str) -> Message {
    Message::assistant(text)
}

pub(crate) fn assistant_tool_call(id: &str, name: &str, arguments: serde_json::Value) -> Message {
    Message::Assistant {
        content: vec![Content::tool_call(id, name, arguments)],
        metadata: AssistantMetadata::default(),
    }
}
