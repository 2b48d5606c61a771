//! Canned model replies for command tests

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use colloquy_agent::ChatModel;
use colloquy_ai::providers::LlmProvider;
use colloquy_ai::stream::{MessageEvent, MessageEventStream};
use colloquy_ai::{
    AssistantMetadata, Content, Context, Message, Model, Provider, StopReason, StreamOptions, Usage,
};
use futures::StreamExt;
use std::sync::Mutex;

/// Answers each request with the next queued message
#[derive(Default)]
pub(crate) struct CannedProvider {
    replies: Mutex<VecDeque<Message>>,
    pub(crate) requests: Mutex<Vec<Context>>,
}

impl CannedProvider {
    pub(crate) fn new(replies: impl IntoIterator<Item = Message>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn requests(&self) -> Vec<Context> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for CannedProvider {
    async fn stream(
        &self,
        _model: &Model,
        context: &Context,
        _options: &StreamOptions,
    ) -> colloquy_ai::Result<MessageEventStream> {
        self.requests.lock().unwrap().push(context.clone());
        let message = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Message::assistant("(no more replies)"));

        let mut events = vec![MessageEvent::Start {
            message: Message::Assistant {
                content: vec![],
                metadata: AssistantMetadata::default(),
            },
        }];
        for text in message.content().iter().filter_map(|c| c.as_text()) {
            events.push(MessageEvent::TextDelta {
                content_index: 0,
                delta: text.to_string(),
            });
        }
        let stop_reason = if message.has_tool_calls() {
            StopReason::ToolUse
        } else {
            StopReason::Stop
        };
        events.push(MessageEvent::Done {
            message,
            stop_reason,
            usage: Usage::default(),
        });
        Ok(futures::stream::iter(events).boxed())
    }
}

pub(crate) fn chat_model(provider: Arc<CannedProvider>) -> ChatModel {
    ChatModel::new(
        provider,
        colloquy_ai::models::resolve_model(Provider::OpenAI, "gpt-4o-mini"),
    )
}

pub(crate) fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> Message {
    Message::Assistant {
        content: vec![Content::tool_call(id, name, arguments)],
        metadata: AssistantMetadata::default(),
    }
}
