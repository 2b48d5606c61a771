//! Chat model handle: a provider, a model definition, and the tools bound to it

use std::{sync::Arc, time::Duration};

use colloquy_ai::{
    Context, Message, Model, StreamOptions,
    providers::LlmProvider,
    stream::{MessageBuilder, MessageEvent, MessageEventStream},
};
use futures::StreamExt;

use crate::{
    error::{Error, Result},
    tool::ToolRegistry,
};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No retries at all
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Check if an error message looks transient
fn is_retryable_error(error: &str) -> bool {
    // Rate limit errors
    if error.contains("429") || error.contains("rate limit") || error.contains("Rate limit") {
        return true;
    }
    // Transient network errors
    if error.contains("timeout") || error.contains("Timeout") {
        return true;
    }
    if error.contains("connection") || error.contains("Connection") {
        return true;
    }
    // Server errors (5xx)
    if error.contains("500")
        || error.contains("502")
        || error.contains("503")
        || error.contains("504")
    {
        return true;
    }
    error.contains("overloaded") || error.contains("Overloaded")
}

/// A chat model that can be invoked with a message list.
///
/// Cloning is cheap; `bind_tools` returns a new handle and leaves the original untouched.
#[derive(Clone)]
pub struct ChatModel {
    provider: Arc<dyn LlmProvider>,
    model: Model,
    options: StreamOptions,
    tools: Vec<colloquy_ai::Tool>,
    retry_config: RetryConfig,
}

impl ChatModel {
    pub fn new(provider: Arc<dyn LlmProvider>, model: Model) -> Self {
        Self {
            provider,
            model,
            options: StreamOptions::default(),
            tools: Vec::new(),
            retry_config: RetryConfig::default(),
        }
    }

    pub fn with_options(mut self, options: StreamOptions) -> Self {
        self.options = options;
        self
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Stop generating when any of these sequences appears
    pub fn with_stop(mut self, stop: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.options.stop_sequences = stop.into_iter().map(Into::into).collect();
        self
    }

    /// Return a handle that advertises the registry's tools to the model
    pub fn bind_tools(&self, tools: &ToolRegistry) -> Self {
        let mut bound = self.clone();
        bound.tools = tools.api_tools();
        bound
    }

    pub fn bound_tools(&self) -> &[colloquy_ai::Tool] {
        &self.tools
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Leading system messages become the request's system prompt
    fn build_context(&self, messages: &[Message]) -> Context {
        let split = messages
            .iter()
            .position(|m| !matches!(m, Message::System { .. }))
            .unwrap_or(messages.len());
        let (system, rest) = messages.split_at(split);

        let system_prompt = if system.is_empty() {
            None
        } else {
            Some(
                system
                    .iter()
                    .map(Message::text)
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            )
        };

        Context {
            system_prompt,
            messages: rest.to_vec(),
            tools: self.tools.clone(),
        }
    }

    /// Open a response stream, retrying transient failures
    pub async fn stream(&self, messages: &[Message]) -> Result<MessageEventStream> {
        let context = self.build_context(messages);
        let mut attempt = 0u32;

        loop {
            match self
                .provider
                .stream(&self.model, &context, &self.options)
                .await
            {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    // Check retryability: typed check + string fallback for wrapped errors
                    let error_msg = e.to_string();
                    let retryable = e.is_retryable() || is_retryable_error(&error_msg);

                    if attempt < self.retry_config.max_retries && retryable {
                        let delay = match &e {
                            colloquy_ai::Error::RateLimited {
                                retry_after: Some(secs),
                            } => Duration::from_secs(*secs).min(self.retry_config.max_delay),
                            _ => self.retry_config.delay_for_attempt(attempt),
                        };
                        tracing::warn!(
                            "Request failed (attempt {}/{}): {}. Retrying in {:?}...",
                            attempt + 1,
                            self.retry_config.max_retries + 1,
                            error_msg,
                            delay
                        );
                        attempt += 1;
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    return Err(e.into());
                }
            }
        }
    }

    /// Run the model to completion and return the assistant message
    pub async fn invoke(&self, messages: &[Message]) -> Result<Message> {
        let stream = self.stream(messages).await?;
        Ok(colloquy_ai::collect_message(stream).await?)
    }

    /// Like [`invoke`](Self::invoke), but calls `on_delta` with each text fragment as it arrives
    pub async fn invoke_streaming<F>(&self, messages: &[Message], mut on_delta: F) -> Result<Message>
    where
        F: FnMut(&str) + Send,
    {
        let mut stream = self.stream(messages).await?;
        let mut builder = MessageBuilder::new();

        while let Some(event) = stream.next().await {
            match event {
                MessageEvent::TextDelta { ref delta, .. } => {
                    on_delta(delta);
                    builder.process_event(&event);
                }
                MessageEvent::Done { message, .. } => return Ok(message),
                MessageEvent::Error { message } => {
                    return Err(Error::Ai(colloquy_ai::Error::Sse(message)));
                }
                other => builder.process_event(&other),
            }
        }

        if builder.is_empty() {
            return Err(Error::Ai(colloquy_ai::Error::UnexpectedResponse(
                "stream ended without a response".into(),
            )));
        }
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Reply, ScriptedProvider, assistant_text, chat_model};

    fn fast_retries() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_backoff_is_capped() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(60));
    }

    #[test]
    fn test_retryable_error_strings() {
        assert!(is_retryable_error("HTTP 503 Service Unavailable"));
        assert!(is_retryable_error("connection reset by peer"));
        assert!(is_retryable_error("model is overloaded"));
        assert!(!is_retryable_error("Invalid or missing API key"));
    }

    #[test]
    fn test_leading_system_messages_become_system_prompt() {
        let model = chat_model(ScriptedProvider::texts(&[]));
        let context = model.build_context(&[
            Message::system("Translate the following into italian:"),
            Message::user("hi"),
        ]);
        assert_eq!(
            context.system_prompt.as_deref(),
            Some("Translate the following into italian:")
        );
        assert_eq!(context.messages.len(), 1);
        assert_eq!(context.messages[0].role(), "user");
    }

    #[tokio::test]
    async fn test_invoke_returns_assistant_message() {
        let provider = ScriptedProvider::texts(&["Ciao!"]);
        let model = chat_model(provider.clone());
        let reply = model.invoke(&[Message::user("hi")]).await.unwrap();
        assert_eq!(reply.text(), "Ciao!");
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test]
    async fn test_invoke_streaming_forwards_deltas() {
        let model = chat_model(ScriptedProvider::texts(&["Hello there Bob"]));
        let mut deltas = Vec::new();
        let reply = model
            .invoke_streaming(&[Message::user("hi")], |d| deltas.push(d.to_string()))
            .await
            .unwrap();
        assert_eq!(deltas.concat(), "Hello there Bob");
        assert!(deltas.len() > 1);
        assert_eq!(reply.text(), "Hello there Bob");
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let provider = ScriptedProvider::new([
            Reply::RateLimited,
            Reply::Message(assistant_text("finally")),
        ]);
        let model = chat_model(provider.clone()).with_retry_config(fast_retries());
        let reply = model.invoke(&[Message::user("hi")]).await.unwrap();
        assert_eq!(reply.text(), "finally");
        assert_eq!(provider.request_count(), 2);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let provider = ScriptedProvider::new([Reply::Fatal, Reply::Message(assistant_text("no"))]);
        let model = chat_model(provider.clone()).with_retry_config(fast_retries());
        let err = model.invoke(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, Error::Ai(colloquy_ai::Error::InvalidApiKey)));
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let provider = ScriptedProvider::new([
            Reply::RateLimited,
            Reply::RateLimited,
            Reply::RateLimited,
        ]);
        let model = chat_model(provider.clone()).with_retry_config(fast_retries());
        assert!(model.invoke(&[Message::user("hi")]).await.is_err());
        assert_eq!(provider.request_count(), 3);
    }

    #[tokio::test]
    async fn test_bind_tools_leaves_original_untouched() {
        use crate::tool::{Tool, ToolResult};
        use async_trait::async_trait;
        use tokio_util::sync::CancellationToken;

        struct Noop;
        #[async_trait]
        impl Tool for Noop {
            fn name(&self) -> &str {
                "noop"
            }
            fn description(&self) -> &str {
                "does nothing"
            }
            fn parameters_schema(&self) -> serde_json::Value {
                serde_json::json!({"type": "object"})
            }
            async fn execute(&self, _: &str, _: serde_json::Value, _: CancellationToken) -> ToolResult {
                ToolResult::text("")
            }
        }

        let provider = ScriptedProvider::texts(&["ok"]);
        let base = chat_model(provider.clone());
        let bound = base.bind_tools(&ToolRegistry::new().with(Noop));
        assert!(base.bound_tools().is_empty());
        assert_eq!(bound.bound_tools()[0].name, "noop");

        bound.invoke(&[Message::user("hi")]).await.unwrap();
        assert_eq!(provider.last_request().tools.len(), 1);
    }
}
