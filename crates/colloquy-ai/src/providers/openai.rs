//! OpenAI Chat Completions API provider
//!
//! Groq and Ollama expose the same wire format, so this provider serves all of them;
//! only the base URL and API key differ.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

use super::LlmProvider;
use crate::{
    error::{Error, Result},
    stream::{MessageEvent, MessageEventStream},
    types::{
        AssistantMetadata, Content, Context, Message, Model, Provider, StopReason,
        StreamOptions, Usage,
    },
};

/// OpenAI-compatible API client
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
}

impl OpenAIProvider {
    /// Create a new provider with an API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }

    /// Create from the provider's API key environment variable
    pub fn from_env(provider: Provider) -> Result<Self> {
        match provider.api_key_env_var() {
            Some(var) => Ok(Self::new(super::get_api_key(None, var)?)),
            // Local endpoints accept any bearer token
            None => Ok(Self::new("none")),
        }
    }

    fn build_request(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> OpenAIRequest {
        let mut messages = Vec::new();

        if let Some(ref system_prompt) = context.system_prompt {
            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: Some(system_prompt.clone()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for msg in &context.messages {
            messages.push(convert_message(msg));
        }

        let tools = if context.tools.is_empty() {
            None
        } else {
            Some(
                context
                    .tools
                    .iter()
                    .map(|t| OpenAITool {
                        tool_type: "function".to_string(),
                        function: OpenAIFunction {
                            name: t.name.clone(),
                            description: Some(t.description.clone()),
                            parameters: Some(t.parameters.clone()),
                        },
                    })
                    .collect(),
            )
        };

        let has_tools = tools.is_some();
        OpenAIRequest {
            model: model.id.clone(),
            messages,
            stream: true,
            stream_options: (model.provider == Provider::OpenAI)
                .then_some(OpenAIStreamOptions { include_usage: true }),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stop: if options.stop_sequences.is_empty() {
                None
            } else {
                Some(options.stop_sequences.clone())
            },
            tools,
            tool_choice: if has_tools {
                Some(serde_json::json!("auto"))
            } else {
                None
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    async fn stream(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> Result<MessageEventStream> {
        let request = self.build_request(model, context, options);
        let url = format!("{}/chat/completions", model.base_url.trim_end_matches('/'));

        let mut request_builder = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request);

        for (key, value) in &model.headers {
            request_builder = request_builder.header(key.as_str(), value.as_str());
        }

        tracing::debug!(
            model = %model.id,
            messages = request.messages.len(),
            "sending chat completion request"
        );

        let mut event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        // Surface HTTP failures as errors before handing out the stream so callers can retry
        let first = match event_source.next().await {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                event_source.close();
                return Err(map_sse_error(e).await);
            }
            None => {
                return Err(Error::UnexpectedResponse(
                    "event stream closed before opening".into(),
                ));
            }
        };

        Ok(Box::pin(create_stream(event_source, first, model.clone())))
    }
}

/// Translate an event-source failure into a typed error, reading the body when there is one.
async fn map_sse_error(error: reqwest_eventsource::Error) -> Error {
    match error {
        reqwest_eventsource::Error::InvalidStatusCode(status, response) => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            status_error(status, &body, retry_after)
        }
        reqwest_eventsource::Error::Transport(e) => Error::Http(e),
        other => Error::Sse(other.to_string()),
    }
}

fn status_error(status: StatusCode, body: &str, retry_after: Option<u64>) -> Error {
    if status == StatusCode::UNAUTHORIZED {
        return Error::InvalidApiKey;
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Error::RateLimited { retry_after };
    }

    match serde_json::from_str::<OpenAIErrorResponse>(body) {
        Ok(parsed) => Error::api(
            parsed
                .error
                .error_type
                .unwrap_or_else(|| format!("http_{}", status.as_u16())),
            parsed.error.message,
        ),
        Err(_) => Error::api(format!("http_{}", status.as_u16()), body.to_string()),
    }
}

fn convert_message(msg: &Message) -> OpenAIMessage {
    match msg {
        Message::System { .. } => OpenAIMessage {
            role: "system".to_string(),
            content: Some(msg.text()),
            tool_calls: None,
            tool_call_id: None,
        },
        Message::User { .. } => OpenAIMessage {
            role: "user".to_string(),
            content: Some(msg.text()),
            tool_calls: None,
            tool_call_id: None,
        },
        Message::Assistant { content, .. } => {
            let mut text_parts = Vec::new();
            let mut tool_calls = Vec::new();

            for c in content {
                match c {
                    Content::Text { text } => text_parts.push(text.clone()),
                    Content::ToolCall {
                        id,
                        name,
                        arguments,
                    } => {
                        tool_calls.push(OpenAIToolCall {
                            id: id.clone(),
                            call_type: "function".to_string(),
                            function: OpenAIFunctionCall {
                                name: name.clone(),
                                arguments: arguments.to_string(),
                            },
                        });
                    }
                }
            }

            OpenAIMessage {
                role: "assistant".to_string(),
                content: if text_parts.is_empty() {
                    None
                } else {
                    Some(text_parts.join(""))
                },
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
                tool_call_id: None,
            }
        }
        Message::ToolResult { tool_call_id, .. } => OpenAIMessage {
            role: "tool".to_string(),
            content: Some(msg.text()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.clone()),
        },
    }
}

fn create_stream(
    mut event_source: EventSource,
    first: Event,
    model: Model,
) -> impl futures::Stream<Item = MessageEvent> {
    stream! {
        let mut accumulated_text = String::new();
        let mut tool_calls: Vec<(String, String, String)> = Vec::new(); // (id, name, args)
        let mut finish_reason: Option<String> = None;
        let mut usage = Usage::default();
        let mut pending = Some(Ok(first));

        let start_message = Message::Assistant {
            content: vec![],
            metadata: AssistantMetadata {
                provider: Some(model.provider),
                model: Some(model.id.clone()),
                ..Default::default()
            },
        };
        yield MessageEvent::Start { message: start_message };

        loop {
            let event = match pending.take() {
                Some(event) => event,
                None => match event_source.next().await {
                    Some(event) => event,
                    None => break,
                },
            };

            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    if msg.data == "[DONE]" {
                        break;
                    }

                    let chunk: std::result::Result<StreamChunk, _> = serde_json::from_str(&msg.data);
                    match chunk {
                        Ok(chunk) => {
                            for choice in &chunk.choices {
                                if let Some(ref content) = choice.delta.content {
                                    if !content.is_empty() {
                                        accumulated_text.push_str(content);
                                        yield MessageEvent::TextDelta {
                                            content_index: 0,
                                            delta: content.clone(),
                                        };
                                    }
                                }

                                if let Some(ref tcs) = choice.delta.tool_calls {
                                    for tc in tcs {
                                        let Some(idx) = tool_call_slot(&mut tool_calls, tc.index) else {
                                            tracing::warn!("ignoring tool call delta with index {}", tc.index);
                                            continue;
                                        };

                                        if let Some(ref id) = tc.id {
                                            tool_calls[idx].0 = id.clone();
                                        }
                                        if let Some(ref function) = tc.function {
                                            if let Some(ref name) = function.name {
                                                tool_calls[idx].1 = name.clone();
                                                yield MessageEvent::ToolCallStart {
                                                    content_index: idx + 1,
                                                    id: tool_calls[idx].0.clone(),
                                                    name: name.clone(),
                                                };
                                            }
                                            if let Some(ref args) = function.arguments {
                                                tool_calls[idx].2.push_str(args);
                                                yield MessageEvent::ToolCallDelta {
                                                    content_index: idx + 1,
                                                    delta: args.clone(),
                                                };
                                            }
                                        }
                                    }
                                }

                                if let Some(ref reason) = choice.finish_reason {
                                    finish_reason = Some(reason.clone());
                                }
                            }

                            if let Some(ref stream_usage) = chunk.usage {
                                usage.input = stream_usage.prompt_tokens;
                                usage.output = stream_usage.completion_tokens;
                            }
                        }
                        Err(e) => {
                            event_source.close();
                            yield MessageEvent::Error {
                                message: format!("Failed to parse chunk: {}", e),
                            };
                            return;
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(e) => {
                    event_source.close();
                    yield MessageEvent::Error {
                        message: format!("SSE error: {}", e),
                    };
                    return;
                }
            }
        }
        event_source.close();

        let mut content = Vec::new();
        if !accumulated_text.is_empty() {
            content.push(Content::Text {
                text: accumulated_text,
            });
        }
        for (id, name, args) in tool_calls {
            if !id.is_empty() && !name.is_empty() {
                let arguments = parse_tool_arguments(&name, args);
                content.push(Content::ToolCall {
                    id,
                    name,
                    arguments,
                });
            }
        }

        let stop_reason = match finish_reason.as_deref() {
            Some("length") => StopReason::Length,
            Some("tool_calls") => StopReason::ToolUse,
            _ => StopReason::Stop,
        };

        let final_message = Message::Assistant {
            content,
            metadata: AssistantMetadata {
                provider: Some(model.provider),
                model: Some(model.id.clone()),
                usage: usage.clone(),
                stop_reason: Some(stop_reason),
                error_message: None,
                timestamp: chrono::Utc::now().timestamp_millis(),
            },
        };

        yield MessageEvent::Done {
            message: final_message,
            stop_reason,
            usage,
        };
    }
}

// Request/Response types

/// Slot for a streamed tool-call delta. Calls arrive in index order, so an
/// index may refer to an existing call or open the next one; anything else is
/// rejected.
fn tool_call_slot(calls: &mut Vec<(String, String, String)>, index: i32) -> Option<usize> {
    let idx = usize::try_from(index).ok()?;
    if idx > calls.len() {
        return None;
    }
    if idx == calls.len() {
        calls.push(Default::default());
    }
    Some(idx)
}

/// Arguments that are not valid JSON are kept as the raw string so the tool
/// error can quote what the model sent.
fn parse_tool_arguments(name: &str, raw: String) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("tool call {} has malformed arguments: {}", name, e);
            serde_json::Value::String(raw)
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<OpenAIStreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct OpenAIStreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIErrorBody,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorBody {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

// Streaming response types

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<StreamUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    index: i32,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
