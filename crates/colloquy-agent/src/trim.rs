//! Message history trimming
//!
//! Keeps a conversation inside a token budget before it is sent to the model.
//! Counting is pluggable through [`TokenCounter`]; the default estimate is the
//! usual chars/4 heuristic plus a small per-message overhead.

use std::sync::Arc;

use colloquy_ai::{Content, Message};

/// Tokens charged per message for role and framing
pub const MESSAGE_OVERHEAD_TOKENS: u32 = 3;

/// Counts tokens in a message
pub trait TokenCounter: Send + Sync {
    fn count(&self, message: &Message) -> u32;

    fn count_all(&self, messages: &[Message]) -> u32 {
        messages.iter().map(|m| self.count(m)).sum()
    }
}

/// chars/4 estimate plus per-message overhead
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxTokenCounter;

impl TokenCounter for ApproxTokenCounter {
    fn count(&self, message: &Message) -> u32 {
        (content_char_count(message.content()) / 4) as u32 + MESSAGE_OVERHEAD_TOKENS
    }
}

/// Every message costs one token, which turns the budget into a message count
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageCounter;

impl TokenCounter for MessageCounter {
    fn count(&self, _message: &Message) -> u32 {
        1
    }
}

fn content_char_count(content: &[Content]) -> usize {
    content
        .iter()
        .map(|c| match c {
            Content::Text { text } => text.chars().count(),
            Content::ToolCall {
                name, arguments, ..
            } => name.len() + serde_json::to_string(arguments).unwrap_or_default().len(),
        })
        .sum()
}

/// Which end of the history to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrimStrategy {
    /// Keep the most recent messages
    #[default]
    Last,
    /// Keep the oldest messages
    First,
}

#[derive(Debug, Clone)]
pub struct TrimConfig {
    pub max_tokens: u32,
    pub strategy: TrimStrategy,
    /// Keep a leading system message and charge it against the budget
    pub include_system: bool,
    /// Cut the text of the message at the boundary instead of dropping it whole
    pub allow_partial: bool,
    /// Drop leading kept messages until one with this role ("user", "assistant", ...)
    pub start_on: Option<String>,
}

impl TrimConfig {
    /// Keep the most recent messages that fit in `max_tokens`
    pub fn last(max_tokens: u32) -> Self {
        Self {
            max_tokens,
            strategy: TrimStrategy::Last,
            include_system: false,
            allow_partial: false,
            start_on: None,
        }
    }

    pub fn first(max_tokens: u32) -> Self {
        Self {
            strategy: TrimStrategy::First,
            ..Self::last(max_tokens)
        }
    }

    pub fn include_system(mut self, include: bool) -> Self {
        self.include_system = include;
        self
    }

    pub fn allow_partial(mut self, allow: bool) -> Self {
        self.allow_partial = allow;
        self
    }

    pub fn start_on(mut self, role: impl Into<String>) -> Self {
        self.start_on = Some(role.into());
        self
    }
}

/// A trim configuration paired with the counter it budgets with
#[derive(Clone)]
pub struct Trimmer {
    pub config: TrimConfig,
    pub counter: Arc<dyn TokenCounter>,
}

impl Trimmer {
    pub fn new(config: TrimConfig, counter: Arc<dyn TokenCounter>) -> Self {
        Self { config, counter }
    }

    pub fn trim(&self, messages: &[Message]) -> Vec<Message> {
        trim_messages(messages, &self.config, self.counter.as_ref())
    }
}

/// Trim `messages` to fit `config.max_tokens` as measured by `counter`.
///
/// With [`TrimStrategy::Last`] the result never starts with a tool result, since a
/// result without its call is rejected by providers. When `include_system` is set a
/// leading system message is always kept, even if it alone exceeds the budget.
pub fn trim_messages(
    messages: &[Message],
    config: &TrimConfig,
    counter: &dyn TokenCounter,
) -> Vec<Message> {
    match config.strategy {
        TrimStrategy::Last => trim_last(messages, config, counter),
        TrimStrategy::First => trim_first(messages, config, counter),
    }
}

fn trim_last(messages: &[Message], config: &TrimConfig, counter: &dyn TokenCounter) -> Vec<Message> {
    let (system, rest) = match messages.split_first() {
        Some((first @ Message::System { .. }, rest)) if config.include_system => {
            (Some(first.clone()), rest)
        }
        _ => (None, messages),
    };

    let mut remaining = config
        .max_tokens
        .saturating_sub(system.as_ref().map(|m| counter.count(m)).unwrap_or(0));
    let mut kept = Vec::new();

    for message in rest.iter().rev() {
        let cost = counter.count(message);
        if cost <= remaining {
            remaining -= cost;
            kept.push(message.clone());
            continue;
        }
        if config.allow_partial {
            if let Some(partial) = partial_message(message, remaining, counter, true) {
                kept.push(partial);
            }
        }
        break;
    }
    kept.reverse();

    let start = match &config.start_on {
        Some(role) => kept
            .iter()
            .position(|m| m.role() == role)
            .unwrap_or(kept.len()),
        None => kept
            .iter()
            .position(|m| !matches!(m, Message::ToolResult { .. }))
            .unwrap_or(kept.len()),
    };

    system.into_iter().chain(kept.drain(start..)).collect()
}

fn trim_first(messages: &[Message], config: &TrimConfig, counter: &dyn TokenCounter) -> Vec<Message> {
    let mut remaining = config.max_tokens;
    let mut kept = Vec::new();

    for message in messages {
        let cost = counter.count(message);
        if cost <= remaining {
            remaining -= cost;
            kept.push(message.clone());
            continue;
        }
        if config.allow_partial {
            if let Some(partial) = partial_message(message, remaining, counter, false) {
                kept.push(partial);
            }
        }
        break;
    }

    // A tool request with any of its results cut off is unanswerable
    if let Some(pos) = kept.iter().rposition(Message::has_tool_calls) {
        let answered: Vec<&str> = kept[pos + 1..]
            .iter()
            .filter_map(|m| match m {
                Message::ToolResult { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect();
        if kept[pos]
            .tool_calls()
            .iter()
            .any(|call| !answered.contains(&call.id.as_str()))
        {
            kept.truncate(pos);
        }
    }
    kept
}

/// Shorten a text-only message word by word until it fits in `budget`
fn partial_message(
    message: &Message,
    budget: u32,
    counter: &dyn TokenCounter,
    keep_end: bool,
) -> Option<Message> {
    if message.content().iter().any(Content::is_tool_call)
        || matches!(message, Message::ToolResult { .. })
    {
        return None;
    }

    let text = message.text();
    let words: Vec<&str> = text.split_inclusive(char::is_whitespace).collect();
    let mut best = None;

    for n in 1..words.len() {
        let candidate = if keep_end {
            words[words.len() - n..].concat()
        } else {
            words[..n].concat()
        };
        let mut shortened = message.clone();
        *shortened.content_mut() = vec![Content::text(candidate)];
        if counter.count(&shortened) > budget {
            break;
        }
        best = Some(shortened);
    }
    best
}
