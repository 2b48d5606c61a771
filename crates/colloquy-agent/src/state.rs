//! Graph state and the updates nodes return

use std::collections::BTreeMap;

use colloquy_ai::{Content, Message};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// State carried through a graph run and persisted per thread.
///
/// `messages` is append-only: updates extend it. `values` holds named
/// scalars (for example a reply language) where updates overwrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl GraphState {
    pub fn apply(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);
        self.values.extend(update.values);
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// A string value, if present and a string
    pub fn value_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Answer tool calls in the last assistant message that have no result yet.
    ///
    /// Used when a thread moves on without finishing a tool step, so the
    /// history stays acceptable to providers.
    pub fn close_pending_tool_calls(&mut self, reason: &str) -> usize {
        let Some(pos) = self
            .messages
            .iter()
            .rposition(|m| matches!(m, Message::Assistant { .. }))
        else {
            return 0;
        };

        let answered: Vec<String> = self.messages[pos + 1..]
            .iter()
            .filter_map(|m| match m {
                Message::ToolResult { tool_call_id, .. } => Some(tool_call_id.clone()),
                _ => None,
            })
            .collect();

        let missing: Vec<Message> = self.messages[pos]
            .tool_calls()
            .into_iter()
            .filter(|call| !answered.contains(&call.id))
            .map(|call| Message::tool_result(call.id, call.name, vec![Content::text(reason)], true))
            .collect();

        let count = missing.len();
        self.messages.extend(missing);
        count
    }
}

/// Partial state returned by a node or supplied as run input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(message: Message) -> Self {
        Self::messages(vec![message])
    }

    pub fn messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.values.is_empty()
    }
}

impl From<Message> for StateUpdate {
    fn from(message: Message) -> Self {
        Self::message(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{assistant_text, assistant_tool_call};
    use serde_json::json;

    #[test]
    fn test_messages_append_values_overwrite() {
        let mut state = GraphState::default();
        state.apply(StateUpdate::message(Message::user("hi")).with_value("language", "Spanish"));
        state.apply(StateUpdate::message(assistant_text("hola")).with_value("language", "French"));

        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.value_str("language"), Some("French"));
        assert_eq!(state.last_message().map(Message::text), Some("hola".to_string()));
    }

    #[test]
    fn test_update_without_values_keeps_existing() {
        let mut state = GraphState::default();
        state.apply(StateUpdate::new().with_value("language", "Spanish"));
        state.apply(StateUpdate::message(Message::user("again")));
        assert_eq!(state.value_str("language"), Some("Spanish"));
        assert!(StateUpdate::new().is_empty());
    }

    #[test]
    fn test_close_pending_tool_calls() {
        let mut state = GraphState::default();
        state.messages.push(Message::user("help"));
        state.messages.push(assistant_tool_call("call_1", "human_assistance", json!({"query": "?"})));

        assert_eq!(state.close_pending_tool_calls("cancelled"), 1);
        let last = state.last_message().unwrap();
        assert_eq!(last.role(), "tool");
        assert_eq!(last.text(), "cancelled");

        // Already answered: nothing to add
        assert_eq!(state.close_pending_tool_calls("cancelled"), 0);
    }

    #[test]
    fn test_state_serde_roundtrip() {
        let mut state = GraphState::default();
        state.apply(StateUpdate::message(Message::user("hi")).with_value("language", "Spanish"));
        let json = serde_json::to_string(&state).unwrap();
        let back: GraphState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
