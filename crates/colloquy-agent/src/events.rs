//! Graph run events

use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::Stream;

use crate::interrupt::Interrupt;
use crate::state::{GraphState, StateUpdate};

/// What a streamed run reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// Full state after the input and after each node
    #[default]
    Values,
    /// Each node's update, tagged with the node
    Updates,
    /// Model text fragments as they are generated
    Messages,
}

/// Events emitted during a graph run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    /// State snapshot
    Values { state: GraphState },

    /// A node finished with this update
    Updates { node: String, update: StateUpdate },

    /// Text fragment from a model call inside a node
    MessageDelta { node: String, delta: String },

    /// The run paused for human input
    Interrupt { interrupt: Interrupt },

    /// The run failed
    Error { message: String },
}

impl GraphEvent {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, GraphEvent::Interrupt { .. } | GraphEvent::Error { .. })
    }

    /// Whether a stream in `mode` reports this event. Interrupts and errors always pass.
    pub fn matches(&self, mode: StreamMode) -> bool {
        match self {
            GraphEvent::Values { .. } => mode == StreamMode::Values,
            GraphEvent::Updates { .. } => mode == StreamMode::Updates,
            GraphEvent::MessageDelta { .. } => mode == StreamMode::Messages,
            GraphEvent::Interrupt { .. } | GraphEvent::Error { .. } => true,
        }
    }
}

/// A stream of graph events
pub type GraphEventStream = Pin<Box<dyn Stream<Item = GraphEvent> + Send>>;

/// Sending half of a streamed run
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<GraphEvent>,
    mode: StreamMode,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<GraphEvent>, mode: StreamMode) -> Self {
        Self { tx, mode }
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    /// Forward the event if the mode wants it. A dropped receiver is ignored.
    pub fn emit(&self, event: GraphEvent) {
        if event.matches(self.mode) {
            let _ = self.tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_filtering() {
        let delta = GraphEvent::MessageDelta {
            node: "model".into(),
            delta: "Hi".into(),
        };
        assert!(delta.matches(StreamMode::Messages));
        assert!(!delta.matches(StreamMode::Values));

        let interrupt = GraphEvent::Interrupt {
            interrupt: Interrupt::new(serde_json::json!({"query": "?"})),
        };
        assert!(interrupt.matches(StreamMode::Updates));
        assert!(interrupt.is_terminal());
    }

    #[tokio::test]
    async fn test_sink_drops_unwanted_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx, StreamMode::Messages);
        sink.emit(GraphEvent::Values {
            state: GraphState::default(),
        });
        sink.emit(GraphEvent::MessageDelta {
            node: "model".into(),
            delta: "Hi".into(),
        });
        drop(sink);

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, GraphEvent::MessageDelta { ref delta, .. } if delta == "Hi"));
        assert!(rx.recv().await.is_none());
    }
}
