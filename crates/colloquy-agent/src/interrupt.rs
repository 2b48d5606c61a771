//! Human-in-the-loop interrupts
//!
//! A tool (or any node) pauses a run by calling [`ToolContext::interrupt`]. The first
//! time through there is no resume value, so the call fails with an [`Interrupt`] that
//! carries a JSON payload for the human. The graph stores it in the thread's checkpoint
//! and stops. Resuming re-runs the same node with the human's answer available, and the
//! same `interrupt` call now returns that answer instead of failing.
//!
//! [`ToolContext::interrupt`]: crate::tool::ToolContext::interrupt

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A pause request raised by a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interrupt {
    /// Node that raised the interrupt; filled in by the graph runner
    #[serde(default)]
    pub node: String,
    /// Payload shown to the human
    pub value: Value,
}

impl Interrupt {
    pub fn new(value: Value) -> Self {
        Self {
            node: String::new(),
            value,
        }
    }
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.node.is_empty() {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{} in node '{}'", self.value, self.node)
        }
    }
}

/// A resume value that can be taken exactly once.
///
/// Clones share the slot, so whichever interrupt call runs first during a
/// resumed step receives the value and later calls interrupt again.
#[derive(Debug, Clone, Default)]
pub struct ResumeSlot(Arc<Mutex<Option<Value>>>);

impl ResumeSlot {
    pub fn new(value: Option<Value>) -> Self {
        Self(Arc::new(Mutex::new(value)))
    }

    pub fn take(&self) -> Option<Value> {
        self.0.lock().take()
    }

    pub fn is_pending(&self) -> bool {
        self.0.lock().is_some()
    }
}
