//! Per-thread checkpoints
//!
//! A compiled graph with a checkpointer saves the thread's state after the input
//! is applied and after every node. The newest checkpoint is what the next run
//! on the same thread starts from.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::interrupt::Interrupt;
use crate::state::GraphState;

/// Error type for checkpoint operations
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("thread_id required when the graph has a checkpointer")]
    ThreadIdRequired,
    #[error("storage: {0}")]
    Storage(String),
    #[error("not found: {0}")]
    NotFound(String),
}

/// What produced a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointSource {
    /// Run input was applied
    Input,
    /// A node finished
    Loop,
    /// A node paused for human input
    Interrupt,
}

/// A saved snapshot of one thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub thread_id: String,
    pub step: u64,
    pub source: CheckpointSource,
    pub state: GraphState,
    /// Node to run next; `None` when the run finished
    pub next: Option<String>,
    pub pending_interrupt: Option<Interrupt>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        thread_id: impl Into<String>,
        step: u64,
        source: CheckpointSource,
        state: GraphState,
        next: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            step,
            source,
            state,
            next,
            pending_interrupt: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.pending_interrupt = Some(interrupt);
        self
    }
}

/// Listing entry for a thread's history
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointSummary {
    pub id: String,
    pub step: u64,
    pub source: CheckpointSource,
    pub next: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Checkpoint> for CheckpointSummary {
    fn from(c: &Checkpoint) -> Self {
        Self {
            id: c.id.clone(),
            step: c.step,
            source: c.source,
            next: c.next.clone(),
            created_at: c.created_at,
        }
    }
}

/// Saves and loads checkpoints by thread id
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Persist a checkpoint. Returns its id.
    async fn put(&self, checkpoint: Checkpoint) -> Result<String, CheckpointError>;

    /// Newest checkpoint for the thread
    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    /// History for the thread, newest first
    async fn list(
        &self,
        thread_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<CheckpointSummary>, CheckpointError>;
}

/// In-process checkpointer; history is lost when the process exits
#[derive(Default)]
pub struct MemorySaver {
    threads: RwLock<HashMap<String, Vec<Checkpoint>>>,
}

impl MemorySaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Thread ids with at least one checkpoint, sorted
    pub fn threads(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.threads.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl Checkpointer for MemorySaver {
    async fn put(&self, checkpoint: Checkpoint) -> Result<String, CheckpointError> {
        if checkpoint.thread_id.is_empty() {
            return Err(CheckpointError::ThreadIdRequired);
        }
        let id = checkpoint.id.clone();
        self.threads
            .write()
            .entry(checkpoint.thread_id.clone())
            .or_default()
            .push(checkpoint);
        Ok(id)
    }

    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self
            .threads
            .read()
            .get(thread_id)
            .and_then(|history| history.last().cloned()))
    }

    async fn list(
        &self,
        thread_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<CheckpointSummary>, CheckpointError> {
        let threads = self.threads.read();
        let Some(history) = threads.get(thread_id) else {
            return Ok(Vec::new());
        };
        Ok(history
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .map(CheckpointSummary::from)
            .collect())
    }
}
