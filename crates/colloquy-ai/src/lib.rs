//! colloquy-ai: chat message model and LLM provider layer
//!
//! This crate provides the message types shared by the rest of the workspace,
//! chat prompt templates, and a streaming client for OpenAI-compatible
//! Chat Completions endpoints (OpenAI, Groq, Ollama).

pub mod error;
pub mod models;
pub mod prompt;
pub mod providers;
pub mod stream;
pub mod types;

pub use error::{Error, Result};
pub use prompt::{ChatPromptTemplate, PromptPart, PromptValues};
pub use stream::{MessageEventStream, collect_message};
pub use types::*;
