//! Ollama LLM integration module
//!
//! - `tool_use` - `/api/chat` wire types, including tool calling
//! - `client` - streaming NDJSON client
//! - `provider` - [`crate::model::ModelProvider`] implementation

pub mod client;
pub mod provider;
pub mod tool_use;

pub use client::{ChatClient, ChatError};
pub use provider::{OllamaModel, OllamaProvider};
