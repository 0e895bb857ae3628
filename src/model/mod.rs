//! Provider-neutral model interface
//!
//! The step engine talks to models only through the [`LanguageModel`] trait.
//! A model turn is a stream of [`ModelEvent`]s: text deltas that go straight
//! to the caller, typed tool-call requests that drive the next step, and a
//! final [`FinishReason`].
//!
//! ```text
//! ModelGateway::resolve(name) ──► ModelHandle ──► LanguageModel::stream(request)
//!                                                        │
//!                      TextDelta / ToolCall / Finish ◄───┘
//! ```

pub mod gateway;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::Serialize;
use serde_json::Value;

pub use gateway::{ModelGateway, ModelHandle, ModelProvider};

/// One event emitted by a model while it generates a turn
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// A fragment of generated prose
    TextDelta(String),
    /// The model asked for a tool to be run
    ToolCall(ToolInvocation),
    /// The model finished this turn
    Finish(FinishReason),
}

/// Why a model turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
}

/// A typed tool-call request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    /// Identifier unique within the run, used to pair results with calls
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Tool description advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's input
    pub parameters: Value,
}

/// A message in the model-visible conversation
#[derive(Debug, Clone, PartialEq)]
pub enum ModelMessage {
    System(String),
    User {
        text: String,
        /// Base64-encoded images resolved from file attachments
        images: Vec<String>,
    },
    Assistant {
        text: String,
        tool_calls: Vec<ToolInvocation>,
    },
    /// Result of a tool call, always rendered as text
    Tool {
        call_id: String,
        name: String,
        content: String,
    },
}

impl ModelMessage {
    pub fn user(text: impl Into<String>) -> Self {
        ModelMessage::User {
            text: text.into(),
            images: Vec::new(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        ModelMessage::Assistant {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// Everything a model needs to generate one turn
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub messages: Vec<ModelMessage>,
    /// Empty when tools are not permitted for this turn
    pub tools: Vec<ToolSpec>,
    pub temperature: f32,
}

/// Error type for model operations
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The model name is not in the catalog
    #[error("unknown model: {0}")]
    UnknownModel(String),
    /// The provider refused to hand out a model
    #[error("provider {provider} unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },
    /// Transport failure talking to the provider
    #[error("request error: {0}")]
    Request(String),
    /// Provider answered with a non-success status
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    /// Provider sent something we could not parse
    #[error("parse error: {0}")]
    Parse(String),
}

/// Stream of events for a single model turn
pub type ModelStream = Pin<Box<dyn Stream<Item = Result<ModelEvent, ModelError>> + Send>>;

/// A callable model handle
///
/// Implementations must be safe to share across requests; all per-turn state
/// lives in the returned stream.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier as known to the provider
    fn id(&self) -> &str;

    /// Start generating a turn
    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, ModelError>;
}
