//! Conversation persistence
//!
//! Conversations and their messages live in the backend. The runtime only
//! needs three operations, captured by [`ConversationStore`]:
//!
//! - `upsert_conversation` - create on first use, no-op afterwards
//! - `conversation_history` - the conversation and its ordered messages
//! - `save_message` - append one message
//!
//! [`HttpConversationStore`] talks to the backend; [`InMemoryConversationStore`]
//! backs tests and local runs without a backend.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthContext;

pub use http::HttpConversationStore;
pub use memory::InMemoryConversationStore;

/// Text stored in place of an empty user submission
pub const EMPTY_MESSAGE_PLACEHOLDER: &str = "Hello";

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// One piece of message content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text {
        text: String,
    },
    File {
        #[serde(rename = "mediaType")]
        media_type: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }
}

/// A persisted conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub agent_type: String,
    #[serde(default)]
    pub project_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A persisted message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub parts: Vec<ContentPart>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// All text parts joined with blank lines
    pub fn text(&self) -> String {
        joined_text(&self.parts)
    }
}

/// A message about to be appended
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMessage {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl NewMessage {
    /// Build a storable message from arbitrary parts.
    ///
    /// File parts are dropped and blank text parts removed. If nothing is
    /// left, the message becomes the [`EMPTY_MESSAGE_PLACEHOLDER`] text.
    pub fn storable(role: Role, parts: &[ContentPart]) -> Self {
        let mut kept: Vec<ContentPart> = parts
            .iter()
            .filter(|part| matches!(part, ContentPart::Text { text } if !text.trim().is_empty()))
            .cloned()
            .collect();
        if kept.is_empty() {
            kept.push(ContentPart::text(EMPTY_MESSAGE_PLACEHOLDER));
        }
        Self { role, parts: kept }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            parts: vec![ContentPart::text(text)],
        }
    }
}

/// A conversation with its messages in append order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationHistory {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("conversation {0} not found")]
    NotFound(String),
    #[error("conversation store unreachable: {0}")]
    Unavailable(String),
    #[error("conversation store returned {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed store response: {0}")]
    Malformed(String),
}

/// Durable log of conversations and messages
///
/// The caller's credential is passed through so the backend can authorise
/// each call on the user's behalf.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create the conversation if absent; return the stored record either way
    async fn upsert_conversation(
        &self,
        id: &str,
        agent_type: &str,
        project_id: Option<i64>,
        auth: Option<&AuthContext>,
    ) -> Result<Conversation, StoreError>;

    async fn conversation_history(
        &self,
        id: &str,
        auth: Option<&AuthContext>,
    ) -> Result<ConversationHistory, StoreError>;

    async fn save_message(
        &self,
        conversation_id: &str,
        message: NewMessage,
        auth: Option<&AuthContext>,
    ) -> Result<Message, StoreError>;
}

/// Join the text parts of a message with blank lines
pub fn joined_text(parts: &[ContentPart]) -> String {
    parts
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } => Some(text.as_str()),
            ContentPart::File { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
