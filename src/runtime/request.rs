//! Inbound chat request body
//!
//! Two shapes are accepted on the same endpoint:
//!
//! ```text
//! persistent: {"id": "...", "message": {...}, "projectId"?: 3, "selectedModel"?: "..."}
//! legacy:     {"messages": [{...}, ...],      "projectId"?: 3, "selectedModel"?: "..."}
//! ```
//!
//! Only the persistent shape is written to the conversation store.

use serde::Deserialize;

use crate::store::{ContentPart, Role};

/// A message as sent by the chat UI
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UiMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<ContentPart>,
    /// Older clients send plain `content` instead of `parts`
    #[serde(default)]
    pub content: Option<String>,
}

impl UiMessage {
    /// Parts, falling back to `content` when no parts were sent
    pub fn content_parts(&self) -> Vec<ContentPart> {
        if self.parts.is_empty() {
            if let Some(content) = &self.content {
                return vec![ContentPart::text(content.clone())];
            }
        }
        self.parts.clone()
    }
}

/// Body of `POST /api/agents/{role}/chat`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub message: Option<UiMessage>,
    #[serde(default)]
    pub messages: Option<Vec<UiMessage>>,
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub selected_model: Option<String>,
}

/// The validated conversational part of a request
#[derive(Debug, Clone, PartialEq)]
pub enum ChatTurn {
    /// One new message for a stored conversation
    Persistent { id: String, message: UiMessage },
    /// The full transcript, sent by the client every turn
    Legacy { messages: Vec<UiMessage> },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("request body is not valid JSON: {0}")]
    Malformed(String),
    #[error("request must contain `message` or a non-empty `messages` list")]
    MissingMessages,
    #[error("`message` requires a conversation `id`")]
    MissingConversationId,
    #[error("the new message must come from the user")]
    NotFromUser,
    #[error("query parameter `id` is required")]
    MissingQueryId,
}

impl ChatRequest {
    /// Decide which shape this request uses
    pub fn turn(&self) -> Result<ChatTurn, ValidationError> {
        if let Some(message) = &self.message {
            let id = self
                .id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .ok_or(ValidationError::MissingConversationId)?;
            if message.role != Role::User {
                return Err(ValidationError::NotFromUser);
            }
            return Ok(ChatTurn::Persistent {
                id: id.to_string(),
                message: message.clone(),
            });
        }

        match &self.messages {
            Some(messages) if !messages.is_empty() => Ok(ChatTurn::Legacy {
                messages: messages.clone(),
            }),
            _ => Err(ValidationError::MissingMessages),
        }
    }
}
