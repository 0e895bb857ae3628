//! In-memory conversation store
//!
//! Same contract as the backend store, kept in an `Arc<RwLock<..>>` so it can
//! be cloned and shared across request tasks. Used for tests and for running
//! the service without a backend (`SPRINTPILOT_STORE=memory`).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    Conversation, ConversationHistory, ConversationStore, Message, NewMessage, StoreError,
};
use crate::auth::AuthContext;

#[derive(Default)]
struct Inner {
    conversations: HashMap<String, Conversation>,
    messages: HashMap<String, Vec<Message>>,
}

/// Conversation store held in process memory
#[derive(Clone, Default)]
pub struct InMemoryConversationStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored conversations
    pub async fn conversation_count(&self) -> usize {
        self.inner.read().await.conversations.len()
    }

    /// Number of stored messages across all conversations
    pub async fn message_count(&self) -> usize {
        self.inner
            .read()
            .await
            .messages
            .values()
            .map(Vec::len)
            .sum()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn upsert_conversation(
        &self,
        id: &str,
        agent_type: &str,
        project_id: Option<i64>,
        _auth: Option<&AuthContext>,
    ) -> Result<Conversation, StoreError> {
        let mut inner = self.inner.write().await;
        let conversation = inner
            .conversations
            .entry(id.to_string())
            .or_insert_with(|| Conversation {
                id: id.to_string(),
                agent_type: agent_type.to_string(),
                project_id,
                created_at: Utc::now(),
            })
            .clone();
        Ok(conversation)
    }

    async fn conversation_history(
        &self,
        id: &str,
        _auth: Option<&AuthContext>,
    ) -> Result<ConversationHistory, StoreError> {
        let inner = self.inner.read().await;
        let conversation = inner
            .conversations
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let messages = inner.messages.get(id).cloned().unwrap_or_default();
        Ok(ConversationHistory {
            conversation,
            messages,
        })
    }

    async fn save_message(
        &self,
        conversation_id: &str,
        message: NewMessage,
        _auth: Option<&AuthContext>,
    ) -> Result<Message, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.conversations.contains_key(conversation_id) {
            return Err(StoreError::NotFound(conversation_id.to_string()));
        }
        let stored = Message {
            id: Uuid::now_v7().to_string(),
            conversation_id: conversation_id.to_string(),
            role: message.role,
            parts: message.parts,
            created_at: Utc::now(),
        };
        inner
            .messages
            .entry(conversation_id.to_string())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ContentPart, Role};

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = InMemoryConversationStore::new();
        let first = store
            .upsert_conversation("conv-1", "scrum-master", Some(3), None)
            .await
            .unwrap();
        let second = store
            .upsert_conversation("conv-1", "scrum-master", Some(3), None)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(store.conversation_count().await, 1);
    }

    #[tokio::test]
    async fn test_user_message_round_trip() {
        let store = InMemoryConversationStore::new();
        store
            .upsert_conversation("conv-1", "scrum-master", None, None)
            .await
            .unwrap();
        let message = NewMessage::storable(Role::User, &[ContentPart::text("Plan sprint 3")]);
        store.save_message("conv-1", message, None).await.unwrap();

        let history = store.conversation_history("conv-1", None).await.unwrap();
        assert_eq!(history.messages.len(), 1);
        assert_eq!(history.messages[0].role, Role::User);
        assert_eq!(history.messages[0].text(), "Plan sprint 3");
    }

    #[tokio::test]
    async fn test_messages_keep_append_order() {
        let store = InMemoryConversationStore::new();
        store
            .upsert_conversation("conv-1", "developer", None, None)
            .await
            .unwrap();
        for text in ["one", "two", "three"] {
            store
                .save_message("conv-1", NewMessage::assistant_text(text), None)
                .await
                .unwrap();
        }
        let history = store.conversation_history("conv-1", None).await.unwrap();
        let texts: Vec<String> = history.messages.iter().map(Message::text).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_save_to_unknown_conversation_fails() {
        let store = InMemoryConversationStore::new();
        let err = store
            .save_message("missing", NewMessage::assistant_text("hi"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
