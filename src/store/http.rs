//! Conversation store backed by the project-management REST API
//!
//! Endpoints (relative to the backend base URL):
//!
//! ```text
//! PUT  /conversations/{id}            {agentType, projectId}  → Conversation
//! GET  /conversations/{id}                                    → {conversation, messages}
//! POST /conversations/{id}/messages   {role, parts}           → Message
//! ```
//!
//! `PUT` makes the upsert idempotent on the backend side: repeating it for
//! the same id returns the existing record.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use super::{
    Conversation, ConversationHistory, ConversationStore, Message, NewMessage, StoreError,
};
use crate::auth::AuthContext;

/// Client for the backend conversation endpoints
#[derive(Clone)]
pub struct HttpConversationStore {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpConversationStore {
    /// Create a new store client
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the backend API (e.g., "http://localhost:8080/api")
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| StoreError::Unavailable(format!("invalid backend URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Unavailable(format!(
                "backend URL cannot be a base: {}",
                base_url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { base_url, client })
    }

    /// Build `{base}/conversations/{id}[/extra]` with the id percent-encoded
    fn conversation_url(&self, id: &str, extra: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("conversations").push(id);
            if let Some(extra) = extra {
                segments.push(extra);
            }
        }
        url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
        auth: Option<&AuthContext>,
        conversation_id: &str,
    ) -> Result<T, StoreError> {
        debug!(method = %method, url = %url, "Conversation store request");
        let mut request = self.client.request(method, url.clone());
        if let Some(auth) = auth {
            request = request.header(AuthContext::HEADER, auth.header_value());
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(conversation_id.to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(url = %url, status = status.as_u16(), "Conversation store rejected request");
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl ConversationStore for HttpConversationStore {
    async fn upsert_conversation(
        &self,
        id: &str,
        agent_type: &str,
        project_id: Option<i64>,
        auth: Option<&AuthContext>,
    ) -> Result<Conversation, StoreError> {
        let body = json!({ "agentType": agent_type, "projectId": project_id });
        self.call(
            Method::PUT,
            self.conversation_url(id, None),
            Some(body),
            auth,
            id,
        )
        .await
    }

    async fn conversation_history(
        &self,
        id: &str,
        auth: Option<&AuthContext>,
    ) -> Result<ConversationHistory, StoreError> {
        self.call(Method::GET, self.conversation_url(id, None), None, auth, id)
            .await
    }

    async fn save_message(
        &self,
        conversation_id: &str,
        message: NewMessage,
        auth: Option<&AuthContext>,
    ) -> Result<Message, StoreError> {
        let body =
            serde_json::to_value(&message).map_err(|e| StoreError::Malformed(e.to_string()))?;
        self.call(
            Method::POST,
            self.conversation_url(conversation_id, Some("messages")),
            Some(body),
            auth,
            conversation_id,
        )
        .await
    }
}
