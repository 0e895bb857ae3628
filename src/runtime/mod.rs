//! AgentRuntime - per-request façade
//!
//! Wires one chat request through the core:
//!
//! ```text
//! role ─► AgentProfile ─► ModelGateway::resolve ─► ToolRegistry::tools_for
//!                                   │
//!   (persistent shape) upsert conversation ─► load history ─► save user message
//!                                   │
//!                     spawn StepEngine::run ──► ChatStream returned immediately
//!                                   │
//!            Completed ─► save assistant message (failure → notice in stream)
//! ```
//!
//! Everything that can fail with a status code happens before the stream is
//! handed out. After that, failures degrade to text inside the stream.

pub mod request;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::agent::{AgentProfile, ProfileTable, RunInput, StepEngine, StopReason};
use crate::attachments::{self, FileResolver, HttpFileResolver};
use crate::auth::AuthContext;
use crate::metrics::{PERSISTENCE_FAILURES, REQUESTS_IN_FLIGHT};
use crate::model::gateway::ModelUnavailable;
use crate::model::{ModelGateway, ModelMessage};
use crate::store::{
    ContentPart, ConversationHistory, ConversationStore, Message, NewMessage, Role, StoreError,
};
use crate::stream::{self, ChatStream};
use crate::tools::{RegistryError, ToolRegistry};

pub use request::{ChatRequest, ChatTurn, UiMessage, ValidationError};

/// Appended to the stream when the assistant reply could not be saved
pub const PERSISTENCE_NOTICE: &str =
    "(This reply could not be saved and may be missing when you reload the conversation.)";

/// Errors that end a request before streaming starts
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("unknown agent type: {0}")]
    UnknownAgent(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    ModelUnavailable(#[from] ModelUnavailable),
    #[error("conversation store error: {0}")]
    Persistence(#[from] StoreError),
    #[error("tool configuration error: {0}")]
    Tools(#[from] RegistryError),
}

impl RuntimeError {
    pub fn status(&self) -> StatusCode {
        match self {
            RuntimeError::UnknownAgent(_) => StatusCode::NOT_FOUND,
            RuntimeError::Validation(_) => StatusCode::BAD_REQUEST,
            RuntimeError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RuntimeError::Persistence(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            RuntimeError::Persistence(_) => StatusCode::BAD_GATEWAY,
            RuntimeError::Tools(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RuntimeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self, "Chat request failed");
        } else {
            debug!(status = status.as_u16(), error = %self, "Chat request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// A started chat turn
pub struct ChatReply {
    pub trace_id: String,
    /// The model that actually serves the turn
    pub model: String,
    pub stream: ChatStream,
}

/// Shared request handler for every agent role
pub struct AgentRuntime {
    profiles: ProfileTable,
    gateway: ModelGateway,
    registry: ToolRegistry,
    store: Arc<dyn ConversationStore>,
    files: Arc<dyn FileResolver>,
    engine: StepEngine,
}

impl AgentRuntime {
    pub fn new(
        profiles: ProfileTable,
        gateway: ModelGateway,
        registry: ToolRegistry,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            profiles,
            gateway,
            registry,
            store,
            files: Arc::new(HttpFileResolver::new(Duration::from_secs(10))),
            engine: StepEngine::default(),
        }
    }

    pub fn with_file_resolver(mut self, files: Arc<dyn FileResolver>) -> Self {
        self.files = files;
        self
    }

    pub fn with_engine(mut self, engine: StepEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn profiles(&self) -> &ProfileTable {
        &self.profiles
    }

    fn profile(&self, role: &str) -> Result<Arc<AgentProfile>, RuntimeError> {
        self.profiles
            .get(role)
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownAgent(role.to_string()))
    }

    /// Start one chat turn and return its text stream.
    ///
    /// The user message (persistent shape) is saved before this returns. The
    /// assistant message is saved by the background task once the run
    /// completes; aborted and failed runs save nothing.
    pub async fn chat(
        self: &Arc<Self>,
        role: &str,
        request: ChatRequest,
        auth: Option<AuthContext>,
    ) -> Result<ChatReply, RuntimeError> {
        let profile = self.profile(role)?;
        let turn = request.turn()?;
        let model = self
            .gateway
            .resolve(request.selected_model.as_deref(), &profile)?;
        let tools = self.registry.tools_for(&profile)?;
        let trace_id = Uuid::now_v7().to_string();

        let (conversation_id, messages) = match turn {
            ChatTurn::Persistent { id, message } => {
                let messages = self
                    .prepare_persistent(&profile, &id, &message, request.project_id, auth.as_ref())
                    .await?;
                (Some(id), messages)
            }
            ChatTurn::Legacy { messages } => (None, self.prepare_legacy(&messages).await),
        };

        info!(
            trace_id = %trace_id,
            role = %profile.role,
            model = %model.name,
            fell_back = model.fell_back,
            conversation = conversation_id.as_deref().unwrap_or("-"),
            history = messages.len(),
            "Starting chat turn"
        );

        let model_name = model.name.clone();
        let input = RunInput {
            trace_id: trace_id.clone(),
            system_prompt: system_prompt(&profile, request.project_id),
            profile,
            model,
            tools,
            messages,
            auth: auth.clone(),
        };

        let cancel = CancellationToken::new();
        let (sink, stream) = stream::channel(cancel.clone());
        let runtime = Arc::clone(self);

        REQUESTS_IN_FLIGHT.inc();
        tokio::spawn(async move {
            let outcome = runtime.engine.run(input, &sink, &cancel).await;

            match (&conversation_id, outcome.stop_reason) {
                (Some(id), reason) if reason.is_completed() => {
                    if outcome.text.trim().is_empty() {
                        warn!(conversation = %id, "Run completed without text; nothing to save");
                    } else if let Err(e) = runtime
                        .store
                        .save_message(id, NewMessage::assistant_text(outcome.text), auth.as_ref())
                        .await
                    {
                        PERSISTENCE_FAILURES
                            .with_label_values(&["save_assistant_message"])
                            .inc();
                        error!(conversation = %id, error = %e, "Failed to save assistant message");
                        sink.send_notice(PERSISTENCE_NOTICE).await;
                    }
                }
                (Some(id), StopReason::Aborted) => {
                    info!(conversation = %id, "Run aborted; partial reply not saved");
                }
                _ => {}
            }

            sink.close();
            REQUESTS_IN_FLIGHT.dec();
        });

        Ok(ChatReply {
            trace_id,
            model: model_name,
            stream,
        })
    }

    /// Conversation and messages for the history endpoint
    pub async fn history(
        &self,
        role: &str,
        id: &str,
        auth: Option<&AuthContext>,
    ) -> Result<ConversationHistory, RuntimeError> {
        let profile = self.profile(role)?;
        let history = self.store.conversation_history(id, auth).await?;
        if history.conversation.agent_type != profile.role {
            return Err(StoreError::NotFound(id.to_string()).into());
        }
        Ok(history)
    }

    /// Upsert, load history, then save the new user message exactly once
    async fn prepare_persistent(
        &self,
        profile: &AgentProfile,
        id: &str,
        message: &UiMessage,
        project_id: Option<i64>,
        auth: Option<&AuthContext>,
    ) -> Result<Vec<ModelMessage>, RuntimeError> {
        let conversation = self
            .store
            .upsert_conversation(id, &profile.role, project_id, auth)
            .await
            .map_err(|e| persistence_failure("upsert_conversation", e))?;
        if conversation.agent_type != profile.role {
            debug!(
                conversation = %id,
                owner = %conversation.agent_type,
                role = %profile.role,
                "Conversation belongs to another agent"
            );
            return Err(StoreError::NotFound(id.to_string()).into());
        }
        let history = self
            .store
            .conversation_history(id, auth)
            .await
            .map_err(|e| persistence_failure("load_history", e))?;

        let parts = message.content_parts();
        let stored = NewMessage::storable(Role::User, &parts);
        // The model sees the stored text, so replayed history matches this turn
        let mut model_parts = stored.parts.clone();
        model_parts.extend(
            parts
                .into_iter()
                .filter(|part| matches!(part, ContentPart::File { .. })),
        );
        self.store
            .save_message(id, stored, auth)
            .await
            .map_err(|e| persistence_failure("save_user_message", e))?;

        let mut messages: Vec<ModelMessage> =
            history.messages.iter().filter_map(stored_to_model).collect();
        messages.push(attachments::user_message(&model_parts, self.files.as_ref(), true).await);
        Ok(messages)
    }

    /// Convert a client-held transcript; only the newest message gets its
    /// files resolved.
    async fn prepare_legacy(&self, transcript: &[UiMessage]) -> Vec<ModelMessage> {
        let last = transcript.len().saturating_sub(1);
        let mut messages = Vec::with_capacity(transcript.len());
        for (index, message) in transcript.iter().enumerate() {
            let parts = message.content_parts();
            match message.role {
                Role::User => {
                    let resolve_files = index == last;
                    messages.push(
                        attachments::user_message(&parts, self.files.as_ref(), resolve_files)
                            .await,
                    );
                }
                Role::Assistant => {
                    messages.push(ModelMessage::assistant(crate::store::joined_text(&parts)))
                }
                Role::System => {}
            }
        }
        messages
    }
}

fn persistence_failure(operation: &str, err: StoreError) -> RuntimeError {
    if !matches!(err, StoreError::NotFound(_)) {
        PERSISTENCE_FAILURES.with_label_values(&[operation]).inc();
    }
    error!(operation, error = %err, "Conversation store call failed");
    RuntimeError::Persistence(err)
}

/// Stored messages as the model sees them; system messages are not replayed
fn stored_to_model(message: &Message) -> Option<ModelMessage> {
    match message.role {
        Role::User => Some(ModelMessage::user(message.text())),
        Role::Assistant => Some(ModelMessage::assistant(message.text())),
        Role::System => None,
    }
}

/// Profile prompt plus the project the user is working in
fn system_prompt(profile: &AgentProfile, project_id: Option<i64>) -> String {
    match project_id {
        Some(project_id) => format!(
            "{}\n\nThe user is currently working in project {}. Use this projectId for tool calls unless they name another project.",
            profile.system_prompt, project_id
        ),
        None => profile.system_prompt.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::profiles;
    use chrono::Utc;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            RuntimeError::UnknownAgent("po".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            RuntimeError::Validation(ValidationError::MissingMessages).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RuntimeError::Persistence(StoreError::Unavailable("down".into())).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_project_context_is_appended() {
        let table = profiles::builtin();
        let profile = table.get("developer").unwrap();
        let prompt = system_prompt(profile, Some(7));
        assert!(prompt.starts_with(&profile.system_prompt));
        assert!(prompt.contains("project 7"));
        assert_eq!(system_prompt(profile, None), profile.system_prompt);
    }

    #[test]
    fn test_system_messages_are_not_replayed() {
        let message = Message {
            id: "m1".into(),
            conversation_id: "c1".into(),
            role: Role::System,
            parts: vec![ContentPart::text("internal")],
            created_at: Utc::now(),
        };
        assert!(stored_to_model(&message).is_none());
    }
}
