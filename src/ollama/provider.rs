//! [`ModelProvider`] backed by a local Ollama server
//!
//! Translates provider-neutral [`ModelRequest`]s into `/api/chat` calls and
//! the NDJSON reply into [`ModelEvent`]s.

use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use uuid::Uuid;

use super::client::{ChatClient, ChatError};
use super::tool_use::{ChatMessage, ChatOptions, ChatRequest, ChatResponse, Tool};
use crate::agent::TaskClass;
use crate::model::{
    FinishReason, LanguageModel, ModelError, ModelEvent, ModelProvider, ModelRequest,
    ModelStream, ToolInvocation,
};

/// Context window for conversational turns
const CHAT_NUM_CTX: u32 = 8192;
/// Analysis prompts carry sprint data and burndown tables
const ANALYSIS_NUM_CTX: u32 = 16384;

impl From<ChatError> for ModelError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Request(e) => ModelError::Request(e.to_string()),
            ChatError::Parse(e) => ModelError::Parse(e.to_string()),
            ChatError::Status { status, body } => ModelError::Status { status, body },
            ChatError::Server(msg) => ModelError::Request(msg),
        }
    }
}

/// Serves every catalog model through one Ollama endpoint
#[derive(Clone)]
pub struct OllamaProvider {
    client: ChatClient,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: ChatClient::new(base_url),
        }
    }
}

impl ModelProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn instantiate(
        &self,
        model: &str,
        task_class: TaskClass,
    ) -> Result<Arc<dyn LanguageModel>, ModelError> {
        let num_ctx = match task_class {
            TaskClass::Chat => CHAT_NUM_CTX,
            TaskClass::Analysis => ANALYSIS_NUM_CTX,
        };
        Ok(Arc::new(OllamaModel {
            client: self.client.clone(),
            model: model.to_string(),
            num_ctx,
        }))
    }
}

/// One Ollama model with fixed context size
pub struct OllamaModel {
    client: ChatClient,
    model: String,
    num_ctx: u32,
}

impl OllamaModel {
    fn chat_request(&self, request: &ModelRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(ChatMessage::system(request.system_prompt.clone()));
        messages.extend(request.messages.iter().map(ChatMessage::from));
        ChatRequest {
            model: self.model.clone(),
            messages,
            tools: request.tools.iter().map(Tool::from).collect(),
            stream: true,
            options: ChatOptions {
                temperature: request.temperature,
                num_ctx: self.num_ctx,
            },
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn id(&self) -> &str {
        &self.model
    }

    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, ModelError> {
        let chat_request = self.chat_request(&request);
        let mut lines = self.client.chat_stream(&chat_request).await?;

        let events = stream! {
            let mut saw_tool_call = false;
            while let Some(line) = lines.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        yield Err(ModelError::from(e));
                        return;
                    }
                };
                for event in events_for(&line, &mut saw_tool_call) {
                    yield Ok(event);
                }
                if line.done {
                    return;
                }
            }
            yield Err(ModelError::Parse("stream ended without a done line".to_string()));
        };

        Ok(Box::pin(events))
    }
}

/// Model events carried by one response line
fn events_for(line: &ChatResponse, saw_tool_call: &mut bool) -> Vec<ModelEvent> {
    let mut events = Vec::new();
    if let Some(message) = &line.message {
        if !message.content.is_empty() {
            events.push(ModelEvent::TextDelta(message.content.clone()));
        }
        for call in message.tool_calls.iter().flatten() {
            *saw_tool_call = true;
            events.push(ModelEvent::ToolCall(ToolInvocation {
                id: format!("call_{}", Uuid::now_v7().simple()),
                name: call.function.name.clone(),
                arguments: call.function.arguments.clone(),
            }));
        }
    }
    if line.done {
        let reason = if *saw_tool_call {
            FinishReason::ToolCalls
        } else if line.done_reason.as_deref() == Some("length") {
            FinishReason::Length
        } else {
            FinishReason::Stop
        };
        events.push(ModelEvent::Finish(reason));
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelMessage, ToolSpec};
    use serde_json::json;

    fn line(json: &str) -> ChatResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_text_then_stop() {
        let mut saw = false;
        let events = events_for(
            &line(r#"{"message":{"role":"assistant","content":"Sprint 3"},"done":false}"#),
            &mut saw,
        );
        assert_eq!(events, vec![ModelEvent::TextDelta("Sprint 3".to_string())]);

        let events = events_for(&line(r#"{"done":true,"done_reason":"stop"}"#), &mut saw);
        assert_eq!(events, vec![ModelEvent::Finish(FinishReason::Stop)]);
    }

    #[test]
    fn test_tool_calls_get_distinct_ids() {
        let mut saw = false;
        let events = events_for(
            &line(
                r#"{"message":{"role":"assistant","content":"","tool_calls":[
                    {"function":{"name":"listSprints","arguments":{"projectId":1}}},
                    {"function":{"name":"getBurndown","arguments":{"sprintId":4}}}
                ]},"done":true,"done_reason":"stop"}"#,
            ),
            &mut saw,
        );
        let ids: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                ModelEvent::ToolCall(call) => Some(call.id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert_eq!(events.last(), Some(&ModelEvent::Finish(FinishReason::ToolCalls)));
    }

    #[test]
    fn test_length_finish() {
        let mut saw = false;
        let events = events_for(&line(r#"{"done":true,"done_reason":"length"}"#), &mut saw);
        assert_eq!(events, vec![ModelEvent::Finish(FinishReason::Length)]);
    }

    #[test]
    fn test_request_prepends_system_prompt_and_sets_context() {
        let provider = OllamaProvider::new("http://localhost:11434");
        let model = OllamaModel {
            client: provider.client.clone(),
            model: "qwen3".to_string(),
            num_ctx: ANALYSIS_NUM_CTX,
        };
        let request = model.chat_request(&ModelRequest {
            system_prompt: "You are a scrum master.".to_string(),
            messages: vec![ModelMessage::user("Plan sprint 3")],
            tools: vec![ToolSpec {
                name: "listSprints".to_string(),
                description: "List sprints".to_string(),
                parameters: json!({"type": "object"}),
            }],
            temperature: 0.3,
        });
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[1].content, "Plan sprint 3");
        assert_eq!(request.tools.len(), 1);
        assert_eq!(request.options.num_ctx, ANALYSIS_NUM_CTX);
        assert!(request.stream);
    }
}
