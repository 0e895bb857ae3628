//! Scripted model doubles
//!
//! Used by unit tests, the integration tests under `tests/`, and local runs
//! without an Ollama server. A [`ScriptedModel`] replays a queue of turns and
//! records every request it receives.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::agent::TaskClass;
use crate::model::{
    FinishReason, LanguageModel, ModelError, ModelEvent, ModelProvider, ModelRequest,
    ModelStream, ToolInvocation,
};

/// Reply used once the script runs out
pub const DEFAULT_REPLY: &str = "Done.";

/// A turn that streams `text` and stops
pub fn text_turn(text: &str) -> Vec<ModelEvent> {
    vec![
        ModelEvent::TextDelta(text.to_string()),
        ModelEvent::Finish(FinishReason::Stop),
    ]
}

/// A turn that requests the given `(id, tool, arguments)` calls
pub fn tool_turn(calls: &[(&str, &str, Value)]) -> Vec<ModelEvent> {
    let mut events: Vec<ModelEvent> = calls
        .iter()
        .map(|(id, name, arguments)| {
            ModelEvent::ToolCall(ToolInvocation {
                id: id.to_string(),
                name: name.to_string(),
                arguments: arguments.clone(),
            })
        })
        .collect();
    events.push(ModelEvent::Finish(FinishReason::ToolCalls));
    events
}

#[derive(Default)]
struct Script {
    turns: VecDeque<Vec<ModelEvent>>,
    requests: Vec<ModelRequest>,
}

/// Model that replays scripted turns
#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<Script>,
    event_delay: Option<Duration>,
    cancel_on_turn: Option<(usize, CancellationToken)>,
    fail_on_turn: Option<usize>,
}

impl ScriptedModel {
    pub fn new<I>(turns: I) -> Self
    where
        I: IntoIterator<Item = Vec<ModelEvent>>,
    {
        Self {
            script: Mutex::new(Script {
                turns: turns.into_iter().collect(),
                requests: Vec::new(),
            }),
            ..Self::default()
        }
    }

    /// Sleep before each event
    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = Some(delay);
        self
    }

    /// Cancel `token` when turn `turn` (1-based) is requested
    pub fn cancel_on_turn(mut self, turn: usize, token: CancellationToken) -> Self {
        self.cancel_on_turn = Some((turn, token));
        self
    }

    /// Fail turn `turn` (1-based) with a transport error
    pub fn fail_on_turn(mut self, turn: usize) -> Self {
        self.fail_on_turn = Some(turn);
        self
    }

    /// Requests seen so far, in call order
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.lock().requests.clone()
    }

    pub fn turns_taken(&self) -> usize {
        self.lock().requests.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, ModelError> {
        let (turn, events) = {
            let mut script = self.lock();
            script.requests.push(request);
            let turn = script.requests.len();
            let events = script
                .turns
                .pop_front()
                .unwrap_or_else(|| text_turn(DEFAULT_REPLY));
            (turn, events)
        };

        if let Some((at, token)) = &self.cancel_on_turn {
            if *at == turn {
                token.cancel();
            }
        }
        if self.fail_on_turn == Some(turn) {
            return Err(ModelError::Request("scripted failure".to_string()));
        }

        let delay = self.event_delay;
        let events = stream! {
            for event in events {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok::<ModelEvent, ModelError>(event);
            }
        };
        Ok(Box::pin(events))
    }
}

/// Provider handing out scripted models
///
/// Every name resolves to the same shared model unless the provider is
/// disabled.
pub struct ScriptedProvider {
    model: Option<Arc<ScriptedModel>>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::with_model(Arc::new(ScriptedModel::default()))
    }
}

impl ScriptedProvider {
    pub fn with_model(model: Arc<ScriptedModel>) -> Self {
        Self { model: Some(model) }
    }

    /// A provider that refuses every model
    pub fn disabled() -> Self {
        Self { model: None }
    }
}

impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn instantiate(
        &self,
        model: &str,
        _task_class: TaskClass,
    ) -> Result<Arc<dyn LanguageModel>, ModelError> {
        match &self.model {
            Some(scripted) => Ok(Arc::clone(scripted) as Arc<dyn LanguageModel>),
            None => Err(ModelError::ProviderUnavailable {
                provider: self.name().to_string(),
                reason: format!("{} is disabled", model),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelMessage;
    use futures_util::StreamExt;

    fn request() -> ModelRequest {
        ModelRequest {
            system_prompt: String::new(),
            messages: vec![ModelMessage::user("hi")],
            tools: Vec::new(),
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn test_replays_then_defaults() {
        let model = ScriptedModel::new([text_turn("first")]);
        let events: Vec<_> = model.stream(request()).await.unwrap().collect().await;
        assert_eq!(
            events[0].as_ref().unwrap(),
            &ModelEvent::TextDelta("first".to_string())
        );

        let events: Vec<_> = model.stream(request()).await.unwrap().collect().await;
        assert_eq!(
            events[0].as_ref().unwrap(),
            &ModelEvent::TextDelta(DEFAULT_REPLY.to_string())
        );
        assert_eq!(model.turns_taken(), 2);
    }

    #[test]
    fn test_disabled_provider_refuses() {
        let provider = ScriptedProvider::disabled();
        assert!(provider.instantiate("qwen3", TaskClass::Chat).is_err());
    }
}
