//! StepEngine - the bounded agent loop
//!
//! One run is a sequence of steps. A step is one model turn plus whatever
//! tool calls that turn requested:
//!
//! ```text
//! Starting ──► AwaitingModel ──no tool calls──► Completed (ModelStoppedNaturally)
//!                   │    ▲
//!        tool calls │    │ steps_taken < step_limit
//!                   ▼    │
//!             ExecutingTools ──steps_taken == step_limit──► final turn, no tools
//!                                                            └──► Completed (ToolCallLimitReached)
//!
//! cancelled (checked before every turn and before tools) ──► Aborted
//! model error ──► Error
//! ```
//!
//! Tool calls of one step run concurrently. Their results are appended to
//! the conversation in the order the model requested them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use futures_util::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use super::observer::{RunInfo, RunObserver, TracingObserver};
use super::profile::AgentProfile;
use crate::auth::AuthContext;
use crate::model::{
    FinishReason, ModelError, ModelEvent, ModelHandle, ModelMessage, ModelRequest, ToolInvocation,
    ToolSpec,
};
use crate::stream::StreamSink;
use crate::tools::{ToolError, ToolSet};

/// Shown to the caller when the model fails mid-run
pub const MODEL_FAILURE_NOTICE: &str =
    "Sorry, the assistant ran into a problem talking to the language model. Please try again.";

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model answered without requesting tools
    ModelStoppedNaturally,
    /// The step limit was reached; a final turn without tools was taken
    ToolCallLimitReached,
    /// The caller cancelled
    Aborted,
    /// The model failed
    Error,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::ModelStoppedNaturally => "completed",
            StopReason::ToolCallLimitReached => "step_limit",
            StopReason::Aborted => "aborted",
            StopReason::Error => "error",
        }
    }

    /// Completed runs are the only ones whose text is persisted
    pub fn is_completed(&self) -> bool {
        matches!(
            self,
            StopReason::ModelStoppedNaturally | StopReason::ToolCallLimitReached
        )
    }
}

/// One executed tool call
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    /// Position in the model's request list for this step
    pub index: usize,
    pub id: String,
    pub name: String,
    pub input: Value,
    /// Rendered output, or the error returned to the model
    pub result: Result<String, ToolError>,
    pub elapsed: Duration,
}

impl ToolCallRecord {
    /// Text the model sees for this call
    pub fn model_text(&self) -> String {
        match &self.result {
            Ok(output) => output.clone(),
            Err(e) => format!("Error: {}", e),
        }
    }
}

/// One model turn and the tool calls it requested
#[derive(Debug, Clone, Default)]
pub struct StepRecord {
    pub index: usize,
    /// Text streamed during this turn
    pub text: String,
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Everything the engine needs for one run
pub struct RunInput {
    pub trace_id: String,
    pub profile: Arc<AgentProfile>,
    pub model: ModelHandle,
    pub tools: ToolSet,
    /// Profile prompt plus per-request context
    pub system_prompt: String,
    /// History followed by the new user message
    pub messages: Vec<ModelMessage>,
    pub auth: Option<AuthContext>,
}

/// Result of a run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub stop_reason: StopReason,
    /// Steps that executed tools; never exceeds the profile's step limit
    pub steps_taken: usize,
    /// All model text streamed to the caller, concatenated
    pub text: String,
    pub steps: Vec<StepRecord>,
    pub error: Option<String>,
}

enum Turn {
    Finished {
        text: String,
        calls: Vec<ToolInvocation>,
    },
    Aborted {
        text: String,
    },
    Failed {
        text: String,
        error: ModelError,
    },
}

/// Runs the step loop for one request at a time; shareable across requests
#[derive(Clone)]
pub struct StepEngine {
    observer: Arc<dyn RunObserver>,
}

impl Default for StepEngine {
    fn default() -> Self {
        Self::new(Arc::new(TracingObserver))
    }
}

impl StepEngine {
    pub fn new(observer: Arc<dyn RunObserver>) -> Self {
        Self { observer }
    }

    /// Run the loop, streaming model text into `sink`.
    ///
    /// Never fails: tool errors are fed back to the model, model errors end
    /// the run with [`StopReason::Error`] and a notice in the stream.
    pub async fn run(
        &self,
        input: RunInput,
        sink: &StreamSink,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let span = info_span!(
            "agent_run",
            trace_id = %input.trace_id,
            role = %input.profile.role,
            model = %input.model.name,
            otel.name = "agent_run"
        );
        self.run_inner(input, sink, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        input: RunInput,
        sink: &StreamSink,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let run = RunInfo {
            trace_id: &input.trace_id,
            role: &input.profile.role,
            model: &input.model.name,
        };
        self.observer.run_started(run);

        let step_limit = input.profile.step_limit;
        let tool_specs = input.tools.specs();
        let mut messages = input.messages.clone();
        let mut outcome = RunOutcome {
            stop_reason: StopReason::ModelStoppedNaturally,
            steps_taken: 0,
            text: String::new(),
            steps: Vec::new(),
            error: None,
        };

        loop {
            if cancel.is_cancelled() {
                debug!(steps = outcome.steps_taken, "Cancelled before model turn");
                outcome.stop_reason = StopReason::Aborted;
                break;
            }

            let index = outcome.steps.len();
            let final_turn = outcome.steps_taken >= step_limit;
            let tools = if final_turn {
                Vec::new()
            } else {
                tool_specs.clone()
            };

            let started = Instant::now();
            let turn = self
                .model_turn(&input, &messages, tools, index, sink, cancel)
                .await;
            self.observer
                .model_turn_finished(run, index, started.elapsed());

            let (text, calls) = match turn {
                Turn::Finished { text, calls } => (text, calls),
                Turn::Aborted { text } => {
                    self.finish_step(run, &mut outcome, index, text, Vec::new());
                    outcome.stop_reason = StopReason::Aborted;
                    break;
                }
                Turn::Failed { text, error } => {
                    self.finish_step(run, &mut outcome, index, text, Vec::new());
                    sink.send_notice(MODEL_FAILURE_NOTICE).await;
                    outcome.stop_reason = StopReason::Error;
                    outcome.error = Some(error.to_string());
                    break;
                }
            };

            if final_turn || calls.is_empty() {
                if final_turn && !calls.is_empty() {
                    warn!(ignored = calls.len(), "Tool calls requested after step limit");
                }
                self.finish_step(run, &mut outcome, index, text, Vec::new());
                outcome.stop_reason = if final_turn {
                    StopReason::ToolCallLimitReached
                } else {
                    StopReason::ModelStoppedNaturally
                };
                break;
            }

            if cancel.is_cancelled() {
                debug!(step = index, "Cancelled before tool execution");
                self.finish_step(run, &mut outcome, index, text, Vec::new());
                outcome.stop_reason = StopReason::Aborted;
                break;
            }

            messages.push(ModelMessage::Assistant {
                text: text.clone(),
                tool_calls: calls.clone(),
            });

            let records = self
                .execute_tools(&input.tools, &calls, input.auth.as_ref(), index)
                .await;
            for record in &records {
                self.observer.tool_call_finished(run, index, record);
                messages.push(ModelMessage::Tool {
                    call_id: record.id.clone(),
                    name: record.name.clone(),
                    content: record.model_text(),
                });
            }

            outcome.steps_taken += 1;
            self.finish_step(run, &mut outcome, index, text, records);
        }

        self.observer.run_finished(run, &outcome);
        outcome
    }

    fn finish_step(
        &self,
        run: RunInfo<'_>,
        outcome: &mut RunOutcome,
        index: usize,
        text: String,
        tool_calls: Vec<ToolCallRecord>,
    ) {
        outcome.text.push_str(&text);
        let record = StepRecord {
            index,
            text,
            tool_calls,
        };
        self.observer.step_finished(run, &record);
        outcome.steps.push(record);
    }

    /// Stream one model turn, forwarding text as it arrives
    async fn model_turn(
        &self,
        input: &RunInput,
        messages: &[ModelMessage],
        tools: Vec<ToolSpec>,
        step: usize,
        sink: &StreamSink,
        cancel: &CancellationToken,
    ) -> Turn {
        let span = info_span!(
            "model_call",
            trace_id = %input.trace_id,
            step,
            model = %input.model.name,
            tools = tools.len(),
            otel.name = "model_call"
        );

        async {
            let request = ModelRequest {
                system_prompt: input.system_prompt.clone(),
                messages: messages.to_vec(),
                tools,
                temperature: input.profile.temperature,
            };

            let mut text = String::new();
            let mut calls = Vec::new();

            let mut events = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Turn::Aborted { text },
                started = input.model.model.stream(request) => match started {
                    Ok(events) => events,
                    Err(error) => return Turn::Failed { text, error },
                },
            };

            loop {
                let event = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(step, "Cancelled while streaming");
                        return Turn::Aborted { text };
                    }
                    event = events.next() => event,
                };

                match event {
                    Some(Ok(ModelEvent::TextDelta(delta))) => {
                        sink.send_text(&delta).await;
                        text.push_str(&delta);
                    }
                    Some(Ok(ModelEvent::ToolCall(call))) => {
                        debug!(step, tool = %call.name, id = %call.id, "Model requested tool");
                        calls.push(call);
                    }
                    Some(Ok(ModelEvent::Finish(reason))) => {
                        if reason == FinishReason::Length {
                            warn!(step, "Model turn truncated by length");
                        }
                        return Turn::Finished { text, calls };
                    }
                    Some(Err(error)) => return Turn::Failed { text, error },
                    None => return Turn::Finished { text, calls },
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Fan out every call of a step; fan in by request order
    async fn execute_tools(
        &self,
        tools: &ToolSet,
        calls: &[ToolInvocation],
        auth: Option<&AuthContext>,
        step: usize,
    ) -> Vec<ToolCallRecord> {
        let futures = calls.iter().enumerate().map(|(index, call)| {
            let span = info_span!(
                "tool_call",
                step,
                index,
                tool = %call.name,
                otel.name = "tool_call"
            );
            async move {
                let started = Instant::now();
                let result = tools.dispatch(call, auth).await.map(|out| out.render());
                ToolCallRecord {
                    index,
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.arguments.clone(),
                    result,
                    elapsed: started.elapsed(),
                }
            }
            .instrument(span)
        });
        join_all(futures).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::profiles;
    use crate::model::{ModelGateway, ModelProvider};
    use crate::stream;
    use crate::testing::{text_turn, tool_turn, ScriptedModel, ScriptedProvider};
    use serde_json::json;

    fn input(model: Arc<ScriptedModel>, step_limit: usize) -> RunInput {
        let mut profile = profiles::builtin()
            .get("scrum-master")
            .unwrap()
            .as_ref()
            .clone();
        profile.step_limit = step_limit;
        let provider = ScriptedProvider::with_model(model);
        let mut gateway = ModelGateway::new();
        gateway.register(Arc::new(provider) as Arc<dyn ModelProvider>, ["qwen3:14b"]);
        let handle = gateway.resolve(None, &profile).unwrap();
        RunInput {
            trace_id: "trace".to_string(),
            profile: Arc::new(profile),
            model: handle,
            tools: ToolSet::default(),
            system_prompt: "system".to_string(),
            messages: vec![ModelMessage::user("Plan sprint 3")],
            auth: None,
        }
    }

    #[tokio::test]
    async fn test_plain_answer_completes_naturally() {
        let model = Arc::new(ScriptedModel::new([text_turn("All good.")]));
        let (sink, _stream) = stream::channel(CancellationToken::new());
        let outcome = StepEngine::default()
            .run(input(model, 20), &sink, &CancellationToken::new())
            .await;
        assert_eq!(outcome.stop_reason, StopReason::ModelStoppedNaturally);
        assert_eq!(outcome.steps_taken, 0);
        assert_eq!(outcome.text, "All good.");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fed_back_as_text() {
        let model = Arc::new(ScriptedModel::new([
            tool_turn(&[("c1", "deleteEverything", json!({}))]),
            text_turn("I cannot do that."),
        ]));
        let (sink, _stream) = stream::channel(CancellationToken::new());
        let outcome = StepEngine::default()
            .run(input(Arc::clone(&model), 20), &sink, &CancellationToken::new())
            .await;
        assert_eq!(outcome.stop_reason, StopReason::ModelStoppedNaturally);
        assert_eq!(outcome.steps_taken, 1);

        let second = &model.requests()[1];
        match second.messages.last().unwrap() {
            ModelMessage::Tool { content, .. } => {
                assert!(content.contains("unknown tool: deleteEverything"))
            }
            other => panic!("expected tool result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_model_failure_ends_run_with_error() {
        let model = Arc::new(ScriptedModel::new([text_turn("unused")]).fail_on_turn(1));
        let (sink, _stream) = stream::channel(CancellationToken::new());
        let outcome = StepEngine::default()
            .run(input(model, 20), &sink, &CancellationToken::new())
            .await;
        assert_eq!(outcome.stop_reason, StopReason::Error);
        assert!(outcome.error.is_some());
        assert!(!outcome.stop_reason.is_completed());
    }

    #[tokio::test]
    async fn test_cancel_during_turn_aborts_without_next_call() {
        let cancel = CancellationToken::new();
        let model = Arc::new(
            ScriptedModel::new([text_turn("partial")])
                .with_event_delay(Duration::from_millis(20))
                .cancel_on_turn(1, cancel.clone()),
        );
        let (sink, _stream) = stream::channel(CancellationToken::new());
        let outcome = StepEngine::default()
            .run(input(Arc::clone(&model), 20), &sink, &cancel)
            .await;
        assert_eq!(outcome.stop_reason, StopReason::Aborted);
        assert_eq!(model.turns_taken(), 1);
        assert_eq!(outcome.text, "");
    }
}
