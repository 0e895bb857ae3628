//! Integration tests for the step engine
//!
//! The model is scripted; tools are either local test tools or the real
//! backend proxies pointed at a throwaway axum server on 127.0.0.1.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::Router;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use sprintpilot::agent::{profiles, AgentProfile, RunInput, RunOutcome, StepEngine, StopReason};
use sprintpilot::auth::AuthContext;
use sprintpilot::model::{ModelGateway, ModelMessage};
use sprintpilot::stream;
use sprintpilot::testing::{text_turn, tool_turn, ScriptedModel, ScriptedProvider};
use sprintpilot::tools::{
    BackendClient, InputValidator, RegisteredTool, Tool, ToolError, ToolOutput, ToolRegistry,
    ToolSet,
};

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn scrum_master() -> AgentProfile {
    profiles::builtin()
        .get("scrum-master")
        .unwrap()
        .as_ref()
        .clone()
}

fn run_input(profile: AgentProfile, model: Arc<ScriptedModel>, tools: ToolSet) -> RunInput {
    let mut gateway = ModelGateway::new();
    gateway.register(
        Arc::new(ScriptedProvider::with_model(model)),
        [profile.default_model.clone()],
    );
    let handle = gateway.resolve(None, &profile).unwrap();
    RunInput {
        trace_id: "test-trace".to_string(),
        system_prompt: profile.system_prompt.clone(),
        profile: Arc::new(profile),
        model: handle,
        tools,
        messages: vec![ModelMessage::user("Plan sprint 3")],
        auth: AuthContext::from_cookie_header("session=abc"),
    }
}

fn tool_set(tools: Vec<Arc<dyn Tool>>) -> ToolSet {
    ToolSet::new(tools.into_iter().map(|tool| RegisteredTool {
        validator: Arc::new(InputValidator::compile(&tool.input_schema()).unwrap()),
        tool,
    }))
}

/// Run the engine to completion and collect everything streamed
async fn run_collect(input: RunInput, cancel: CancellationToken) -> (RunOutcome, String) {
    let (sink, mut chat_stream) = stream::channel(CancellationToken::new());
    let outcome = StepEngine::default().run(input, &sink, &cancel).await;
    sink.close();
    let mut streamed = Vec::new();
    while let Some(chunk) = chat_stream.next().await {
        streamed.extend_from_slice(&chunk.unwrap());
    }
    (outcome, String::from_utf8(streamed).unwrap())
}

fn tool_results(messages: &[ModelMessage]) -> Vec<(String, String)> {
    messages
        .iter()
        .filter_map(|message| match message {
            ModelMessage::Tool {
                call_id, content, ..
            } => Some((call_id.clone(), content.clone())),
            _ => None,
        })
        .collect()
}

/// Echoes `label` after sleeping `delayMs`
struct Delayed;

#[async_trait]
impl Tool for Delayed {
    fn name(&self) -> &'static str {
        "delayed"
    }

    fn description(&self) -> &'static str {
        "Echo a label after a delay"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "label": {"type": "string"},
                "delayMs": {"type": "integer", "minimum": 0}
            },
            "required": ["label", "delayMs"]
        })
    }

    async fn execute(
        &self,
        input: Value,
        _auth: Option<&AuthContext>,
    ) -> Result<ToolOutput, ToolError> {
        let delay = input["delayMs"].as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(ToolOutput::Text(format!(
            "result {}",
            input["label"].as_str().unwrap_or_default()
        )))
    }
}

/// Cancels the request on its Nth invocation
struct CancelOnCall {
    calls: AtomicUsize,
    at: usize,
    token: CancellationToken,
}

#[async_trait]
impl Tool for CancelOnCall {
    fn name(&self) -> &'static str {
        "listSprints"
    }

    fn description(&self) -> &'static str {
        "List sprints"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    fn requires_auth(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        _input: Value,
        _auth: Option<&AuthContext>,
    ) -> Result<ToolOutput, ToolError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.at {
            self.token.cancel();
        }
        Ok(ToolOutput::Structured(json!([{ "id": n }])))
    }
}

#[derive(Clone, Default)]
struct BackendHits {
    count: Arc<AtomicUsize>,
    cookies: Arc<Mutex<Vec<String>>>,
}

async fn unavailable(State(hits): State<BackendHits>, headers: HeaderMap) -> StatusCode {
    hits.count.fetch_add(1, Ordering::SeqCst);
    if let Some(cookie) = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()) {
        hits.cookies.lock().unwrap().push(cookie.to_string());
    }
    StatusCode::SERVICE_UNAVAILABLE
}

/// A backend that answers 503 to everything
async fn down_backend() -> (BackendClient, BackendHits) {
    let hits = BackendHits::default();
    let app = Router::new().fallback(unavailable).with_state(hits.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let client = BackendClient::new(format!("http://{}/api", addr), Duration::from_secs(2));
    (client, hits)
}

// ─────────────────────────────────────────────────────────────────────────────
// Step limit
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_step_limit_forces_final_turn_without_tools() {
    let turns: Vec<_> = (0..10)
        .map(|i| {
            let id = format!("c{}", i);
            tool_turn(&[(id.as_str(), "delayed", json!({"label": "x", "delayMs": 0}))])
        })
        .collect();
    let model = Arc::new(ScriptedModel::new(turns));
    let mut profile = scrum_master();
    profile.step_limit = 3;

    let input = run_input(profile, Arc::clone(&model), tool_set(vec![Arc::new(Delayed)]));
    let (outcome, _) = run_collect(input, CancellationToken::new()).await;

    assert_eq!(outcome.stop_reason, StopReason::ToolCallLimitReached);
    assert!(outcome.stop_reason.is_completed());
    assert_eq!(outcome.steps_taken, 3);

    let requests = model.requests();
    assert_eq!(requests.len(), 4);
    assert!(requests[..3].iter().all(|r| !r.tools.is_empty()));
    assert!(requests[3].tools.is_empty());
}

#[tokio::test]
async fn test_default_step_limit_is_twenty() {
    let turns: Vec<_> = (0..30)
        .map(|i| {
            let id = format!("c{}", i);
            tool_turn(&[(id.as_str(), "delayed", json!({"label": "x", "delayMs": 0}))])
        })
        .collect();
    let model = Arc::new(ScriptedModel::new(turns));

    let input = run_input(scrum_master(), Arc::clone(&model), tool_set(vec![Arc::new(Delayed)]));
    let (outcome, _) = run_collect(input, CancellationToken::new()).await;

    assert_eq!(outcome.stop_reason, StopReason::ToolCallLimitReached);
    assert_eq!(outcome.steps_taken, 20);
    assert_eq!(model.turns_taken(), 21);
}

// ─────────────────────────────────────────────────────────────────────────────
// Ordering
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_tool_results_follow_request_order_not_completion_order() {
    // Completion order is C, A, B
    let model = Arc::new(ScriptedModel::new([
        tool_turn(&[
            ("call-a", "delayed", json!({"label": "A", "delayMs": 60})),
            ("call-b", "delayed", json!({"label": "B", "delayMs": 120})),
            ("call-c", "delayed", json!({"label": "C", "delayMs": 0})),
        ]),
        text_turn("Summary."),
    ]));

    let input = run_input(scrum_master(), Arc::clone(&model), tool_set(vec![Arc::new(Delayed)]));
    let (outcome, streamed) = run_collect(input, CancellationToken::new()).await;

    assert_eq!(outcome.stop_reason, StopReason::ModelStoppedNaturally);
    assert_eq!(streamed, "Summary.");

    let second_turn = &model.requests()[1];
    assert_eq!(
        tool_results(&second_turn.messages),
        vec![
            ("call-a".to_string(), "result A".to_string()),
            ("call-b".to_string(), "result B".to_string()),
            ("call-c".to_string(), "result C".to_string()),
        ]
    );
    match &second_turn.messages[1] {
        ModelMessage::Assistant { tool_calls, .. } => assert_eq!(tool_calls.len(), 3),
        other => panic!("expected assistant tool-call message, got {:?}", other),
    }

    let indices: Vec<usize> = outcome.steps[0].tool_calls.iter().map(|c| c.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_invalid_input_is_returned_to_model() {
    let model = Arc::new(ScriptedModel::new([
        tool_turn(&[("c1", "delayed", json!({"label": 5}))]),
        text_turn("Let me fix that."),
    ]));
    let input = run_input(scrum_master(), Arc::clone(&model), tool_set(vec![Arc::new(Delayed)]));
    let (outcome, _) = run_collect(input, CancellationToken::new()).await;

    assert_eq!(outcome.stop_reason, StopReason::ModelStoppedNaturally);
    let results = tool_results(&model.requests()[1].messages);
    assert!(results[0].1.starts_with("Error: invalid input"));
    assert!(matches!(
        outcome.steps[0].tool_calls[0].result,
        Err(ToolError::InvalidInput(_))
    ));
}

// ─────────────────────────────────────────────────────────────────────────────
// Cancellation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_abort_after_step_two_of_five() {
    let cancel = CancellationToken::new();
    let turns: Vec<_> = ["one ", "two ", "three ", "four ", "five "]
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let mut events = vec![sprintpilot::model::ModelEvent::TextDelta(text.to_string())];
            let id = format!("c{}", i);
            events.extend(tool_turn(&[(id.as_str(), "listSprints", json!({}))]));
            events
        })
        .collect();
    let model = Arc::new(ScriptedModel::new(turns));
    let tools = tool_set(vec![Arc::new(CancelOnCall {
        calls: AtomicUsize::new(0),
        at: 2,
        token: cancel.clone(),
    })]);

    let input = run_input(scrum_master(), Arc::clone(&model), tools);
    let (outcome, streamed) = run_collect(input, cancel).await;

    assert_eq!(outcome.stop_reason, StopReason::Aborted);
    assert_eq!(model.turns_taken(), 2, "no step-3 model call");
    assert_eq!(outcome.steps_taken, 2);
    assert_eq!(streamed, "one two ");
    assert_eq!(outcome.text, "one two ");
}

#[tokio::test]
async fn test_cancel_before_start_issues_no_model_call() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let model = Arc::new(ScriptedModel::new([text_turn("never")]));
    let input = run_input(scrum_master(), Arc::clone(&model), ToolSet::default());
    let (outcome, streamed) = run_collect(input, cancel).await;

    assert_eq!(outcome.stop_reason, StopReason::Aborted);
    assert_eq!(model.turns_taken(), 0);
    assert!(streamed.is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend failures and auth
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_backend_down_still_completes() {
    let (backend, hits) = down_backend().await;
    let registry = ToolRegistry::with_backend(backend).unwrap();
    let profile = scrum_master();
    let tools = registry.tools_for(&profile).unwrap();

    let model = Arc::new(ScriptedModel::new([
        tool_turn(&[("c1", "getCurrentActiveSprint", json!({"projectId": 1}))]),
        text_turn("The backend is unavailable right now."),
    ]));
    let input = run_input(profile, Arc::clone(&model), tools);
    let (outcome, streamed) = run_collect(input, CancellationToken::new()).await;

    assert_eq!(outcome.stop_reason, StopReason::ModelStoppedNaturally);
    assert_eq!(streamed, "The backend is unavailable right now.");
    assert_eq!(hits.count.load(Ordering::SeqCst), 1);
    assert_eq!(hits.cookies.lock().unwrap().as_slice(), ["session=abc"]);

    let results = tool_results(&model.requests()[1].messages);
    assert_eq!(results.len(), 1);
    assert!(results[0].1.contains("backend unavailable"), "{}", results[0].1);
}

#[tokio::test]
async fn test_missing_auth_fails_fast_without_backend_call() {
    let (backend, hits) = down_backend().await;
    let registry = ToolRegistry::with_backend(backend).unwrap();
    let profile = scrum_master();
    let tools = registry.tools_for(&profile).unwrap();

    let model = Arc::new(ScriptedModel::new([
        tool_turn(&[("c1", "getCurrentActiveSprint", json!({"projectId": 1}))]),
        text_turn("Please sign in."),
    ]));
    let mut input = run_input(profile, Arc::clone(&model), tools);
    input.auth = None;
    let (outcome, _) = run_collect(input, CancellationToken::new()).await;

    assert_eq!(outcome.stop_reason, StopReason::ModelStoppedNaturally);
    assert_eq!(hits.count.load(Ordering::SeqCst), 0);
    assert!(matches!(
        outcome.steps[0].tool_calls[0].result,
        Err(ToolError::MissingAuth)
    ));
}
