//! Prometheus metrics for agent runs
//!
//! All metrics are registered in the default registry on first use and
//! exported in text format by [`encode_metrics`] (served at `/metrics`).

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // HTTP
    // ─────────────────────────────────────────────────────────────────────────────

    /// Chat and history requests by route and response status.
    pub static ref HTTP_REQUESTS: CounterVec = register_counter_vec!(
        "sprintpilot_http_requests_total",
        "HTTP requests handled, by route and status",
        &["route", "status"]
    ).expect("failed to register HTTP_REQUESTS metric");

    /// Agent runs whose response stream is still open.
    pub static ref REQUESTS_IN_FLIGHT: Gauge = register_gauge!(
        "sprintpilot_requests_in_flight",
        "Agent runs currently streaming"
    ).expect("failed to register REQUESTS_IN_FLIGHT metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Agent runs
    // ─────────────────────────────────────────────────────────────────────────────

    /// Finished runs by role and stop reason.
    ///
    /// Labels:
    /// - role: agent role (e.g. "scrum-master")
    /// - stop_reason: "completed", "step_limit", "aborted", "error"
    pub static ref AGENT_RUNS: CounterVec = register_counter_vec!(
        "sprintpilot_agent_runs_total",
        "Agent runs finished, by role and stop reason",
        &["role", "stop_reason"]
    ).expect("failed to register AGENT_RUNS metric");

    /// Model turns taken, by role.
    pub static ref AGENT_STEPS: CounterVec = register_counter_vec!(
        "sprintpilot_agent_steps_total",
        "Model turns taken by agent runs",
        &["role"]
    ).expect("failed to register AGENT_STEPS metric");

    /// Duration of one model turn, from request to finish event.
    pub static ref MODEL_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "sprintpilot_model_call_duration_seconds",
        "Time spent streaming one model turn",
        &["model"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    ).expect("failed to register MODEL_CALL_DURATION metric");

    /// Requested models that could not be used.
    ///
    /// Labels:
    /// - requested: the model the client asked for, or "uncatalogued"
    /// - resolved: the default model used instead
    pub static ref MODEL_FALLBACKS: CounterVec = register_counter_vec!(
        "sprintpilot_model_fallbacks_total",
        "Requests served by the default model instead of the requested one",
        &["requested", "resolved"]
    ).expect("failed to register MODEL_FALLBACKS metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Tools
    // ─────────────────────────────────────────────────────────────────────────────

    /// Tool executions by tool name and outcome ("ok" or an error kind).
    /// Names the model invented are recorded as "unknown".
    pub static ref TOOL_CALLS: CounterVec = register_counter_vec!(
        "sprintpilot_tool_calls_total",
        "Tool executions, by tool and outcome",
        &["tool", "outcome"]
    ).expect("failed to register TOOL_CALLS metric");

    pub static ref TOOL_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "sprintpilot_tool_call_duration_seconds",
        "Time spent executing one tool call",
        &["tool"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).expect("failed to register TOOL_CALL_DURATION metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────────────

    /// Conversation store writes that failed, by operation.
    pub static ref PERSISTENCE_FAILURES: CounterVec = register_counter_vec!(
        "sprintpilot_persistence_failures_total",
        "Conversation store operations that failed",
        &["operation"]
    ).expect("failed to register PERSISTENCE_FAILURES metric");
}

/// Encode every registered metric in Prometheus text format
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
