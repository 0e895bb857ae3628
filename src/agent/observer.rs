//! Lifecycle hooks for agent runs
//!
//! Tool calls never reach the caller's text stream. Observers are where they
//! surface instead: logs, metrics, or a test recorder.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::engine::{RunOutcome, StepRecord, ToolCallRecord};
use crate::tools::ToolError;
use crate::metrics::{
    AGENT_RUNS, AGENT_STEPS, MODEL_CALL_DURATION, TOOL_CALLS, TOOL_CALL_DURATION,
};

/// Identity of the run an event belongs to
#[derive(Debug, Clone, Copy)]
pub struct RunInfo<'a> {
    pub trace_id: &'a str,
    pub role: &'a str,
    pub model: &'a str,
}

/// Receives step and tool-call lifecycle events. Every hook defaults to a no-op.
pub trait RunObserver: Send + Sync {
    fn run_started(&self, _run: RunInfo<'_>) {}

    /// A model turn finished streaming (successfully or not)
    fn model_turn_finished(&self, _run: RunInfo<'_>, _step: usize, _elapsed: Duration) {}

    fn tool_call_finished(&self, _run: RunInfo<'_>, _step: usize, _call: &ToolCallRecord) {}

    fn step_finished(&self, _run: RunInfo<'_>, _step: &StepRecord) {}

    fn run_finished(&self, _run: RunInfo<'_>, _outcome: &RunOutcome) {}
}

/// Metric label for a call's tool. Names outside the role's tool set come
/// from the model and share one label.
fn tool_label(call: &ToolCallRecord) -> &str {
    match &call.result {
        Err(ToolError::UnknownTool(_)) => "unknown",
        _ => call.name.as_str(),
    }
}

/// Logs through `tracing` and records Prometheus metrics
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RunObserver for TracingObserver {
    fn run_started(&self, run: RunInfo<'_>) {
        info!(trace_id = %run.trace_id, role = run.role, model = run.model, "Agent run started");
    }

    fn model_turn_finished(&self, run: RunInfo<'_>, step: usize, elapsed: Duration) {
        MODEL_CALL_DURATION
            .with_label_values(&[run.model])
            .observe(elapsed.as_secs_f64());
        AGENT_STEPS.with_label_values(&[run.role]).inc();
        debug!(
            trace_id = %run.trace_id,
            step,
            duration_ms = elapsed.as_secs_f64() * 1000.0,
            "Model turn finished"
        );
    }

    fn tool_call_finished(&self, run: RunInfo<'_>, step: usize, call: &ToolCallRecord) {
        let outcome = match &call.result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        let tool = tool_label(call);
        TOOL_CALLS.with_label_values(&[tool, outcome]).inc();
        TOOL_CALL_DURATION
            .with_label_values(&[tool])
            .observe(call.elapsed.as_secs_f64());
        match &call.result {
            Ok(_) => debug!(trace_id = %run.trace_id, step, tool = %call.name, "Tool call succeeded"),
            Err(e) => warn!(trace_id = %run.trace_id, step, tool = %call.name, error = %e, "Tool call failed"),
        }
    }

    fn step_finished(&self, run: RunInfo<'_>, step: &StepRecord) {
        debug!(
            trace_id = %run.trace_id,
            step = step.index,
            tool_calls = step.tool_calls.len(),
            text_len = step.text.len(),
            "Step finished"
        );
    }

    fn run_finished(&self, run: RunInfo<'_>, outcome: &RunOutcome) {
        AGENT_RUNS
            .with_label_values(&[run.role, outcome.stop_reason.as_str()])
            .inc();
        match &outcome.error {
            Some(error) => warn!(
                trace_id = %run.trace_id,
                steps = outcome.steps_taken,
                error = %error,
                "Agent run failed"
            ),
            None => info!(
                trace_id = %run.trace_id,
                steps = outcome.steps_taken,
                stop_reason = outcome.stop_reason.as_str(),
                "Agent run finished"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::encode_metrics;
    use serde_json::json;

    fn record(name: &str, result: Result<String, ToolError>) -> ToolCallRecord {
        ToolCallRecord {
            index: 0,
            id: "call_1".to_string(),
            name: name.to_string(),
            input: json!({}),
            result,
            elapsed: Duration::from_millis(3),
        }
    }

    #[test]
    fn test_invented_tool_names_share_one_series() {
        let run = RunInfo {
            trace_id: "trace",
            role: "developer",
            model: "qwen3",
        };
        for i in 0..100 {
            let name = format!("inventedTool{}", i);
            let call = record(&name, Err(ToolError::UnknownTool(name.clone())));
            TracingObserver.tool_call_finished(run, 0, &call);
        }
        TracingObserver.tool_call_finished(run, 0, &record("listSprints", Ok("[]".to_string())));

        let exposition = encode_metrics();
        assert!(!exposition.contains("inventedTool"));
        assert!(exposition.contains("tool=\"unknown\""));
        assert!(exposition.contains("tool=\"listSprints\""));
    }
}
