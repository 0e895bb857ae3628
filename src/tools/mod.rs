//! Tools exposed to the model
//!
//! Every tool is a thin proxy over one or more backend REST endpoints. The
//! dispatch contract lives in [`ToolSet::dispatch`]:
//!
//! 1. unknown tool names come back as [`ToolError::UnknownTool`]
//! 2. input is validated against the tool's JSON Schema
//! 3. a missing [`AuthContext`] fails fast with [`ToolError::MissingAuth`]
//! 4. only then does the tool run, receiving the credential unchanged
//!
//! Failures are values. The step engine renders them as text for the model,
//! so a broken backend never aborts a run.

pub mod backend;
pub mod meetings;
pub mod registry;
pub mod schema;
pub mod sprints;
pub mod tasks;
pub mod team;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::AuthContext;
use crate::model::{ToolInvocation, ToolSpec};

pub use backend::BackendClient;
pub use registry::{RegistryError, ToolRegistry};
pub use schema::InputValidator;

/// Output of a successful tool call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Ready-to-read text
    Text(String),
    /// Structured data, rendered as pretty JSON for the model
    Structured(Value),
}

impl ToolOutput {
    /// Text the model sees as the tool result
    pub fn render(&self) -> String {
        match self {
            ToolOutput::Text(text) => text.clone(),
            ToolOutput::Structured(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }
}

/// Error type for tool calls
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    /// Input did not match the tool's schema
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The request carried no credential to forward
    #[error("not authenticated: sign in again to use this tool")]
    MissingAuth,
    /// Backend unreachable or failing (transport error or 5xx)
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    /// Backend rejected the call (4xx)
    #[error("backend returned {status}: {message}")]
    Backend { status: u16, message: String },
    /// The model asked for a tool this agent does not have
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

impl ToolError {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::InvalidInput(_) => "invalid_input",
            ToolError::MissingAuth => "missing_auth",
            ToolError::BackendUnavailable(_) => "backend_unavailable",
            ToolError::Backend { .. } => "backend_error",
            ToolError::UnknownTool(_) => "unknown_tool",
        }
    }
}

/// A schema-validated function the model can call
///
/// Implementations must not keep mutable state shared between calls; several
/// tools of the same step run concurrently.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to call the tool
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON Schema for the input object
    fn input_schema(&self) -> Value;

    /// Whether the tool needs a forwarded credential. Every backend proxy does.
    fn requires_auth(&self) -> bool {
        true
    }

    /// Run the tool. `input` has already been validated against
    /// [`Tool::input_schema`].
    async fn execute(&self, input: Value, auth: Option<&AuthContext>)
        -> Result<ToolOutput, ToolError>;
}

/// A tool together with its compiled input validator
#[derive(Clone)]
pub struct RegisteredTool {
    pub tool: Arc<dyn Tool>,
    pub validator: Arc<InputValidator>,
}

/// The tools available to one agent for one request
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolSet {
    pub fn new(tools: impl IntoIterator<Item = RegisteredTool>) -> Self {
        Self {
            tools: tools
                .into_iter()
                .map(|entry| (entry.tool.name().to_string(), entry))
                .collect(),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool descriptions to advertise to the model, sorted by name
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|entry| ToolSpec {
                name: entry.tool.name().to_string(),
                description: entry.tool.description().to_string(),
                parameters: entry.tool.input_schema(),
            })
            .collect()
    }

    /// Run a single tool call through the dispatch contract
    pub async fn dispatch(
        &self,
        call: &ToolInvocation,
        auth: Option<&AuthContext>,
    ) -> Result<ToolOutput, ToolError> {
        let entry = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;

        entry.validator.validate(&call.arguments)?;

        if entry.tool.requires_auth() && auth.is_none() {
            return Err(ToolError::MissingAuth);
        }

        entry.tool.execute(call.arguments.clone(), auth).await
    }
}

/// Pull a required integer argument out of validated input
pub(crate) fn int_arg(input: &Value, key: &str) -> Result<i64, ToolError> {
    input
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| ToolError::InvalidInput(format!("{} must be an integer", key)))
}

/// Pull a required string argument out of validated input
pub(crate) fn str_arg<'a>(input: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    input
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidInput(format!("{} must be a string", key)))
}
