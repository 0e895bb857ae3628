//! SprintPilot - multi-agent conversational core for a Scrum workspace
//!
//! Turns a user chat message into a bounded, cancellable sequence of model
//! calls interleaved with tool executions against the project-management
//! backend, streams text back while the loop runs, and persists the
//! conversation.
//!
//! # Modules
//!
//! - `agent` - role profiles and the bounded step loop
//! - `model` - provider-neutral model interface and resolution with fallback
//! - `ollama` - Ollama `/api/chat` provider
//! - `tools` - backend-proxy tools, per-role registry, dispatch contract
//! - `auth` - the forwarded request credential
//! - `store` - conversation persistence (backend REST or in-memory)
//! - `stream` - single text stream per request with drop-to-cancel
//! - `attachments` - file parts resolved for the model
//! - `runtime` - per-request façade
//! - `server` - axum routes
//! - `config`, `metrics`, `tracing` - service plumbing
//! - `testing` - scripted model doubles
//!
//! # Quick Start
//!
//! ```ignore
//! use sprintpilot::{agent::profiles, AgentRuntime, ModelGateway, ToolRegistry};
//!
//! let runtime = Arc::new(AgentRuntime::new(profiles::builtin(), gateway, registry, store));
//! let reply = runtime.chat("scrum-master", request, auth).await?;
//! ```

pub mod agent;
pub mod attachments;
pub mod auth;
pub mod config;
pub mod metrics;
pub mod model;
pub mod ollama;
pub mod runtime;
pub mod server;
pub mod store;
pub mod stream;
pub mod testing;
pub mod tools;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use agent::{AgentProfile, StepEngine, StopReason};
pub use auth::AuthContext;
pub use config::ServerConfig;
pub use model::ModelGateway;
pub use runtime::{AgentRuntime, ChatReply, ChatRequest, RuntimeError};
pub use store::{ConversationStore, HttpConversationStore, InMemoryConversationStore};
pub use tools::ToolRegistry;
