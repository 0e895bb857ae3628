//! Agent module - role profiles and the bounded step loop
//!
//! This module provides the agent loop that orchestrates:
//! - Model turns through a resolved [`crate::model::ModelHandle`]
//! - Tool calls dispatched through a role's [`crate::tools::ToolSet`]
//! - Text deltas forwarded to the caller's stream as they arrive
//!
//! # Architecture
//!
//! ```text
//! User message → StepEngine → model turn (with tools)
//!                    ↓
//!          Tool calls requested? ── no ──→ Completed
//!                    ↓ yes
//!          Run all calls concurrently (AuthContext forwarded)
//!                    ↓
//!          Append results in request order
//!                    ↓
//!          Step limit reached? ── yes ──→ final turn without tools → Completed
//!                    ↓ no
//!          Cancelled? ── yes ──→ Aborted
//!                    ↓ no
//!          Next model turn
//! ```

pub mod engine;
pub mod observer;
pub mod profile;

pub use engine::{RunInput, RunOutcome, StepEngine, StepRecord, StopReason, ToolCallRecord};
pub use observer::{RunObserver, TracingObserver};
pub use profile::{AgentProfile, ProfileTable, TaskClass, DEFAULT_STEP_LIMIT};

/// Built-in role table, re-exported for `agent::profiles::builtin()`
pub mod profiles {
    pub use super::profile::{builtin, tools_for_role, ROLE_TOOLS};
}
