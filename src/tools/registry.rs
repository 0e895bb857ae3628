//! Tool registry - every implemented tool, and per-role subsets of it
//!
//! Profiles name their tools as data. Building a [`ToolSet`] for a profile
//! fails if a listed name has no implementation, so a typo in the role table
//! is caught at startup by [`ToolRegistry::validate_profiles`] rather than
//! at the first chat request.

use std::collections::HashMap;
use std::sync::Arc;

use super::meetings::{ListMeetings, ScheduleMeeting};
use super::sprints::{GetBurndown, GetCurrentActiveSprint, ListSprints};
use super::tasks::{AssignTask, CreateTask, GetSprintTasks, ListProjectTasks, UpdateTaskStatus};
use super::team::{ListProjectMembers, SearchDocs};
use super::{BackendClient, InputValidator, RegisteredTool, Tool, ToolSet};
use crate::agent::{AgentProfile, ProfileTable};

/// Error type for registry construction and lookups
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("role {role} lists tool {tool}, which is not registered")]
    UnknownTool { role: String, tool: String },
    #[error("tool {0} is registered twice")]
    Duplicate(String),
    #[error("tool {tool} has an invalid input schema: {reason}")]
    InvalidSchema { tool: String, reason: String },
}

/// All tools the service implements, keyed by name
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every backend proxy tool
    pub fn with_backend(backend: BackendClient) -> Result<Self, RegistryError> {
        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(GetCurrentActiveSprint::new(backend.clone())),
            Arc::new(ListSprints::new(backend.clone())),
            Arc::new(GetBurndown::new(backend.clone())),
            Arc::new(GetSprintTasks::new(backend.clone())),
            Arc::new(ListProjectTasks::new(backend.clone())),
            Arc::new(CreateTask::new(backend.clone())),
            Arc::new(UpdateTaskStatus::new(backend.clone())),
            Arc::new(AssignTask::new(backend.clone())),
            Arc::new(ListMeetings::new(backend.clone())),
            Arc::new(ScheduleMeeting::new(backend.clone())),
            Arc::new(ListProjectMembers::new(backend.clone())),
            Arc::new(SearchDocs::new(backend)),
        ];

        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    /// Add a tool, compiling its input schema
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        let validator =
            InputValidator::compile(&tool.input_schema()).map_err(|reason| {
                RegistryError::InvalidSchema {
                    tool: name.clone(),
                    reason,
                }
            })?;
        self.tools.insert(
            name,
            RegisteredTool {
                tool,
                validator: Arc::new(validator),
            },
        );
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tools a profile may call
    pub fn tools_for(&self, profile: &AgentProfile) -> Result<ToolSet, RegistryError> {
        let entries = profile
            .tool_names
            .iter()
            .map(|name| {
                self.tools
                    .get(name)
                    .cloned()
                    .ok_or_else(|| RegistryError::UnknownTool {
                        role: profile.role.clone(),
                        tool: name.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ToolSet::new(entries))
    }

    /// Check every profile's tool list against the registry
    pub fn validate_profiles(&self, profiles: &ProfileTable) -> Result<(), RegistryError> {
        for profile in profiles.iter() {
            self.tools_for(profile)?;
        }
        Ok(())
    }
}
