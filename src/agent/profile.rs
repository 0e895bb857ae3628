//! Agent profiles - static per-role configuration
//!
//! Each conversational role gets a system prompt, the names of the tools it
//! may call, and its model policy. The role → tools mapping is plain data
//! ([`ROLE_TOOLS`]) so it can be checked against the tool registry at startup.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;

/// Default number of tool steps a run may take
pub const DEFAULT_STEP_LIMIT: usize = 20;

/// Kind of work a role mostly does; drives the model's context budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskClass {
    Chat,
    Analysis,
}

impl TaskClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskClass::Chat => "chat",
            TaskClass::Analysis => "analysis",
        }
    }
}

/// Immutable configuration for one agent role
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentProfile {
    pub role: String,
    pub system_prompt: String,
    pub tool_names: BTreeSet<String>,
    pub default_model: String,
    pub temperature: f32,
    pub task_class: TaskClass,
    pub step_limit: usize,
}

/// Role → tool names
pub const ROLE_TOOLS: &[(&str, &[&str])] = &[
    (
        "developer",
        &[
            "getCurrentActiveSprint",
            "getSprintTasks",
            "listProjectTasks",
            "createTask",
            "updateTaskStatus",
            "assignTask",
            "searchDocs",
        ],
    ),
    (
        "scrum-master",
        &[
            "getCurrentActiveSprint",
            "listSprints",
            "getSprintTasks",
            "listProjectTasks",
            "createTask",
            "updateTaskStatus",
            "assignTask",
            "listMeetings",
            "scheduleMeeting",
            "listProjectMembers",
            "getBurndown",
        ],
    ),
    (
        "support",
        &["getCurrentActiveSprint", "listProjectTasks", "listMeetings", "searchDocs"],
    ),
];

const DEVELOPER_PROMPT: &str = r#"You are a developer assistant embedded in a Scrum project-management tool.

You help engineers understand what they are working on in the current sprint and keep the board up to date.

Guidelines:
- Look things up with the tools instead of guessing sprint or task details
- Only change task status or assignment when the user asks for it
- If a tool returns an error, tell the user what failed in plain words
- Keep answers short and concrete"#;

const SCRUM_MASTER_PROMPT: &str = r#"You are a Scrum Master assistant for an agile team.

You help plan and run sprints: review progress, spot risks, organise ceremonies and keep the backlog tidy.

Guidelines:
- Ground every statement about the sprint in tool results
- When asked to plan, propose concrete tasks and owners before creating anything
- Use the burndown to judge whether the sprint goal is at risk
- If a tool returns an error, explain the impact and suggest a next step"#;

const SUPPORT_PROMPT: &str = r#"You are the support assistant of a Scrum project-management tool.

You answer questions about how the tool works and about the state of the user's project.

Guidelines:
- Prefer the documentation search for "how do I" questions
- You can read sprints, tasks and meetings but you cannot change them
- If something fails, apologise briefly and describe what the user can try"#;

/// Lookup table of agent profiles keyed by role
#[derive(Debug, Clone, Default)]
pub struct ProfileTable {
    profiles: HashMap<String, Arc<AgentProfile>>,
}

impl ProfileTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, profile: AgentProfile) {
        self.profiles
            .insert(profile.role.clone(), Arc::new(profile));
    }

    pub fn get(&self, role: &str) -> Option<&Arc<AgentProfile>> {
        self.profiles.get(role)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<AgentProfile>> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Tool names for `role` from [`ROLE_TOOLS`]
pub fn tools_for_role(role: &str) -> BTreeSet<String> {
    ROLE_TOOLS
        .iter()
        .find(|(name, _)| *name == role)
        .map(|(_, tools)| tools.iter().map(|t| t.to_string()).collect())
        .unwrap_or_default()
}

/// The profiles shipped with the service
pub fn builtin() -> ProfileTable {
    let mut table = ProfileTable::new();
    table.insert(AgentProfile {
        role: "developer".to_string(),
        system_prompt: DEVELOPER_PROMPT.to_string(),
        tool_names: tools_for_role("developer"),
        default_model: "qwen3".to_string(),
        temperature: 0.2,
        task_class: TaskClass::Chat,
        step_limit: DEFAULT_STEP_LIMIT,
    });
    table.insert(AgentProfile {
        role: "scrum-master".to_string(),
        system_prompt: SCRUM_MASTER_PROMPT.to_string(),
        tool_names: tools_for_role("scrum-master"),
        default_model: "qwen3:14b".to_string(),
        temperature: 0.3,
        task_class: TaskClass::Analysis,
        step_limit: DEFAULT_STEP_LIMIT,
    });
    table.insert(AgentProfile {
        role: "support".to_string(),
        system_prompt: SUPPORT_PROMPT.to_string(),
        tool_names: tools_for_role("support"),
        default_model: "llama3.2".to_string(),
        temperature: 0.5,
        task_class: TaskClass::Chat,
        step_limit: DEFAULT_STEP_LIMIT,
    });
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_roles() {
        let table = builtin();
        assert_eq!(table.len(), 3);
        for role in ["developer", "scrum-master", "support"] {
            let profile = table.get(role).unwrap();
            assert_eq!(profile.role, role);
            assert_eq!(profile.step_limit, DEFAULT_STEP_LIMIT);
            assert!(!profile.tool_names.is_empty());
        }
    }

    #[test]
    fn test_support_cannot_mutate_board() {
        let tools = tools_for_role("support");
        assert!(!tools.contains("createTask"));
        assert!(!tools.contains("updateTaskStatus"));
        assert!(tools.contains("searchDocs"));
    }

    #[test]
    fn test_unknown_role_has_no_tools() {
        assert!(tools_for_role("product-owner").is_empty());
    }

    #[test]
    fn test_scrum_master_is_analysis() {
        let table = builtin();
        assert_eq!(table.get("scrum-master").unwrap().task_class, TaskClass::Analysis);
    }
}
