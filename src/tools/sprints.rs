//! Sprint tools

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{int_arg, BackendClient, Tool, ToolError, ToolOutput};
use crate::auth::AuthContext;

/// Active sprint of a project, summarised as text
pub struct GetCurrentActiveSprint {
    backend: BackendClient,
}

impl GetCurrentActiveSprint {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for GetCurrentActiveSprint {
    fn name(&self) -> &'static str {
        "getCurrentActiveSprint"
    }

    fn description(&self) -> &'static str {
        "Get the sprint that is currently active for a project, including its goal and dates."
    }

    fn input_schema(&self) -> Value {
        project_schema()
    }

    async fn execute(
        &self,
        input: Value,
        auth: Option<&AuthContext>,
    ) -> Result<ToolOutput, ToolError> {
        let project_id = int_arg(&input, "projectId")?;
        let sprint = self
            .backend
            .get(&format!("/projects/{}/sprints/active", project_id), auth)
            .await?;
        Ok(ToolOutput::Text(describe_sprint(project_id, &sprint)))
    }
}

/// All sprints of a project
pub struct ListSprints {
    backend: BackendClient,
}

impl ListSprints {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for ListSprints {
    fn name(&self) -> &'static str {
        "listSprints"
    }

    fn description(&self) -> &'static str {
        "List every sprint of a project, past and planned."
    }

    fn input_schema(&self) -> Value {
        project_schema()
    }

    async fn execute(
        &self,
        input: Value,
        auth: Option<&AuthContext>,
    ) -> Result<ToolOutput, ToolError> {
        let project_id = int_arg(&input, "projectId")?;
        let sprints = self
            .backend
            .get(&format!("/projects/{}/sprints", project_id), auth)
            .await?;
        Ok(ToolOutput::Structured(sprints))
    }
}

/// Burndown series of a sprint
pub struct GetBurndown {
    backend: BackendClient,
}

impl GetBurndown {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for GetBurndown {
    fn name(&self) -> &'static str {
        "getBurndown"
    }

    fn description(&self) -> &'static str {
        "Get the burndown of a sprint: remaining story points per day against the ideal line."
    }

    fn input_schema(&self) -> Value {
        sprint_schema()
    }

    async fn execute(
        &self,
        input: Value,
        auth: Option<&AuthContext>,
    ) -> Result<ToolOutput, ToolError> {
        let sprint_id = int_arg(&input, "sprintId")?;
        let burndown = self
            .backend
            .get(&format!("/sprints/{}/burndown", sprint_id), auth)
            .await?;
        Ok(ToolOutput::Structured(burndown))
    }
}

pub(crate) fn project_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "projectId": { "type": "integer", "description": "Project identifier" }
        },
        "required": ["projectId"]
    })
}

pub(crate) fn sprint_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "sprintId": { "type": "integer", "description": "Sprint identifier" }
        },
        "required": ["sprintId"]
    })
}

fn describe_sprint(project_id: i64, sprint: &Value) -> String {
    if sprint.is_null() {
        return format!("Project {} has no active sprint.", project_id);
    }
    let field = |key: &str| sprint.get(key).and_then(Value::as_str).unwrap_or("unknown");
    let mut text = format!(
        "Active sprint: {} (id {}), {} to {}.",
        field("name"),
        sprint.get("id").map(Value::to_string).unwrap_or_else(|| "?".to_string()),
        field("startDate"),
        field("endDate"),
    );
    if let Some(goal) = sprint.get("goal").and_then(Value::as_str) {
        if !goal.is_empty() {
            text.push_str(&format!("\nGoal: {}", goal));
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_no_active_sprint() {
        assert_eq!(
            describe_sprint(7, &Value::Null),
            "Project 7 has no active sprint."
        );
    }

    #[test]
    fn test_describe_sprint() {
        let sprint = json!({
            "id": 3,
            "name": "Sprint 3",
            "startDate": "2026-10-05",
            "endDate": "2026-10-19",
            "goal": "Ship the billing page"
        });
        let text = describe_sprint(7, &sprint);
        assert!(text.starts_with("Active sprint: Sprint 3 (id 3), 2026-10-05 to 2026-10-19."));
        assert!(text.ends_with("Goal: Ship the billing page"));
    }
}
