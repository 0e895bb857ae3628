//! Task tools

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::sprints::sprint_schema;
use super::{int_arg, str_arg, BackendClient, Tool, ToolError, ToolOutput};
use crate::auth::AuthContext;

/// Board columns a task can be in
const TASK_STATUSES: &[&str] = &["todo", "in_progress", "in_review", "done"];

/// Tasks planned into a sprint
pub struct GetSprintTasks {
    backend: BackendClient,
}

impl GetSprintTasks {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for GetSprintTasks {
    fn name(&self) -> &'static str {
        "getSprintTasks"
    }

    fn description(&self) -> &'static str {
        "List the tasks planned into a sprint with their status, assignee and story points."
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
        let tasks = self
            .backend
            .get(&format!("/sprints/{}/tasks", sprint_id), auth)
            .await?;
        Ok(ToolOutput::Structured(tasks))
    }
}

/// Project backlog, optionally filtered by status
pub struct ListProjectTasks {
    backend: BackendClient,
}

impl ListProjectTasks {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for ListProjectTasks {
    fn name(&self) -> &'static str {
        "listProjectTasks"
    }

    fn description(&self) -> &'static str {
        "List the tasks of a project, optionally only those with a given status."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "projectId": { "type": "integer" },
                "status": { "type": "string", "enum": TASK_STATUSES }
            },
            "required": ["projectId"]
        })
    }

    async fn execute(
        &self,
        input: Value,
        auth: Option<&AuthContext>,
    ) -> Result<ToolOutput, ToolError> {
        let project_id = int_arg(&input, "projectId")?;
        let path = format!("/projects/{}/tasks", project_id);
        let tasks = match input.get("status").and_then(Value::as_str) {
            Some(status) => {
                self.backend
                    .get_query(&path, &[("status", status)], auth)
                    .await?
            }
            None => self.backend.get(&path, auth).await?,
        };
        Ok(ToolOutput::Structured(tasks))
    }
}

/// Create a backlog item
pub struct CreateTask {
    backend: BackendClient,
}

impl CreateTask {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for CreateTask {
    fn name(&self) -> &'static str {
        "createTask"
    }

    fn description(&self) -> &'static str {
        "Create a task in a project, optionally planned into a sprint."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "projectId": { "type": "integer" },
                "title": { "type": "string", "minLength": 1 },
                "description": { "type": "string" },
                "sprintId": { "type": "integer" },
                "storyPoints": { "type": "integer", "minimum": 0 }
            },
            "required": ["projectId", "title"]
        })
    }

    async fn execute(
        &self,
        input: Value,
        auth: Option<&AuthContext>,
    ) -> Result<ToolOutput, ToolError> {
        let project_id = int_arg(&input, "projectId")?;
        let mut body = Map::new();
        body.insert("title".to_string(), json!(str_arg(&input, "title")?));
        for key in ["description", "sprintId", "storyPoints"] {
            if let Some(value) = input.get(key) {
                body.insert(key.to_string(), value.clone());
            }
        }
        let created = self
            .backend
            .post(
                &format!("/projects/{}/tasks", project_id),
                &Value::Object(body),
                auth,
            )
            .await?;
        let id = created.get("id").map(Value::to_string).unwrap_or_else(|| "?".to_string());
        Ok(ToolOutput::Text(format!(
            "Created task {} \"{}\" in project {}.",
            id,
            str_arg(&input, "title")?,
            project_id
        )))
    }
}

/// Move a task to another board column
pub struct UpdateTaskStatus {
    backend: BackendClient,
}

impl UpdateTaskStatus {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for UpdateTaskStatus {
    fn name(&self) -> &'static str {
        "updateTaskStatus"
    }

    fn description(&self) -> &'static str {
        "Change the status of a task (todo, in_progress, in_review, done)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "taskId": { "type": "integer" },
                "status": { "type": "string", "enum": TASK_STATUSES }
            },
            "required": ["taskId", "status"]
        })
    }

    async fn execute(
        &self,
        input: Value,
        auth: Option<&AuthContext>,
    ) -> Result<ToolOutput, ToolError> {
        let task_id = int_arg(&input, "taskId")?;
        let status = str_arg(&input, "status")?;
        self.backend
            .patch(&format!("/tasks/{}", task_id), &json!({ "status": status }), auth)
            .await?;
        Ok(ToolOutput::Text(format!("Task {} is now {}.", task_id, status)))
    }
}

/// Assign a task to a team member
pub struct AssignTask {
    backend: BackendClient,
}

impl AssignTask {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for AssignTask {
    fn name(&self) -> &'static str {
        "assignTask"
    }

    fn description(&self) -> &'static str {
        "Assign a task to a project member. Use listProjectMembers to find user ids."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "taskId": { "type": "integer" },
                "userId": { "type": "integer" }
            },
            "required": ["taskId", "userId"]
        })
    }

    async fn execute(
        &self,
        input: Value,
        auth: Option<&AuthContext>,
    ) -> Result<ToolOutput, ToolError> {
        let task_id = int_arg(&input, "taskId")?;
        let user_id = int_arg(&input, "userId")?;
        self.backend
            .patch(
                &format!("/tasks/{}", task_id),
                &json!({ "assigneeId": user_id }),
                auth,
            )
            .await?;
        Ok(ToolOutput::Text(format!(
            "Task {} is now assigned to user {}.",
            task_id, user_id
        )))
    }
}
