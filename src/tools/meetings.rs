//! Meeting tools

use async_trait::async_trait;
use serde_json::{json, Value};

use super::sprints::project_schema;
use super::{int_arg, str_arg, BackendClient, Tool, ToolError, ToolOutput};
use crate::auth::AuthContext;

/// Upcoming and past meetings of a project
pub struct ListMeetings {
    backend: BackendClient,
}

impl ListMeetings {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for ListMeetings {
    fn name(&self) -> &'static str {
        "listMeetings"
    }

    fn description(&self) -> &'static str {
        "List the meetings (dailies, plannings, reviews, retrospectives) of a project."
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
        let meetings = self
            .backend
            .get(&format!("/projects/{}/meetings", project_id), auth)
            .await?;
        Ok(ToolOutput::Structured(meetings))
    }
}

/// Put a Scrum ceremony on the calendar
pub struct ScheduleMeeting {
    backend: BackendClient,
}

impl ScheduleMeeting {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for ScheduleMeeting {
    fn name(&self) -> &'static str {
        "scheduleMeeting"
    }

    fn description(&self) -> &'static str {
        "Schedule a meeting for a project. startTime is an ISO-8601 date-time."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "projectId": { "type": "integer" },
                "title": { "type": "string", "minLength": 1 },
                "type": {
                    "type": "string",
                    "enum": ["daily", "planning", "review", "retrospective", "other"]
                },
                "startTime": { "type": "string", "minLength": 1 },
                "durationMinutes": { "type": "integer", "minimum": 5, "maximum": 480 }
            },
            "required": ["projectId", "title", "type", "startTime"]
        })
    }

    async fn execute(
        &self,
        input: Value,
        auth: Option<&AuthContext>,
    ) -> Result<ToolOutput, ToolError> {
        let project_id = int_arg(&input, "projectId")?;
        let start_time = str_arg(&input, "startTime")?;
        chrono::DateTime::parse_from_rfc3339(start_time).map_err(|e| {
            ToolError::InvalidInput(format!("startTime is not an ISO-8601 date-time: {}", e))
        })?;

        let body = json!({
            "title": str_arg(&input, "title")?,
            "type": str_arg(&input, "type")?,
            "startTime": start_time,
            "durationMinutes": input.get("durationMinutes").and_then(Value::as_i64).unwrap_or(30),
        });
        let created = self
            .backend
            .post(&format!("/projects/{}/meetings", project_id), &body, auth)
            .await?;
        let id = created.get("id").map(Value::to_string).unwrap_or_else(|| "?".to_string());
        Ok(ToolOutput::Text(format!(
            "Scheduled {} \"{}\" (id {}) at {}.",
            body["type"].as_str().unwrap_or("meeting"),
            body["title"].as_str().unwrap_or_default(),
            id,
            start_time
        )))
    }
}
