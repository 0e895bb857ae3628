//! Team and documentation tools

use async_trait::async_trait;
use serde_json::{json, Value};

use super::sprints::project_schema;
use super::{int_arg, str_arg, BackendClient, Tool, ToolError, ToolOutput};
use crate::auth::AuthContext;

/// Members of a project and their roles
pub struct ListProjectMembers {
    backend: BackendClient,
}

impl ListProjectMembers {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for ListProjectMembers {
    fn name(&self) -> &'static str {
        "listProjectMembers"
    }

    fn description(&self) -> &'static str {
        "List the members of a project with their user ids and roles."
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
        let members = self
            .backend
            .get(&format!("/projects/{}/members", project_id), auth)
            .await?;
        Ok(ToolOutput::Structured(members))
    }
}

/// Full-text search over the product help pages
pub struct SearchDocs {
    backend: BackendClient,
}

impl SearchDocs {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for SearchDocs {
    fn name(&self) -> &'static str {
        "searchDocs"
    }

    fn description(&self) -> &'static str {
        "Search the product documentation. Returns the best matching help articles."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "minLength": 2 }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        input: Value,
        auth: Option<&AuthContext>,
    ) -> Result<ToolOutput, ToolError> {
        let query = str_arg(&input, "query")?;
        let hits = self
            .backend
            .get_query("/docs/search", &[("q", query)], auth)
            .await?;
        let articles = hits.as_array().cloned().unwrap_or_default();
        if articles.is_empty() {
            return Ok(ToolOutput::Text(format!("No help articles match \"{}\".", query)));
        }
        Ok(ToolOutput::Structured(Value::Array(articles)))
    }
}
