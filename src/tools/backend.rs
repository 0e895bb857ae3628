//! HTTP client for the project-management backend
//!
//! Tools reach the backend only through [`BackendClient`], which attaches the
//! forwarded credential to every request and turns non-2xx answers into
//! [`ToolError`] values instead of failing the run.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::ToolError;
use crate::auth::AuthContext;

/// Maximum length of a backend error body echoed back to the model
const MAX_ERROR_BODY: usize = 300;

/// Shared, stateless client for the backend REST API
#[derive(Clone)]
pub struct BackendClient {
    base_url: String,
    client: reqwest::Client,
}

impl BackendClient {
    /// Create a new backend client
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the backend API (e.g., "http://localhost:8080/api")
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(&self, path: &str, auth: Option<&AuthContext>) -> Result<Value, ToolError> {
        self.send(Method::GET, path, &[], None, auth).await
    }

    /// GET with URL-encoded query parameters
    pub async fn get_query(
        &self,
        path: &str,
        query: &[(&str, &str)],
        auth: Option<&AuthContext>,
    ) -> Result<Value, ToolError> {
        self.send(Method::GET, path, query, None, auth).await
    }

    pub async fn post(
        &self,
        path: &str,
        body: &Value,
        auth: Option<&AuthContext>,
    ) -> Result<Value, ToolError> {
        self.send(Method::POST, path, &[], Some(body), auth).await
    }

    pub async fn patch(
        &self,
        path: &str,
        body: &Value,
        auth: Option<&AuthContext>,
    ) -> Result<Value, ToolError> {
        self.send(Method::PATCH, path, &[], Some(body), auth).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
        auth: Option<&AuthContext>,
    ) -> Result<Value, ToolError> {
        let auth = auth.ok_or(ToolError::MissingAuth)?;
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, "Backend request");

        let mut request: RequestBuilder = self
            .client
            .request(method.clone(), &url)
            .header(AuthContext::HEADER, auth.header_value());
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Backend unreachable");
            ToolError::BackendUnavailable(e.to_string())
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ToolError::BackendUnavailable(e.to_string()))?;

        if let Some(err) = status_error(status, &text) {
            warn!(method = %method, url = %url, status = status.as_u16(), "Backend call failed");
            return Err(err);
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| ToolError::BackendUnavailable(format!("malformed response: {}", e)))
    }
}

/// Map a non-success status to the matching [`ToolError`]
fn status_error(status: StatusCode, body: &str) -> Option<ToolError> {
    if status.is_success() {
        return None;
    }
    let message = truncate(body.trim(), MAX_ERROR_BODY);
    if status.is_server_error() {
        let detail = if message.is_empty() {
            status.to_string()
        } else {
            format!("{}: {}", status, message)
        };
        return Some(ToolError::BackendUnavailable(detail));
    }
    let message = if message.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request rejected")
            .to_string()
    } else {
        message
    };
    Some(ToolError::Backend {
        status: status.as_u16(),
        message,
    })
}

/// Truncate a string to max length on a char boundary, adding ellipsis if needed
fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len.saturating_sub(3);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_not_an_error() {
        assert!(status_error(StatusCode::OK, "{}").is_none());
        assert!(status_error(StatusCode::NO_CONTENT, "").is_none());
    }

    #[test]
    fn test_server_error_is_backend_unavailable() {
        let err = status_error(StatusCode::SERVICE_UNAVAILABLE, "maintenance").unwrap();
        match err {
            ToolError::BackendUnavailable(msg) => assert!(msg.contains("maintenance")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_client_error_keeps_status() {
        let err = status_error(StatusCode::NOT_FOUND, "").unwrap();
        assert_eq!(
            err,
            ToolError::Backend {
                status: 404,
                message: "Not Found".to_string()
            }
        );
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = BackendClient::new("http://backend/api/", Duration::from_secs(1));
        assert_eq!(client.base_url(), "http://backend/api");
    }
}
