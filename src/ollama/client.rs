//! Ollama API client for streaming chat
//!
//! `/api/chat` with `"stream": true` answers with newline-delimited JSON.
//! HTTP chunks do not line up with JSON lines, so the byte stream is
//! re-split on `\n` before each line is parsed into a [`ChatResponse`].

use std::pin::Pin;

use async_stream::stream;
use futures_util::stream::{Stream, StreamExt};
use tracing::debug;

use super::tool_use::{ChatRequest, ChatResponse};

/// Stream of parsed response lines
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatResponse, ChatError>> + Send>>;

/// Error type for chat operations
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("ollama returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("ollama error: {0}")]
    Server(String),
}

/// Client for Ollama's /api/chat endpoint with tool support
///
/// Cloning shares the underlying connection pool.
#[derive(Clone)]
pub struct ChatClient {
    base_url: String,
    client: reqwest::Client,
}

impl ChatClient {
    /// Create a new chat client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the Ollama server (e.g., "http://localhost:11434")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Send a streaming chat request
    ///
    /// # Returns
    /// A stream of response lines. Each line carries a content fragment,
    /// tool calls, or (with `done: true`) the final metadata.
    pub async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStream, ChatError> {
        let endpoint = format!("{}/api/chat", self.base_url);
        debug!(model = %request.model, messages = request.messages.len(), tools = request.tools.len(), "Ollama chat request");

        let response = self.client.post(&endpoint).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut bytes_stream = response.bytes_stream();
        let lines = stream! {
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(chunk) = bytes_stream.next().await {
                match chunk {
                    Ok(bytes) => buffer.extend_from_slice(&bytes),
                    Err(e) => {
                        yield Err(ChatError::from(e));
                        return;
                    }
                }
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    match parse_line(&line) {
                        Ok(Some(parsed)) => yield Ok(parsed),
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }
            // Final line without a trailing newline
            match parse_line(&buffer) {
                Ok(Some(parsed)) => yield Ok(parsed),
                Ok(None) => {}
                Err(e) => yield Err(e),
            }
        };

        Ok(Box::pin(lines))
    }
}

/// Parse one NDJSON line; blank lines yield nothing
pub(crate) fn parse_line(line: &[u8]) -> Result<Option<ChatResponse>, ChatError> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let parsed: ChatResponse = serde_json::from_slice(trimmed)?;
    if let Some(error) = parsed.error.clone() {
        return Err(ChatError::Server(error));
    }
    Ok(Some(parsed))
}
