//! File attachments on user messages
//!
//! The UI sends files as `{type: "file", mediaType, url}` parts. They are
//! resolved to inline content for the model and never persisted:
//!
//! - `text/*`, JSON, CSV → the file body is appended to the message text
//! - `image/*` → base64 image passed alongside the text
//! - anything else, or a fetch failure → a short placeholder line
//!
//! `data:` URLs are decoded locally; `http(s)` URLs are fetched.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures_util::StreamExt;
use tracing::warn;

use crate::model::ModelMessage;
use crate::store::ContentPart;

const DATA_TAG: &str = "data:";
const BASE64_MARKER: &str = ";base64";

/// Attachments larger than this are not inlined
pub const MAX_ATTACHMENT_BYTES: usize = 2 * 1024 * 1024;

/// A file ready to hand to the model
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedFile {
    Text(String),
    /// Base64-encoded image bytes
    Image(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error("unsupported media type {0}")]
    Unsupported(String),
    #[error("malformed data URL")]
    MalformedDataUrl,
    #[error("unsupported URL scheme")]
    UnsupportedScheme,
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("attachment exceeds the inline size limit")]
    TooLarge,
}

/// Turns a file part into model-visible content
#[async_trait]
pub trait FileResolver: Send + Sync {
    async fn resolve(&self, media_type: &str, url: &str) -> Result<ResolvedFile, AttachmentError>;
}

/// Resolves `data:` URLs in place and fetches `http(s)` URLs
#[derive(Clone)]
pub struct HttpFileResolver {
    client: reqwest::Client,
}

impl HttpFileResolver {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Fetch at most [`MAX_ATTACHMENT_BYTES`], stopping as soon as the body
    /// is known to be larger
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AttachmentError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AttachmentError::Fetch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AttachmentError::Fetch(format!("status {}", response.status())));
        }
        if response
            .content_length()
            .is_some_and(|len| len > MAX_ATTACHMENT_BYTES as u64)
        {
            return Err(AttachmentError::TooLarge);
        }

        let mut body = Vec::new();
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| AttachmentError::Fetch(e.to_string()))?;
            if body.len() + chunk.len() > MAX_ATTACHMENT_BYTES {
                return Err(AttachmentError::TooLarge);
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl FileResolver for HttpFileResolver {
    async fn resolve(&self, media_type: &str, url: &str) -> Result<ResolvedFile, AttachmentError> {
        if !is_text(media_type) && !is_image(media_type) {
            return Err(AttachmentError::Unsupported(media_type.to_string()));
        }
        let bytes = if url.starts_with(DATA_TAG) {
            decode_data_url(url)?
        } else if url.starts_with("http://") || url.starts_with("https://") {
            self.fetch(url).await?
        } else {
            return Err(AttachmentError::UnsupportedScheme);
        };
        if bytes.len() > MAX_ATTACHMENT_BYTES {
            return Err(AttachmentError::TooLarge);
        }
        Ok(to_resolved(media_type, bytes))
    }
}

fn is_text(media_type: &str) -> bool {
    media_type.starts_with("text/")
        || matches!(media_type, "application/json" | "application/csv" | "application/xml")
}

fn is_image(media_type: &str) -> bool {
    media_type.starts_with("image/")
}

fn to_resolved(media_type: &str, bytes: Vec<u8>) -> ResolvedFile {
    if is_image(media_type) {
        ResolvedFile::Image(STANDARD.encode(bytes))
    } else {
        ResolvedFile::Text(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Decode the payload of `data:[<media>][;base64],<payload>`
fn decode_data_url(url: &str) -> Result<Vec<u8>, AttachmentError> {
    let rest = url
        .strip_prefix(DATA_TAG)
        .ok_or(AttachmentError::MalformedDataUrl)?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or(AttachmentError::MalformedDataUrl)?;
    if meta.ends_with(BASE64_MARKER) {
        STANDARD
            .decode(payload.trim())
            .map_err(|_| AttachmentError::MalformedDataUrl)
    } else {
        Ok(payload.as_bytes().to_vec())
    }
}

/// Build the model-visible user message from UI parts.
///
/// Text parts are joined with blank lines. When `resolve_files` is false,
/// file parts become a placeholder line instead of being fetched.
pub async fn user_message(
    parts: &[ContentPart],
    resolver: &dyn FileResolver,
    resolve_files: bool,
) -> ModelMessage {
    let mut sections: Vec<String> = Vec::new();
    let mut images = Vec::new();

    for part in parts {
        match part {
            ContentPart::Text { text } => {
                if !text.trim().is_empty() {
                    sections.push(text.clone());
                }
            }
            ContentPart::File {
                media_type,
                url,
                filename,
            } => {
                let label = filename.as_deref().unwrap_or(media_type.as_str());
                if !resolve_files {
                    sections.push(format!("[Attached file: {}]", label));
                    continue;
                }
                match resolver.resolve(media_type, url).await {
                    Ok(ResolvedFile::Text(body)) => {
                        sections.push(format!("[Attached file: {}]\n{}", label, body));
                    }
                    Ok(ResolvedFile::Image(data)) => {
                        sections.push(format!("[Attached image: {}]", label));
                        images.push(data);
                    }
                    Err(e) => {
                        warn!(file = label, error = %e, "Attachment not inlined");
                        sections.push(format!("[Attached file {} could not be read: {}]", label, e));
                    }
                }
            }
        }
    }

    ModelMessage::User {
        text: sections.join("\n\n"),
        images,
    }
}
