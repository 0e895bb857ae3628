//! Forwarded request credentials
//!
//! The orchestration core never inspects the caller's credential. It lifts the
//! inbound `Cookie` header into an [`AuthContext`] and hands that, unchanged,
//! to every tool call and conversation-store request made for the same
//! request.

use std::fmt;
use std::sync::Arc;

/// Opaque credential captured from the inbound request.
///
/// Cloning is cheap (the raw header is shared), so each concurrently running
/// tool gets its own handle. There is no way to mutate the value after
/// construction.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthContext {
    cookie: Arc<str>,
}

impl AuthContext {
    /// Wrap a raw `Cookie` header value.
    ///
    /// Returns `None` for an empty or whitespace-only header so callers can
    /// treat "no credential" uniformly.
    pub fn from_cookie_header(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            cookie: Arc::from(trimmed),
        })
    }

    /// Header name used when forwarding the credential to the backend.
    pub const HEADER: &'static str = "Cookie";

    /// The value to place in the forwarded header.
    pub fn header_value(&self) -> &str {
        &self.cookie
    }
}

// Credentials must never end up in logs.
impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("cookie", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_header_is_no_credential() {
        assert!(AuthContext::from_cookie_header("").is_none());
        assert!(AuthContext::from_cookie_header("   ").is_none());
    }

    #[test]
    fn test_header_value_is_forwarded_unchanged() {
        let auth = AuthContext::from_cookie_header("session=abc; theme=dark").unwrap();
        assert_eq!(auth.header_value(), "session=abc; theme=dark");
    }

    #[test]
    fn test_debug_redacts_cookie() {
        let auth = AuthContext::from_cookie_header("session=secret").unwrap();
        let printed = format!("{:?}", auth);
        assert!(!printed.contains("secret"));
        assert!(printed.contains("redacted"));
    }
}
