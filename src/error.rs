use std::time::Duration;

use thiserror::Error;
use url::ParseError;

/// Process-level failures: configuration, startup, serving.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

impl ProxyError {
    pub fn config(message: impl Into<String>) -> Self {
        ProxyError::Config(message.into())
    }

    pub fn browser(message: impl Into<String>) -> Self {
        ProxyError::Browser(message.into())
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        ProxyError::Telemetry(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

/// Failure of a single render operation.
///
/// Carries the URL that triggered it so the server log can say which page broke;
/// none of this detail is ever sent back to the client.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("Browser session unavailable: {message}")]
    Session { message: String },

    #[error("Page context error for {url}: {message}")]
    Page { url: String, message: String },

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Navigation to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("Render of {url} aborted: {message}")]
    Aborted { url: String, message: String },
}

impl RenderError {
    pub fn session(message: impl Into<String>) -> Self {
        RenderError::Session {
            message: message.into(),
        }
    }

    pub fn page(url: impl Into<String>, message: impl Into<String>) -> Self {
        RenderError::Page {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn navigation(url: impl Into<String>, message: impl Into<String>) -> Self {
        RenderError::Navigation {
            url: url.into(),
            message: message.into(),
        }
    }

    /// The URL being rendered, when the failure happened after one was known.
    pub fn url(&self) -> Option<&str> {
        match self {
            RenderError::Session { .. } => None,
            RenderError::Page { url, .. }
            | RenderError::Navigation { url, .. }
            | RenderError::Timeout { url, .. }
            | RenderError::Aborted { url, .. } => Some(url),
        }
    }

    /// Stable label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            RenderError::Session { .. } => "session",
            RenderError::Page { .. } => "page",
            RenderError::Navigation { .. } => "navigation",
            RenderError::Timeout { .. } => "timeout",
            RenderError::Aborted { .. } => "aborted",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RenderError::Timeout { .. })
    }
}

impl From<RenderError> for ProxyError {
    fn from(err: RenderError) -> Self {
        ProxyError::Browser(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_error_exposes_url_for_page_level_failures() {
        let err = RenderError::navigation("https://example.com/a", "net::ERR_NAME_NOT_RESOLVED");
        assert_eq!(err.url(), Some("https://example.com/a"));
        assert_eq!(err.kind(), "navigation");
        assert!(!err.is_timeout());
    }

    #[test]
    fn session_error_has_no_url() {
        let err = RenderError::session("failed to launch chromium");
        assert_eq!(err.url(), None);
        assert_eq!(err.kind(), "session");
    }

    #[test]
    fn timeout_error_mentions_duration() {
        let err = RenderError::Timeout {
            url: "https://example.com/slow".to_string(),
            timeout: Duration::from_millis(1),
        };
        assert!(err.is_timeout());
        let rendered = err.to_string();
        assert!(
            rendered.contains("timed out") && rendered.contains("1ms"),
            "unexpected display: {rendered}"
        );
    }

    #[test]
    fn render_error_converts_into_browser_error() {
        let err: ProxyError = RenderError::session("gone").into();
        assert!(matches!(err, ProxyError::Browser(msg) if msg.contains("gone")));
    }
}
