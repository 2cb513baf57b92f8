//! Error types for the scraping layer.

use thiserror::Error;

/// Result type alias for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors that can occur while building, running or serving a search.
#[derive(Error, Debug)]
pub enum SearchError {
    /// No usable search term after filter composition.
    #[error("Empty query built")]
    EmptyQuery,

    /// A query parameter is malformed or out of range.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The page did not reach a ready state in time.
    #[error("Navigation timed out")]
    NavigationTimeout,

    /// Transport or browser process failure while loading a page.
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// The engine served a bot challenge instead of results.
    #[error("Captcha detected")]
    CaptchaDetected,

    /// A single result node was missing an expected element.
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Raw HTTP request failed or timed out.
    #[error("Raw request failed: {0}")]
    RawRequest(String),

    /// The engine does not support the requested mode.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// No engine is registered under this name.
    #[error("Unknown engine: {0}")]
    UnknownEngine(String),

    /// The engine is registered but not ready to serve.
    #[error("Engine '{0}' is not initialized")]
    NotInitialized(String),

    /// Browser process could not be launched or controlled.
    #[error("Browser error: {0}")]
    Browser(String),

    /// Failed to parse a document, selector or payload.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The external CAPTCHA solver failed.
    #[error("Captcha solver failed: {0}")]
    CaptchaSolver(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SearchError {
    /// Stable identifier of the error kind, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "empty_query",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NavigationTimeout => "navigation_timeout",
            Self::Navigation(_) => "navigation_error",
            Self::CaptchaDetected => "captcha_detected",
            Self::ElementNotFound(_) => "element_not_found",
            Self::RawRequest(_) => "raw_request_error",
            Self::NotSupported(_) => "not_supported",
            Self::UnknownEngine(_) => "unknown_engine",
            Self::NotInitialized(_) => "not_initialized",
            Self::Browser(_) => "browser_error",
            Self::Parse(_) => "parse_error",
            Self::Config(_) => "config_error",
            Self::CaptchaSolver(_) => "captcha_solver_error",
            Self::Io(_) => "io_error",
        }
    }

    /// HTTP status code the dispatch server answers with for this error.
    pub fn status(&self) -> u16 {
        match self {
            Self::EmptyQuery | Self::InvalidRequest(_) => 400,
            Self::UnknownEngine(_) => 404,
            Self::CaptchaDetected => 429,
            Self::NotSupported(_) => 501,
            Self::RawRequest(_) | Self::Navigation(_) | Self::Browser(_) => 502,
            Self::NotInitialized(_) => 503,
            Self::NavigationTimeout => 504,
            _ => 500,
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        Self::RawRequest(err.to_string())
    }
}

impl From<url::ParseError> for SearchError {
    fn from(err: url::ParseError) -> Self {
        Self::Config(format!("invalid URL: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_empty_query() {
        assert_eq!(SearchError::EmptyQuery.to_string(), "Empty query built");
    }

    #[test]
    fn test_error_display_unknown_engine() {
        let err = SearchError::UnknownEngine("altavista".to_string());
        assert_eq!(err.to_string(), "Unknown engine: altavista");
    }

    #[test]
    fn test_error_display_not_supported() {
        let err = SearchError::NotSupported("image search for brave".to_string());
        assert_eq!(err.to_string(), "Not supported: image search for brave");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(SearchError::EmptyQuery.status(), 400);
        assert_eq!(SearchError::InvalidRequest("page".into()).status(), 400);
        assert_eq!(SearchError::InvalidRequest("page".into()).kind(), "invalid_request");
        assert_eq!(SearchError::UnknownEngine("x".into()).status(), 404);
        assert_eq!(SearchError::CaptchaDetected.status(), 429);
        assert_eq!(SearchError::NotSupported("x".into()).status(), 501);
        assert_eq!(SearchError::RawRequest("x".into()).status(), 502);
        assert_eq!(SearchError::NotInitialized("x".into()).status(), 503);
        assert_eq!(SearchError::NavigationTimeout.status(), 504);
        assert_eq!(SearchError::Parse("x".into()).status(), 500);
    }

    #[test]
    fn test_captcha_timeout_and_raw_are_distinguishable() {
        let kinds = [
            SearchError::CaptchaDetected,
            SearchError::NavigationTimeout,
            SearchError::RawRequest("reset".into()),
        ];
        let statuses: std::collections::HashSet<_> = kinds.iter().map(|e| e.status()).collect();
        assert_eq!(statuses.len(), 3);
        assert_eq!(kinds[0].kind(), "captcha_detected");
        assert_eq!(kinds[1].kind(), "navigation_timeout");
        assert_eq!(kinds[2].kind(), "raw_request_error");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: SearchError = io.into();
        assert_eq!(err.kind(), "io_error");
    }

    #[test]
    fn test_url_parse_conversion() {
        let err: SearchError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, SearchError::Config(_)));
    }
}
