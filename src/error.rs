//! Error types for the agent execution core.
//!
//! Variants carry a human-readable message (via `thiserror`'s `#[error(...)]`) and map to
//! the stable error codes from the taxonomy through [`Error::code`], so callers can match on
//! codes without depending on the exact enum shape across crate versions.

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the core.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// API error from the model server
    #[error("API error: {0}")]
    Api(String),

    /// Streaming error
    #[error("Streaming error: {0}")]
    Stream(String),

    /// Tool execution error
    #[error("Tool execution error: {0}")]
    Tool(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Request timed out under a caller-supplied or default deadline.
    #[error("Request timeout")]
    Timeout,

    /// A transport-level condition classified as retryable (network error, 5xx, 429, body
    /// timeout, ...). `retry_after` carries the server's `Retry-After` hint, if any.
    #[error("Retryable transport error ({code}): {message}")]
    Retryable {
        code: &'static str,
        message: String,
        retry_after: Option<std::time::Duration>,
    },

    /// A terminal transport condition (auth failure, 404, 400, content filter).
    #[error("Terminal transport error ({code}): {message}")]
    Terminal { code: &'static str, message: String },

    /// The operation was cancelled via a cancellation token.
    #[error("Aborted")]
    Aborted,

    /// The stream processor's per-turn byte budget was exceeded.
    #[error("Buffer overflow: turn exceeded {limit} bytes")]
    BufferOverflow { limit: usize },

    /// Session memory store is corrupt and unrecoverable (primary and backup both invalid).
    #[error("Session store corrupt: {0}")]
    Corrupt(String),

    /// A session or plan id failed the URL-safe character class / length check.
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    /// Directory creation failed in the memory or plan store.
    #[error("Failed to create directory: {0}")]
    CreateDirFailed(String),

    /// Directory read failed while listing sessions.
    #[error("Failed to read directory: {0}")]
    ReadDirFailed(String),

    /// A second `execute` was attempted on an Agent already running one.
    #[error("Agent is already executing a turn")]
    AgentBusy,

    /// Other errors
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new API error
    pub fn api(msg: impl Into<String>) -> Self {
        Error::Api(msg.into())
    }

    /// Create a new stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    /// Create a new tool error
    pub fn tool(msg: impl Into<String>) -> Self {
        Error::Tool(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a new other error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Create a timeout error
    pub fn timeout() -> Self {
        Error::Timeout
    }

    pub fn retryable(code: &'static str, msg: impl Into<String>) -> Self {
        Error::Retryable {
            code,
            message: msg.into(),
            retry_after: None,
        }
    }

    pub fn retryable_after(
        code: &'static str,
        msg: impl Into<String>,
        retry_after: std::time::Duration,
    ) -> Self {
        Error::Retryable {
            code,
            message: msg.into(),
            retry_after: Some(retry_after),
        }
    }

    pub fn terminal(code: &'static str, msg: impl Into<String>) -> Self {
        Error::Terminal {
            code,
            message: msg.into(),
        }
    }

    pub fn aborted() -> Self {
        Error::Aborted
    }

    pub fn buffer_overflow(limit: usize) -> Self {
        Error::BufferOverflow { limit }
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Error::Corrupt(msg.into())
    }

    pub fn invalid_session_id(msg: impl Into<String>) -> Self {
        Error::InvalidSessionId(msg.into())
    }

    /// Retry-After duration, when this is a retryable transport error that carried one.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            Error::Retryable { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Stable error code, matching the taxonomy table in §7 of the specification.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Http(_) => "NETWORK_ERROR",
            Error::Json(_) => "PARSE_FAILED",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Api(_) => "API_ERROR",
            Error::Stream(_) => "STREAM_ERROR",
            Error::Tool(_) => "EXECUTION_FAILED",
            Error::InvalidInput(_) => "INVALID_ARGS",
            Error::Timeout => "TIMEOUT",
            Error::Retryable { code, .. } => code,
            Error::Terminal { code, .. } => code,
            Error::Aborted => "ABORTED",
            Error::BufferOverflow { .. } => "BUFFER_OVERFLOW",
            Error::Corrupt(_) => "CORRUPT",
            Error::InvalidSessionId(_) => "INVALID_SESSION_ID",
            Error::CreateDirFailed(_) => "CREATE_DIR_FAILED",
            Error::ReadDirFailed(_) => "READ_DIR_FAILED",
            Error::AgentBusy => "AGENT_BUSY",
            Error::Other(_) => "OTHER",
        }
    }

    /// True for conditions the §7 taxonomy marks retryable. `Http` is included since it is the
    /// blanket `?`-conversion every raw transport failure (connection reset, DNS failure, socket
    /// timeout) goes through before classification; the taxonomy lists `NETWORK_ERROR` as
    /// retryable transport, so the bare variant must be too.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Retryable { .. } | Error::Timeout | Error::Http(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_config() {
        let err = Error::config("Invalid model");
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.to_string(), "Invalid configuration: Invalid model");
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_error_api() {
        let err = Error::api("500 Internal Server Error");
        assert!(matches!(err, Error::Api(_)));
        assert_eq!(err.to_string(), "API error: 500 Internal Server Error");
    }

    #[test]
    fn test_error_stream() {
        let err = Error::stream("Connection lost");
        assert!(matches!(err, Error::Stream(_)));
        assert_eq!(err.to_string(), "Streaming error: Connection lost");
    }

    #[test]
    fn test_error_tool() {
        let err = Error::tool("Tool not found");
        assert!(matches!(err, Error::Tool(_)));
        assert_eq!(err.to_string(), "Tool execution error: Tool not found");
    }

    #[test]
    fn test_error_invalid_input() {
        let err = Error::invalid_input("Missing parameter");
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(err.to_string(), "Invalid input: Missing parameter");
    }

    #[test]
    fn test_error_timeout() {
        let err = Error::timeout();
        assert!(matches!(err, Error::Timeout));
        assert_eq!(err.to_string(), "Request timeout");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_other() {
        let err = Error::other("Something went wrong");
        assert!(matches!(err, Error::Other(_)));
        assert_eq!(err.to_string(), "Error: Something went wrong");
    }

    #[test]
    fn test_retryable_codes_and_retry_after() {
        let err = Error::retryable_after(
            "RATE_LIMITED",
            "429 too many requests",
            std::time::Duration::from_secs(2),
        );
        assert!(err.is_retryable());
        assert_eq!(err.code(), "RATE_LIMITED");
        assert_eq!(err.retry_after(), Some(std::time::Duration::from_secs(2)));
    }

    #[test]
    fn test_terminal_is_not_retryable() {
        let err = Error::terminal("AUTH_FAILED", "invalid api key");
        assert!(!err.is_retryable());
        assert_eq!(err.code(), "AUTH_FAILED");
    }

    #[test]
    fn test_aborted_is_not_retryable() {
        assert!(!Error::aborted().is_retryable());
        assert_eq!(Error::aborted().code(), "ABORTED");
    }

    #[test]
    fn test_buffer_overflow_code() {
        let err = Error::buffer_overflow(2 * 1024 * 1024);
        assert_eq!(err.code(), "BUFFER_OVERFLOW");
    }

    #[test]
    fn test_invalid_session_id_code() {
        let err = Error::invalid_session_id("contains ..");
        assert_eq!(err.code(), "INVALID_SESSION_ID");
    }

    #[test]
    fn test_error_from_reqwest() {
        fn _test_conversion(_e: reqwest::Error) -> Error {
            Error::Http(_e)
        }
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn _returns_result() -> Result<i32> {
            Ok(42)
        }

        fn _returns_error() -> Result<i32> {
            Err(Error::timeout())
        }
    }
}
