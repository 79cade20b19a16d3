//! Error types for Doppel
//!
//! This module defines all error types used throughout the crate.
//! Uses `thiserror` for ergonomic error handling with automatic `Display`
//! and `Error` trait implementations.

use thiserror::Error;

/// The primary error type for Doppel operations.
#[derive(Error, Debug)]
pub enum DoppelError {
    /// Configuration-related errors (invalid config, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Retrieval store search/update failures. Recovered by the controller,
    /// which falls back to an empty result set — never fatal for a turn.
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// `make_response` was called before `update_history` for a conversation.
    /// This is an ordering error in the caller, not a runtime condition.
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    /// The model requested a tool that is neither a built-in nor a registered
    /// external tool. Fatal for the current turn — silently ignoring it risks
    /// an infinite agent loop over corrupted tool-call state.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Malformed payload from the LLM backend. Fatal for the current turn,
    /// surfaced to the caller, not retried by the core.
    #[error("Model response parse error: {0}")]
    ModelResponseParse(String),

    /// LLM backend errors (API failures, rate limits, etc.)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Tool execution errors from external tool providers.
    #[error("Tool error: {0}")]
    Tool(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A specialized `Result` type for Doppel operations.
pub type Result<T> = std::result::Result<T, DoppelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DoppelError::Config("missing api key".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing api key");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DoppelError = io_err.into();
        assert!(matches!(err, DoppelError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: DoppelError = json_err.into();
        assert!(matches!(err, DoppelError::Json(_)));
    }

    #[test]
    fn test_unknown_tool_display() {
        let err = DoppelError::UnknownTool("frobnicate".to_string());
        assert_eq!(err.to_string(), "Unknown tool: frobnicate");
    }

    #[test]
    fn test_conversation_not_found_display() {
        let err = DoppelError::ConversationNotFound("chat:42".to_string());
        assert_eq!(err.to_string(), "Conversation not found: chat:42");
    }

    #[test]
    fn test_result_type() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }

    #[test]
    fn test_error_variants() {
        // Ensure all variants can be created
        let _ = DoppelError::Config("test".into());
        let _ = DoppelError::Retrieval("test".into());
        let _ = DoppelError::ConversationNotFound("test".into());
        let _ = DoppelError::UnknownTool("test".into());
        let _ = DoppelError::ModelResponseParse("test".into());
        let _ = DoppelError::Provider("test".into());
        let _ = DoppelError::Tool("test".into());
    }
}
