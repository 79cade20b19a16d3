//! Language model collaborator
//!
//! This module defines the request/response interface to a text-generation
//! backend. A backend may support native tool calling (responses come back
//! as structured tool-call requests) or plain text (responses come back as
//! one or more text replies); the agent treats both uniformly.

mod http;
mod prompt;

pub use http::HttpLanguageModel;
pub use prompt::PromptFormatter;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::tools::ToolSpec;

/// One structured response from the model: either plain text or a named
/// tool call with arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelResponse {
    /// A plain text reply, sent to the user as-is
    Text(String),
    /// A request to invoke a tool
    ToolCall {
        /// Backend-assigned call id (empty when the backend supplies none)
        id: String,
        /// Name of the requested tool
        name: String,
        /// Structured arguments
        arguments: Value,
    },
}

impl ModelResponse {
    /// The tool name, when this is a tool call.
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            ModelResponse::ToolCall { name, .. } => Some(name),
            ModelResponse::Text(_) => None,
        }
    }

    /// The user-visible text of this response.
    ///
    /// Plain text returns itself; a `message` tool call returns its
    /// `message_content` argument; other tool calls have no user-visible
    /// text.
    pub fn user_text(&self) -> Option<String> {
        match self {
            ModelResponse::Text(text) => Some(text.clone()),
            ModelResponse::ToolCall { name, arguments, .. } if name == "message" => arguments
                .get("message_content")
                .and_then(|v| v.as_str())
                .map(String::from),
            ModelResponse::ToolCall { .. } => None,
        }
    }
}

/// Everything a backend needs to produce one batch of responses.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Persona name the model answers as
    pub target_name: String,
    /// Display name of the user being answered
    pub sender_name: String,
    /// Rendered conversation history window
    pub history: String,
    /// Retrieval results from the ground-truth corpus
    pub gt_results: Vec<String>,
    /// Retrieval results from the archived-conversation corpus
    pub conversation_results: Vec<String>,
    /// Whether history lines carry timestamps (affects prompt wording)
    pub include_timestamp: bool,
    /// Conversation key, for logging and routing
    pub conversation: String,
    /// Tools the model may call this turn. Empty disables tool use.
    pub allowed_tools: Vec<ToolSpec>,
    /// Rendered tool-call history for this conversation, if any
    pub tool_call_history: Option<String>,
    /// Image attachment URLs offered as vision input
    pub image_urls: Vec<String>,
}

impl ChatRequest {
    /// Create a request with no retrieval context and no tools.
    pub fn new(target_name: &str, sender_name: &str, history: &str, conversation: &str) -> Self {
        Self {
            target_name: target_name.to_string(),
            sender_name: sender_name.to_string(),
            history: history.to_string(),
            gt_results: Vec::new(),
            conversation_results: Vec::new(),
            include_timestamp: false,
            conversation: conversation.to_string(),
            allowed_tools: Vec::new(),
            tool_call_history: None,
            image_urls: Vec::new(),
        }
    }

    /// Set retrieval results (builder pattern).
    pub fn with_retrieval(mut self, gt: Vec<String>, conversation: Vec<String>) -> Self {
        self.gt_results = gt;
        self.conversation_results = conversation;
        self
    }

    /// Set the allowed tool set (builder pattern).
    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.allowed_tools = tools;
        self
    }

    /// Set the rendered tool-call history (builder pattern).
    pub fn with_tool_call_history(mut self, rendered: &str) -> Self {
        self.tool_call_history = Some(rendered.to_string());
        self
    }

    /// Set image attachment URLs (builder pattern).
    pub fn with_images(mut self, urls: Vec<String>) -> Self {
        self.image_urls = urls;
        self
    }
}

/// Result of one model call: the rendered prompt (kept for diagnostics)
/// plus the structured responses.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// The full prompt that was sent to the backend
    pub prompt: String,
    /// Structured responses, in backend order
    pub responses: Vec<ModelResponse>,
}

/// Request/response interface to a text-generation backend.
///
/// Implementations must surface malformed backend payloads as
/// [`crate::error::DoppelError::ModelResponseParse`] rather than panicking
/// or silently dropping content.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Produce one batch of responses for a turn.
    async fn chat_step(&self, request: &ChatRequest) -> Result<ChatOutcome>;

    /// Backend name, for logging.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_response_user_text() {
        let response = ModelResponse::Text("hello".into());
        assert_eq!(response.user_text().as_deref(), Some("hello"));
        assert!(response.tool_name().is_none());
    }

    #[test]
    fn test_message_tool_call_user_text() {
        let response = ModelResponse::ToolCall {
            id: "call_1".into(),
            name: "message".into(),
            arguments: json!({"message_content": "hi there"}),
        };
        assert_eq!(response.user_text().as_deref(), Some("hi there"));
        assert_eq!(response.tool_name(), Some("message"));
    }

    #[test]
    fn test_react_tool_call_has_no_user_text() {
        let response = ModelResponse::ToolCall {
            id: "call_2".into(),
            name: "react".into(),
            arguments: json!({"reaction": "👍"}),
        };
        assert!(response.user_text().is_none());
    }

    #[test]
    fn test_chat_request_builders() {
        let request = ChatRequest::new("zef", "alice", "alice: hi", "chat:1")
            .with_retrieval(vec!["fact".into()], vec![])
            .with_tool_call_history("message (...)")
            .with_images(vec!["https://cdn/a.png".into()]);
        assert_eq!(request.gt_results, vec!["fact"]);
        assert!(request.conversation_results.is_empty());
        assert!(request.tool_call_history.is_some());
        assert_eq!(request.image_urls.len(), 1);
        assert!(request.allowed_tools.is_empty());
    }
}
