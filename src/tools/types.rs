//! Tool types for Doppel
//!
//! This module defines the tool capability descriptor the model sees, the
//! bounded log of tool invocation events, and the closed classification of
//! built-in tool kinds that drives agent-loop dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Descriptor for a tool the model may invoke.
///
/// # Example
/// ```
/// use doppel::tools::ToolSpec;
/// use serde_json::json;
///
/// let spec = ToolSpec::new(
///     "search_notes",
///     "Search saved notes",
///     json!({
///         "type": "object",
///         "properties": { "query": { "type": "string" } },
///         "required": ["query"]
///     }),
/// );
/// assert_eq!(spec.name, "search_notes");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Unique identifier the model uses to request invocation
    pub name: String,
    /// Human-readable description sent to the model
    pub description: String,
    /// JSON Schema describing the tool's arguments
    pub parameters: Value,
}

impl ToolSpec {
    /// Create a new tool descriptor.
    pub fn new(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// Build a JSON-Schema object from `(name, type, description)` properties
/// and the required subset.
pub fn object_schema(properties: &[(&str, &str, &str)], required: &[&str]) -> Value {
    let props: serde_json::Map<String, Value> = properties
        .iter()
        .map(|(name, ty, desc)| {
            (
                name.to_string(),
                json!({ "type": ty, "description": desc }),
            )
        })
        .collect();
    json!({
        "type": "object",
        "properties": props,
        "required": required,
    })
}

/// One tool invocation, as rendered back to the model for context.
///
/// Communication tools produce pending events (no result, no end time);
/// information-gathering tools produce completed events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallEvent {
    /// Name of the invoked tool
    pub tool_name: String,
    /// Arguments the model supplied
    pub tool_args: Value,
    /// Result payload, if the call has completed
    pub tool_result: Option<String>,
    /// When the invocation started
    pub start_time: DateTime<Utc>,
    /// When the invocation finished, if it has
    pub end_time: Option<DateTime<Utc>>,
}

impl ToolCallEvent {
    /// Record a pending invocation (communication tools: the "result" is the
    /// user-visible side effect, so none is stored).
    pub fn pending(tool_name: &str, tool_args: Value) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            tool_args,
            tool_result: None,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    /// Record a completed invocation with its result payload.
    pub fn completed(
        tool_name: &str,
        tool_args: Value,
        tool_result: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            tool_args,
            tool_result: Some(tool_result.to_string()),
            start_time,
            end_time: Some(end_time),
        }
    }
}

impl std::fmt::Display for ToolCallEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let start = self.start_time.format("%Y-%m-%d %H:%M:%S");
        match (&self.end_time, &self.tool_result) {
            (Some(end), Some(result)) => write!(
                f,
                "{} ({} - {}): {}",
                self.tool_name,
                start,
                end.format("%Y-%m-%d %H:%M:%S"),
                result
            ),
            _ => write!(f, "{} ({} - pending)", self.tool_name, start),
        }
    }
}

/// Bounded log of tool invocation events visible to the model as context.
///
/// Unlike `ConversationHistory`, the bound is by event count: appending past
/// `max_length` evicts the oldest event (FIFO).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallHistory {
    /// Ordered events, oldest first
    pub events: Vec<ToolCallEvent>,
    /// Maximum number of retained events
    pub max_length: usize,
}

impl ToolCallHistory {
    /// Create an empty history bounded to `max_length` events.
    pub fn new(max_length: usize) -> Self {
        Self {
            events: Vec::new(),
            max_length,
        }
    }

    /// Append an event, evicting the oldest when over the bound.
    pub fn add_event(&mut self, event: ToolCallEvent) {
        self.events.push(event);
        if self.events.len() > self.max_length {
            self.events.remove(0);
        }
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl std::fmt::Display for ToolCallHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self.events.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", rendered.join("\n"))
    }
}

/// Built-in communication tools. Invoking one of these produces the
/// user-visible turn output and terminates the agent loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinTool {
    /// Send a message in the current conversation
    Message,
    /// React to a message with an emoji
    React,
    /// Remove a previously added reaction
    RemoveReact,
    /// Explicitly decline to respond
    DoNothing,
}

impl BuiltinTool {
    /// The wire name the model uses for this tool.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinTool::Message => "message",
            BuiltinTool::React => "react",
            BuiltinTool::RemoveReact => "remove_react",
            BuiltinTool::DoNothing => "do_nothing",
        }
    }

    /// Parse a wire name into a built-in tool, if it is one.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "message" => Some(BuiltinTool::Message),
            "react" => Some(BuiltinTool::React),
            "remove_react" => Some(BuiltinTool::RemoveReact),
            "do_nothing" => Some(BuiltinTool::DoNothing),
            _ => None,
        }
    }
}

/// Which retrieval corpus a search tool targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchCorpus {
    /// Static ground-truth corpus the persona was built from
    GroundTruth,
    /// Rolling corpus of archived conversation history
    Conversation,
}

impl SearchCorpus {
    /// The wire name of the search tool for this corpus.
    pub fn tool_name(&self) -> &'static str {
        match self {
            SearchCorpus::GroundTruth => "search_ground_truth",
            SearchCorpus::Conversation => "search_conversation",
        }
    }

    /// Parse a wire name into a corpus, if it names a search tool.
    pub fn from_tool_name(name: &str) -> Option<Self> {
        match name {
            "search_ground_truth" => Some(SearchCorpus::GroundTruth),
            "search_conversation" => Some(SearchCorpus::Conversation),
            _ => None,
        }
    }
}

/// Classification of a model-issued tool call.
///
/// The agent loop dispatches on this variant, never on raw string
/// comparison at the call site. Names matching neither a built-in nor a
/// search tool classify as `External` and are resolved against the
/// provider registry (where an unknown name becomes a fatal
/// `UnknownTool` error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// A built-in communication tool; terminates the agent loop
    Communication(BuiltinTool),
    /// A retrieval search tool; executed synchronously, loop continues
    RetrievalSearch(SearchCorpus),
    /// A dynamically discovered external tool
    External,
}

impl ToolKind {
    /// Classify a tool name.
    pub fn classify(name: &str) -> Self {
        if let Some(builtin) = BuiltinTool::from_name(name) {
            ToolKind::Communication(builtin)
        } else if let Some(corpus) = SearchCorpus::from_tool_name(name) {
            ToolKind::RetrievalSearch(corpus)
        } else {
            ToolKind::External
        }
    }
}
