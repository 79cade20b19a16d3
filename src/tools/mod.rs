//! Tools module - built-in communication tools, retrieval search tools,
//! and the external tool provider protocol.

pub mod communication;
mod provider;
mod types;
mod vector_store;

pub use communication::{
    all_communication_tools, do_nothing_tool, message_tool, react_tool, remove_react_tool,
    terminal_tools,
};
pub use provider::{HttpToolProvider, ToolProvider};
pub use types::{
    object_schema, BuiltinTool, SearchCorpus, ToolCallEvent, ToolCallHistory, ToolKind, ToolSpec,
};
pub use vector_store::VectorStoreTool;
