//! Doppel - persona chatbot core
//!
//! Answers as a simulated individual: a bounded conversation history with
//! asynchronous archival into a retrieval store, retrieval-augmented
//! prompting, and an optional tool-calling agent loop in front of the
//! language model backend.

pub mod agent;
pub mod config;
pub mod controller;
pub mod error;
pub mod history;
pub mod llm;
pub mod retrieval;
pub mod tools;
pub mod utils;

pub use agent::Agent;
pub use config::Config;
pub use controller::{ChatController, ResponseDispatcher, TurnOutput};
pub use error::{DoppelError, Result};
pub use history::{Attachment, ConversationHistory, MediaKind, Message};
pub use llm::{ChatOutcome, ChatRequest, HttpLanguageModel, LanguageModel, ModelResponse};
pub use retrieval::{HttpRetrievalStore, MemoryRetrievalStore, RetrievalStore};
pub use tools::{ToolCallEvent, ToolCallHistory, ToolProvider, ToolSpec};
