//! Agent loop
//!
//! Orchestrates one user turn: builds context, calls the model, interprets
//! tool calls, applies their side effects, and repeats until a
//! communication response is produced or the turn budget forces one.
//!
//! The loop is bounded: the per-conversation turn counter strictly
//! increases on every non-communication batch, and once it reaches
//! `max_turns` the offered tool set collapses to communication-only tools,
//! so an invocation makes at most `max_turns + 1` model calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tracing::{debug, warn};

use crate::error::{DoppelError, Result};
use crate::llm::{ChatOutcome, ChatRequest, LanguageModel, ModelResponse};
use crate::retrieval::RetrievalStore;
use crate::tools::{
    all_communication_tools, terminal_tools, SearchCorpus, ToolCallEvent, ToolCallHistory,
    ToolKind, ToolProvider, ToolSpec, VectorStoreTool,
};

/// The tool-use agent.
///
/// Holds per-conversation turn counters and tool-call histories; the
/// retrieval search tools and external providers are bound at
/// construction and the external tool catalog is discovered by
/// [`initialize_tools`](Agent::initialize_tools).
pub struct Agent {
    max_turns: usize,
    llm: Arc<dyn LanguageModel>,
    gt_tool: Option<VectorStoreTool>,
    conversation_tool: Option<VectorStoreTool>,
    providers: Vec<Arc<dyn ToolProvider>>,
    external_specs: Vec<ToolSpec>,
    external_lookup: HashMap<String, Arc<dyn ToolProvider>>,
    // per-conversation state; locked briefly, never across an await
    turn_counters: StdMutex<HashMap<String, usize>>,
    tool_call_histories: StdMutex<HashMap<String, ToolCallHistory>>,
}

impl Agent {
    /// Create an agent with only the built-in communication tools.
    pub fn new(max_turns: usize, llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            max_turns,
            llm,
            gt_tool: None,
            conversation_tool: None,
            providers: Vec::new(),
            external_specs: Vec::new(),
            external_lookup: HashMap::new(),
            turn_counters: StdMutex::new(HashMap::new()),
            tool_call_histories: StdMutex::new(HashMap::new()),
        }
    }

    /// Offer a `search_ground_truth` tool backed by `store` (builder pattern).
    pub fn with_ground_truth_store(mut self, store: Arc<dyn RetrievalStore>) -> Self {
        self.gt_tool = Some(VectorStoreTool::new(SearchCorpus::GroundTruth, store));
        self
    }

    /// Offer a `search_conversation` tool backed by `store` (builder pattern).
    pub fn with_conversation_store(mut self, store: Arc<dyn RetrievalStore>) -> Self {
        self.conversation_tool = Some(VectorStoreTool::new(SearchCorpus::Conversation, store));
        self
    }

    /// Register an external tool provider (builder pattern).
    ///
    /// The provider's tools become visible after
    /// [`initialize_tools`](Agent::initialize_tools) runs.
    pub fn with_provider(mut self, provider: Arc<dyn ToolProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Discover external tools and build the name-to-provider lookup table.
    ///
    /// A provider that fails to list its tools is skipped with a warning;
    /// a tool name already claimed by an earlier provider or a built-in is
    /// skipped too, so the catalog the model sees stays unambiguous.
    pub async fn initialize_tools(&mut self) -> Result<()> {
        for provider in &self.providers {
            let tools = match provider.list_tools().await {
                Ok(tools) => tools,
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Skipping tool provider");
                    continue;
                }
            };
            for tool in tools {
                let taken = self.external_lookup.contains_key(&tool.name)
                    || ToolKind::classify(&tool.name) != ToolKind::External;
                if taken {
                    warn!(
                        provider = provider.name(),
                        tool = %tool.name,
                        "Skipping tool with conflicting name"
                    );
                    continue;
                }
                debug!(provider = provider.name(), tool = %tool.name, "Registered external tool");
                self.external_lookup
                    .insert(tool.name.clone(), provider.clone());
                self.external_specs.push(tool);
            }
        }
        Ok(())
    }

    /// The full tool catalog offered while the turn budget lasts.
    fn full_tool_specs(&self) -> Vec<ToolSpec> {
        let mut specs = all_communication_tools();
        if let Some(tool) = &self.gt_tool {
            specs.push(tool.spec());
        }
        if let Some(tool) = &self.conversation_tool {
            specs.push(tool.spec());
        }
        specs.extend(self.external_specs.iter().cloned());
        specs
    }

    /// The rendered tool-call history for a conversation, if any events exist.
    pub fn rendered_tool_calls(&self, conversation: &str) -> Option<String> {
        self.tool_call_histories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conversation)
            .filter(|h| !h.is_empty())
            .map(|h| h.to_string())
    }

    fn turn_counter(&self, conversation: &str) -> usize {
        self.turn_counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conversation)
            .copied()
            .unwrap_or(0)
    }

    fn set_turn_counter(&self, conversation: &str, value: usize) {
        self.turn_counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(conversation.to_string(), value);
    }

    /// Run the tool-use loop for one user turn.
    ///
    /// `request` carries the conversation context; the agent fills in the
    /// allowed tool set and tool-call history itself. Returns the final
    /// model outcome, whose communication responses are the user-visible
    /// reply.
    ///
    /// # Errors
    ///
    /// Fails with [`DoppelError::UnknownTool`] when the model requests a
    /// tool that matches no built-in, no search tool, and no registered
    /// provider; model transport and parse errors propagate unchanged.
    pub async fn invoke(&self, mut request: ChatRequest) -> Result<ChatOutcome> {
        let conversation = request.conversation.clone();

        loop {
            let counter = self.turn_counter(&conversation);
            let terminal = counter >= self.max_turns;
            request.allowed_tools = if terminal {
                terminal_tools()
            } else {
                self.full_tool_specs()
            };
            request.tool_call_history = self.rendered_tool_calls(&conversation);

            debug!(
                conversation = %conversation,
                turn = counter,
                terminal,
                "Requesting model step"
            );
            let outcome = self.llm.chat_step(&request).await?;

            let mut events = Vec::new();
            let mut communication = None;
            for response in &outcome.responses {
                match response {
                    ModelResponse::Text(text) => {
                        // Pure-text backends cannot call tools; text is the reply.
                        communication = Some(ToolCallEvent::pending(
                            "message",
                            serde_json::json!({ "message_content": text }),
                        ));
                        break;
                    }
                    ModelResponse::ToolCall {
                        name, arguments, ..
                    } => match ToolKind::classify(name) {
                        ToolKind::Communication(_) => {
                            communication =
                                Some(ToolCallEvent::pending(name, arguments.clone()));
                            break;
                        }
                        ToolKind::RetrievalSearch(corpus) => {
                            events.extend(self.execute_search(corpus, arguments).await?);
                        }
                        ToolKind::External => {
                            let provider =
                                self.external_lookup.get(name).cloned().ok_or_else(|| {
                                    DoppelError::UnknownTool(name.clone())
                                })?;
                            events.extend(provider.call(name, arguments.clone()).await?);
                        }
                    },
                }
            }

            {
                let mut histories = self
                    .tool_call_histories
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                let history = histories
                    .entry(conversation.clone())
                    .or_insert_with(|| ToolCallHistory::new(self.max_turns));
                for event in events {
                    history.add_event(event);
                }

                if let Some(event) = communication {
                    debug!(
                        conversation = %conversation,
                        tool = %event.tool_name,
                        "Communication response, turn complete"
                    );
                    history.add_event(event);
                    drop(histories);
                    self.set_turn_counter(&conversation, 0);
                    return Ok(outcome);
                }
            }

            self.set_turn_counter(&conversation, counter + 1);
            if terminal {
                // The restricted tool set did not yield a communication
                // response; stop rather than loop past the budget.
                warn!(
                    conversation = %conversation,
                    "Turn budget exhausted without a communication response"
                );
                return Ok(outcome);
            }
        }
    }

    async fn execute_search(
        &self,
        corpus: SearchCorpus,
        arguments: &serde_json::Value,
    ) -> Result<Vec<ToolCallEvent>> {
        let tool = match corpus {
            SearchCorpus::GroundTruth => self.gt_tool.as_ref(),
            SearchCorpus::Conversation => self.conversation_tool.as_ref(),
        };
        let tool = tool.ok_or_else(|| {
            DoppelError::UnknownTool(corpus.tool_name().to_string())
        })?;
        let query = arguments
            .get("query")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        match tool.execute(query).await {
            Ok(events) => Ok(events),
            Err(e) => {
                // Retrieval is optional context; a failed search mid-turn
                // degrades to no results instead of killing the turn.
                warn!(tool = corpus.tool_name(), error = %e, "Search tool failed");
                Ok(Vec::new())
            }
        }
    }
}
