//! Chat controller
//!
//! The top-level per-bot coordinator. Owns one [`ConversationHistory`] per
//! conversation key, wires the agent, the retrieval stores, and the
//! language model together, and produces one reply per inbound message.
//!
//! Each history sits behind its own lock, so turns for different
//! conversations run fully in parallel; the controller-wide map lock is
//! held only to look up or create an entry, never across a model call.
//!
//! [`ResponseDispatcher`] wraps a shared controller for concurrent use: a
//! new message for a conversation aborts any response still in flight for
//! that same conversation, so the bot never answers a superseded message.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::{Duration, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::agent::Agent;
use crate::config::Config;
use crate::error::{DoppelError, Result};
use crate::history::{ConversationHistory, Message};
use crate::llm::{ChatRequest, LanguageModel, ModelResponse};
use crate::retrieval::{HttpRetrievalStore, RetrievalStore};
use crate::tools::HttpToolProvider;

type SharedHistory = Arc<Mutex<ConversationHistory>>;

/// Everything one completed turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutput {
    /// Conversation the turn belongs to
    pub conversation: String,
    /// The rendered prompt, for diagnostics
    pub prompt: String,
    /// All structured model responses from the final model call
    pub responses: Vec<ModelResponse>,
    /// The persona messages recorded into history (one per text reply)
    pub messages: Vec<Message>,
}

/// Per-bot coordinator over histories, retrieval, the agent, and the model.
pub struct ChatController {
    config: Config,
    llm: Arc<dyn LanguageModel>,
    agent: Option<Agent>,
    gt_store: Option<Arc<dyn RetrievalStore>>,
    conversation_store: Option<Arc<dyn RetrievalStore>>,
    histories: StdMutex<HashMap<String, SharedHistory>>,
}

impl ChatController {
    /// Create a controller from configuration.
    ///
    /// Retrieval stores are built from the configured endpoints; the agent
    /// is built by [`initialize`](ChatController::initialize).
    pub fn new(config: &Config, llm: Arc<dyn LanguageModel>) -> Self {
        let gt_store: Option<Arc<dyn RetrievalStore>> = config
            .retrieval
            .gt_store_endpoint
            .as_deref()
            .map(|endpoint| {
                Arc::new(HttpRetrievalStore::new(endpoint, config.retrieval.n_results))
                    as Arc<dyn RetrievalStore>
            });
        let conversation_store: Option<Arc<dyn RetrievalStore>> = config
            .retrieval
            .conversation_store_endpoint
            .as_deref()
            .map(|endpoint| {
                Arc::new(HttpRetrievalStore::new(endpoint, config.retrieval.n_results))
                    as Arc<dyn RetrievalStore>
            });
        Self {
            config: config.clone(),
            llm,
            agent: None,
            gt_store,
            conversation_store,
            histories: StdMutex::new(HashMap::new()),
        }
    }

    /// Replace the ground-truth store (builder pattern, used by tests and
    /// offline runs).
    pub fn with_ground_truth_store(mut self, store: Arc<dyn RetrievalStore>) -> Self {
        self.gt_store = Some(store);
        self
    }

    /// Replace the conversation store (builder pattern).
    pub fn with_conversation_store(mut self, store: Arc<dyn RetrievalStore>) -> Self {
        self.conversation_store = Some(store);
        self
    }

    /// Build the agent (when tool use is enabled) and discover external
    /// tools. Call once before the first turn.
    pub async fn initialize(&mut self) -> Result<()> {
        if !self.config.tools.enabled {
            return Ok(());
        }
        let mut agent = Agent::new(self.config.tools.max_turns, self.llm.clone());
        if let Some(store) = &self.gt_store {
            agent = agent.with_ground_truth_store(store.clone());
        }
        if let Some(store) = &self.conversation_store {
            agent = agent.with_conversation_store(store.clone());
        }
        for provider in &self.config.tools.providers {
            agent = agent.with_provider(Arc::new(HttpToolProvider::new(
                &provider.name,
                &provider.endpoint,
            )));
        }
        agent.initialize_tools().await?;
        self.agent = Some(agent);
        info!("Agent initialized");
        Ok(())
    }

    fn history_entry(&self, conversation: &str) -> SharedHistory {
        let archive = if self.config.history.update_index {
            self.conversation_store.clone()
        } else {
            None
        };
        let config = &self.config.history;
        self.histories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(conversation.to_string())
            .or_insert_with(|| {
                debug!(conversation, "Creating conversation history");
                Arc::new(Mutex::new(ConversationHistory::new(
                    conversation,
                    config.max_char_length,
                    config.archive_chunk_length,
                    config.include_timestamp,
                    config.qa_mode,
                    archive,
                )))
            })
            .clone()
    }

    fn existing_history(&self, conversation: &str) -> Option<SharedHistory> {
        self.histories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conversation)
            .cloned()
    }

    /// Record an inbound message, creating the conversation's history on
    /// first contact.
    pub async fn update_history(&self, message: Message) {
        let history = self.history_entry(&message.conversation);
        history.lock().await.add(message).await;
    }

    /// Produce a reply to `message` and record it into history.
    ///
    /// # Errors
    ///
    /// Fails with [`DoppelError::ConversationNotFound`] when no history
    /// exists yet for the message's conversation: callers must record the
    /// message via [`update_history`](ChatController::update_history)
    /// first. Model errors propagate; retrieval errors degrade to empty
    /// context.
    pub async fn make_response(&self, message: &Message) -> Result<TurnOutput> {
        let conversation = message.conversation.clone();
        let history = self
            .existing_history(&conversation)
            .ok_or_else(|| DoppelError::ConversationNotFound(conversation.clone()))?;

        // hold the conversation lock only long enough to snapshot context
        let (query, rendered, images) = {
            let history = history.lock().await;
            (
                history.str_of_depth(self.config.query_context_depth),
                history.to_string(),
                history.image_attachments(),
            )
        };

        let (gt_results, conversation_results) = futures::join!(
            self.search_degraded(self.gt_store.as_ref(), &query),
            self.search_degraded(self.conversation_store.as_ref(), &query),
        );

        let mut request = ChatRequest::new(
            &self.config.name,
            &message.sender,
            &rendered,
            &conversation,
        )
        .with_retrieval(gt_results, conversation_results)
        .with_images(images);
        request.include_timestamp = self.config.history.include_timestamp;

        let outcome = match self.agent.as_ref() {
            Some(agent) => agent.invoke(request).await?,
            None => self.llm.chat_step(&request).await?,
        };

        let messages = self
            .record_responses(&history, &conversation, &outcome.responses)
            .await;
        Ok(TurnOutput {
            conversation,
            prompt: outcome.prompt,
            responses: outcome.responses,
            messages,
        })
    }

    async fn search_degraded(
        &self,
        store: Option<&Arc<dyn RetrievalStore>>,
        query: &str,
    ) -> Vec<String> {
        let Some(store) = store else {
            return Vec::new();
        };
        match store.search(query).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "Retrieval failed, continuing without context");
                Vec::new()
            }
        }
    }

    /// Append the persona's text replies to history.
    ///
    /// Timestamps are staggered by one second per reply so a multi-message
    /// answer keeps a strict total order when persisted.
    async fn record_responses(
        &self,
        history: &SharedHistory,
        conversation: &str,
        responses: &[ModelResponse],
    ) -> Vec<Message> {
        let base = Utc::now();
        let mut messages = Vec::new();
        let mut history = history.lock().await;
        for response in responses {
            let Some(text) = response.user_text() else {
                continue;
            };
            let timestamp = base + Duration::seconds(messages.len() as i64);
            let message = Message::new(conversation, &self.config.name, "doppel", &text)
                .with_timestamp(timestamp);
            messages.push(message.clone());
            history.add(message).await;
        }
        messages
    }

    /// Drop the live buffer of one conversation. The eviction buffer keeps
    /// its staged messages.
    pub async fn clear(&self, conversation: &str) {
        if let Some(history) = self.existing_history(conversation) {
            history.lock().await.clear();
            info!(conversation, "Conversation history cleared");
        }
    }

    /// Flush every conversation's buffers to the archival store. Call once
    /// at shutdown.
    pub async fn emergency_save(&self) {
        let histories: Vec<SharedHistory> = self
            .histories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        info!(conversations = histories.len(), "Emergency save");
        for history in histories {
            history.lock().await.emergency_save().await;
        }
    }
}

/// Concurrency wrapper over a shared [`ChatController`].
///
/// The abort-handle table lives in its own lock so a newly arrived
/// message can cancel an in-flight turn for the same conversation;
/// turns for different conversations never contend with each other.
pub struct ResponseDispatcher {
    controller: Arc<ChatController>,
    outputs: mpsc::UnboundedSender<TurnOutput>,
    inflight: StdMutex<HashMap<String, AbortHandle>>,
}

impl ResponseDispatcher {
    /// Wrap a controller. Completed turns are delivered on the returned
    /// receiver; failed turns are logged and deliver nothing.
    pub fn new(
        controller: Arc<ChatController>,
    ) -> (Self, mpsc::UnboundedReceiver<TurnOutput>) {
        let (outputs, receiver) = mpsc::unbounded_channel();
        (
            Self {
                controller,
                outputs,
                inflight: StdMutex::new(HashMap::new()),
            },
            receiver,
        )
    }

    /// Record `message` and spawn a response task for it, aborting any
    /// response still in flight for the same conversation.
    pub fn spawn_response(&self, message: Message) -> tokio::task::JoinHandle<()> {
        let conversation = message.conversation.clone();
        let controller = self.controller.clone();
        let outputs = self.outputs.clone();

        let mut inflight = match self.inflight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = inflight.remove(&conversation) {
            debug!(conversation = %conversation, "Aborting superseded response");
            handle.abort();
        }

        let handle = tokio::spawn(async move {
            controller.update_history(message.clone()).await;
            match controller.make_response(&message).await {
                Ok(output) => {
                    // receiver gone means shutdown; nothing to deliver to
                    let _ = outputs.send(output);
                }
                Err(e) => {
                    error!(conversation = %message.conversation, error = %e, "Turn failed");
                }
            }
        });
        inflight.insert(conversation, handle.abort_handle());
        handle
    }
}
