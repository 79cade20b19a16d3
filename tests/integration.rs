//! End-to-end tests over the public crate surface: controller + agent +
//! history wired together with in-memory collaborators.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use doppel::config::Config;
use doppel::controller::{ChatController, ResponseDispatcher};
use doppel::history::Message;
use doppel::llm::{ChatOutcome, ChatRequest, LanguageModel, ModelResponse};
use doppel::retrieval::MemoryRetrievalStore;
use doppel::{DoppelError, Result, RetrievalStore};
use tokio_test::assert_ok;

fn base_config() -> Config {
    let mut config = Config::default();
    config.name = "zef".to_string();
    config.history.update_index = false;
    config.history.include_timestamp = false;
    config
}

fn inbound(conversation: &str, content: &str) -> Message {
    Message::new(conversation, "alice", "test", content)
}

/// Echoes the last history line back, optionally sleeping first when the
/// content asks for it. Used to simulate a slow in-flight response.
struct EchoModel {
    calls: StdMutex<usize>,
}

#[async_trait]
impl LanguageModel for EchoModel {
    async fn chat_step(&self, request: &ChatRequest) -> Result<ChatOutcome> {
        *self.calls.lock().unwrap() += 1;
        let last = request.history.lines().last().unwrap_or("").to_string();
        if last.contains("slow") {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Ok(ChatOutcome {
            prompt: String::new(),
            responses: vec![ModelResponse::Text(format!("re: {}", last))],
        })
    }

    fn name(&self) -> &str {
        "echo"
    }
}

/// Always asks for the same tool call, no matter what.
struct StubbornModel {
    tool: String,
    calls: StdMutex<usize>,
}

#[async_trait]
impl LanguageModel for StubbornModel {
    async fn chat_step(&self, _request: &ChatRequest) -> Result<ChatOutcome> {
        *self.calls.lock().unwrap() += 1;
        Ok(ChatOutcome {
            prompt: String::new(),
            responses: vec![ModelResponse::ToolCall {
                id: "call".to_string(),
                name: self.tool.clone(),
                arguments: json!({ "query": "anything" }),
            }],
        })
    }

    fn name(&self) -> &str {
        "stubborn"
    }
}

#[tokio::test]
async fn cancellation_drops_superseded_response() {
    let model = Arc::new(EchoModel {
        calls: StdMutex::new(0),
    });
    let controller = Arc::new(ChatController::new(&base_config(), model));
    let (dispatcher, mut outputs) = ResponseDispatcher::new(controller);

    let _ = dispatcher.spawn_response(inbound("chat:1", "something slow please"));
    // let the first turn reach its model call
    tokio::time::sleep(Duration::from_millis(50)).await;
    let _ = dispatcher.spawn_response(inbound("chat:1", "actually answer this"));

    let output = tokio::time::timeout(Duration::from_secs(5), outputs.recv())
        .await
        .expect("second turn should complete quickly")
        .unwrap();
    assert!(output.messages[0].content.contains("actually answer this"));

    // no late response for the first message ever arrives
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(outputs.try_recv().is_err());
}

#[tokio::test]
async fn independent_conversations_do_not_cancel_each_other() {
    let model = Arc::new(EchoModel {
        calls: StdMutex::new(0),
    });
    let controller = Arc::new(ChatController::new(&base_config(), model));
    let (dispatcher, mut outputs) = ResponseDispatcher::new(controller);

    let _ = dispatcher.spawn_response(inbound("chat:1", "hello from one"));
    let _ = dispatcher.spawn_response(inbound("chat:2", "hello from two"));

    let mut seen = Vec::new();
    for _ in 0..2 {
        let output = tokio::time::timeout(Duration::from_secs(5), outputs.recv())
            .await
            .expect("both turns should complete")
            .unwrap();
        seen.push(output.conversation);
    }
    seen.sort();
    assert_eq!(seen, vec!["chat:1", "chat:2"]);
}

#[tokio::test]
async fn slow_conversation_does_not_block_others() {
    let model = Arc::new(EchoModel {
        calls: StdMutex::new(0),
    });
    let controller = Arc::new(ChatController::new(&base_config(), model));
    let (dispatcher, mut outputs) = ResponseDispatcher::new(controller);

    // first conversation stalls inside its model call for 30s
    let _ = dispatcher.spawn_response(inbound("chat:slow", "something slow please"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    let _ = dispatcher.spawn_response(inbound("chat:fast", "quick question"));

    // the fast conversation's reply arrives while the slow one is mid-call
    let output = tokio::time::timeout(Duration::from_secs(2), outputs.recv())
        .await
        .expect("fast conversation should not wait on the slow one")
        .unwrap();
    assert_eq!(output.conversation, "chat:fast");
    assert!(output.messages[0].content.contains("quick question"));
}

#[tokio::test]
async fn turn_budget_bounds_model_calls_end_to_end() {
    let model = Arc::new(StubbornModel {
        tool: "search_ground_truth".to_string(),
        calls: StdMutex::new(0),
    });
    let mut config = base_config();
    config.tools.enabled = true;
    config.tools.max_turns = 2;

    let store = Arc::new(MemoryRetrievalStore::new());
    store.update("a fact").await.unwrap();
    let mut controller =
        ChatController::new(&config, model.clone()).with_ground_truth_store(store);
    controller.initialize().await.unwrap();

    let message = inbound("chat:1", "tell me things");
    controller.update_history(message.clone()).await;
    let output = tokio_test::assert_ok!(controller.make_response(&message).await);

    // two full-catalog calls plus one terminal call, then a forced stop
    assert_eq!(*model.calls.lock().unwrap(), 3);
    assert!(output.messages.is_empty());
}

#[tokio::test]
async fn unknown_tool_fails_turn_but_keeps_history() {
    let model = Arc::new(StubbornModel {
        tool: "frobnicate".to_string(),
        calls: StdMutex::new(0),
    });
    let mut config = base_config();
    config.tools.enabled = true;

    let mut controller = ChatController::new(&config, model);
    controller.initialize().await.unwrap();

    let message = inbound("chat:1", "please frobnicate");
    controller.update_history(message.clone()).await;
    let err = controller.make_response(&message).await.unwrap_err();

    assert!(matches!(err, DoppelError::UnknownTool(name) if name == "frobnicate"));
    // the failed turn added nothing beyond the inbound message
    let follow_up = inbound("chat:1", "are you there");
    controller.update_history(follow_up.clone()).await;
    // a second turn still works against the same history
    let err = controller.make_response(&follow_up).await.unwrap_err();
    assert!(matches!(err, DoppelError::UnknownTool(_)));
}

#[tokio::test]
async fn evicted_content_becomes_searchable() {
    let store = Arc::new(MemoryRetrievalStore::new());
    let model = Arc::new(EchoModel {
        calls: StdMutex::new(0),
    });
    let mut config = base_config();
    config.history.update_index = true;
    config.history.max_char_length = 60;
    config.history.archive_chunk_length = 2;

    let controller =
        ChatController::new(&config, model).with_conversation_store(store.clone());

    for content in [
        "the quick brown fox jumps over",
        "a lazy dog sleeping in the sun",
        "while the cat watches quietly",
        "and the owl hoots at midnight",
    ] {
        controller.update_history(inbound("chat:1", content)).await;
    }

    // enough content was evicted and flushed to be searchable again
    let results = store.search("quick brown fox").await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].contains("(chat:1) alice: the quick brown fox jumps over"));
}
