//! Bounded conversation history with asynchronous archival
//!
//! This module provides the per-conversation message buffer. The buffer is
//! bounded by serialized character length, not message count; messages
//! evicted from the head are staged in an eviction buffer and archived into
//! a retrieval store once enough of them accumulate, so old conversation
//! content stays searchable after leaving the live window.

mod message;

pub use message::{Attachment, MediaKind, Message};

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::retrieval::RetrievalStore;

/// Per-conversation bounded buffer of messages.
///
/// Append-only at the tail, evicted from the head. One instance exists per
/// distinct conversation key, created lazily on the first message and living
/// for the process lifetime. Call [`ConversationHistory::emergency_save`]
/// exactly once at shutdown to flush everything that remains.
pub struct ConversationHistory {
    /// Live buffer, oldest message first
    messages: VecDeque<Message>,
    /// Messages evicted from the live buffer but not yet archived
    evicted: Vec<Message>,
    /// Maximum serialized length of the live buffer, in characters
    max_char_length: usize,
    /// Eviction-buffer size that triggers an archival flush
    archive_chunk_length: usize,
    /// Whether rendered lines carry a timestamp prefix
    include_timestamp: bool,
    /// QA mode: keep only the single most recent message
    qa_mode: bool,
    /// Conversation title used as the archival prefix
    title: String,
    /// Archival sink. `None` disables archival entirely.
    archive: Option<Arc<dyn RetrievalStore>>,
}

impl ConversationHistory {
    /// Create a new empty history.
    ///
    /// # Arguments
    /// * `title` - Conversation label used when archiving
    /// * `max_char_length` - Serialized-length budget for the live buffer
    /// * `archive_chunk_length` - Eviction-buffer size that triggers a flush
    /// * `include_timestamp` - Render timestamps into prompt/archive lines
    /// * `qa_mode` - Single-message window for isolated QA evaluation
    /// * `archive` - Optional shared archival sink
    pub fn new(
        title: &str,
        max_char_length: usize,
        archive_chunk_length: usize,
        include_timestamp: bool,
        qa_mode: bool,
        archive: Option<Arc<dyn RetrievalStore>>,
    ) -> Self {
        Self {
            messages: VecDeque::new(),
            evicted: Vec::new(),
            max_char_length,
            archive_chunk_length,
            include_timestamp,
            qa_mode,
            title: title.to_string(),
            archive,
        }
    }

    /// Append a message, then trim the buffer back under its budget.
    ///
    /// Trimming may move messages into the eviction buffer; once that buffer
    /// reaches the chunk threshold it is flushed as a single archival write.
    /// A flush always contains at least the threshold count but is not
    /// capped: a burst of evictions in one `add` goes out in one write.
    pub async fn add(&mut self, message: Message) {
        debug!(
            conversation = %message.conversation,
            sender = %message.sender,
            "Adding message to history"
        );
        self.messages.push_back(message);
        self.trim().await;
    }

    /// Trim the live buffer down to its budget, staging evictions.
    async fn trim(&mut self) {
        if self.qa_mode {
            // Isolated question answering: only the most recent message counts.
            while self.messages.len() > 1 {
                self.messages.pop_front();
            }
            return;
        }

        // A single over-budget message is retained rather than leaving the
        // history empty, so the loop stops once one message remains.
        while self.rendered_len() > self.max_char_length && self.messages.len() > 1 {
            if let Some(removed) = self.messages.pop_front() {
                self.evicted.push(removed);
            }
            if self.evicted.len() >= self.archive_chunk_length {
                debug!(
                    buffered = self.evicted.len(),
                    threshold = self.archive_chunk_length,
                    "Eviction buffer reached chunk threshold, flushing"
                );
                self.flush_evicted().await;
            }
        }
    }

    /// Flush the eviction buffer as one concatenated archival write.
    ///
    /// On archival failure the buffer is kept so the content can be retried
    /// at the next flush or at `emergency_save` (at-least-once archival).
    async fn flush_evicted(&mut self) {
        if self.evicted.is_empty() {
            return;
        }
        let Some(archive) = self.archive.clone() else {
            // No sink configured: evicted content is intentionally dropped.
            self.evicted.clear();
            return;
        };

        let chunk = self
            .evicted
            .iter()
            .map(|m| m.archive_string(&self.title, self.include_timestamp))
            .collect::<Vec<_>>()
            .join("\n");

        match archive.update(&chunk).await {
            Ok(()) => {
                debug!(messages = self.evicted.len(), "Archived evicted chunk");
                self.evicted.clear();
            }
            Err(e) => {
                warn!(error = %e, "Archival write failed, retaining eviction buffer");
            }
        }
    }

    /// Render the most recent `depth` messages as a single string, oldest of
    /// the selected window first. Does not mutate state.
    pub fn str_of_depth(&self, depth: usize) -> String {
        let skip = self.messages.len().saturating_sub(depth);
        self.messages
            .iter()
            .skip(skip)
            .map(|m| m.render(self.include_timestamp))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Serialized length of the full live buffer, in characters.
    pub fn rendered_len(&self) -> usize {
        self.str_of_depth(self.messages.len()).chars().count()
    }

    /// Discard the live buffer. The eviction buffer is untouched, so content
    /// already evicted still gets archived.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Flush all remaining content to the archival sink at shutdown.
    ///
    /// The eviction buffer goes first (those messages were evicted earliest),
    /// then the live buffer is partitioned into chunks of
    /// `archive_chunk_length` and archived oldest chunk first. Skipped
    /// entirely when no sink is configured. Not idempotent — call at most
    /// once per shutdown.
    pub async fn emergency_save(&mut self) {
        if self.archive.is_none() {
            return;
        }
        debug!(
            live = self.messages.len(),
            evicted = self.evicted.len(),
            "Emergency save"
        );

        self.flush_evicted().await;

        let messages: Vec<Message> = self.messages.drain(..).collect();
        let Some(archive) = self.archive.clone() else {
            return;
        };
        for chunk in messages.chunks(self.archive_chunk_length.max(1)) {
            let rendered = chunk
                .iter()
                .map(|m| m.archive_string(&self.title, self.include_timestamp))
                .collect::<Vec<_>>()
                .join("\n");
            if let Err(e) = archive.update(&rendered).await {
                warn!(error = %e, "Emergency-save chunk write failed");
            }
        }
    }

    /// URLs of all image attachments in the live buffer, chronological order.
    /// Used to attach vision input to a model request.
    pub fn image_attachments(&self) -> Vec<String> {
        self.messages.iter().flat_map(|m| m.image_urls()).collect()
    }

    /// Number of messages in the live buffer.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the live buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent message, if any.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.back()
    }

    /// Number of messages staged for archival but not yet flushed.
    pub fn evicted_len(&self) -> usize {
        self.evicted.len()
    }
}

impl std::fmt::Display for ConversationHistory {
    /// The full live buffer, one rendered message per line.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.str_of_depth(self.messages.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::MemoryRetrievalStore;

    /// 20 rendered characters: "u: " (3) + 17 content characters.
    fn msg20(content_tag: char) -> Message {
        let content: String = std::iter::repeat(content_tag).take(17).collect();
        Message::new("chat:1", "u", "test", &content)
    }

    fn history(max_chars: usize, chunk: usize, store: Option<Arc<dyn RetrievalStore>>) -> ConversationHistory {
        ConversationHistory::new("chat:1", max_chars, chunk, false, false, store)
    }

    #[tokio::test]
    async fn test_bounded_buffer_invariant() {
        let mut h = history(100, 3, None);
        for i in 0..50 {
            h.add(Message::new("chat:1", "u", "test", &format!("message number {}", i)))
                .await;
            assert!(
                h.rendered_len() <= 100 || h.len() == 1,
                "budget exceeded after add {}",
                i
            );
        }
    }

    #[tokio::test]
    async fn test_scenario_fifty_char_budget() {
        // maxCharLength=50, three 20-char messages: after the third add the
        // buffer holds the last 2 (41 chars with the join) and the eviction
        // buffer holds the first.
        let mut h = history(50, 10, None);
        h.add(msg20('a')).await;
        h.add(msg20('b')).await;
        h.add(msg20('c')).await;

        assert_eq!(h.len(), 2);
        assert_eq!(h.evicted_len(), 1);
        assert!(h.rendered_len() <= 50);
        assert!(h.str_of_depth(2).contains('b'));
        assert!(h.str_of_depth(2).contains('c'));
    }

    #[tokio::test]
    async fn test_qa_mode_keeps_last_message_only() {
        let mut h = ConversationHistory::new("qa", 10_000, 10, false, true, None);
        h.add(Message::synthetic("qa", "u", "first")).await;
        h.add(Message::synthetic("qa", "u", "second")).await;
        h.add(Message::synthetic("qa", "u", "third")).await;

        let newest = Message::synthetic("qa", "u", "newest");
        let newest_content = newest.content.clone();
        h.add(newest).await;

        assert_eq!(h.len(), 1);
        assert_eq!(h.last_message().unwrap().content, newest_content);
    }

    #[tokio::test]
    async fn test_single_oversized_message_retained() {
        let mut h = history(10, 5, None);
        let long: String = "x".repeat(200);
        h.add(Message::new("chat:1", "u", "test", &long)).await;

        assert_eq!(h.len(), 1);
        assert!(h.rendered_len() > 10);
    }

    #[tokio::test]
    async fn test_eviction_triggers_archival_at_threshold() {
        let store = Arc::new(MemoryRetrievalStore::new());
        let mut h = history(45, 2, Some(store.clone()));

        // Each add past capacity evicts one message; two evictions hit the
        // chunk threshold and flush both as one write.
        for tag in ['q', 'r', 'v', 'w'] {
            h.add(msg20(tag)).await;
        }

        let docs = store.snapshot();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].contains('q'));
        assert!(docs[0].contains('r'));
        // Oldest first within the chunk
        assert!(docs[0].find('q').unwrap() < docs[0].find('r').unwrap());
    }

    #[tokio::test]
    async fn test_burst_eviction_flushes_in_one_write() {
        let store = Arc::new(MemoryRetrievalStore::new());
        let mut h = history(10_000, 3, Some(store.clone()));
        for tag in ['q', 'r', 'v', 'w'] {
            h.add(msg20(tag)).await;
        }
        assert!(store.snapshot().is_empty());

        // Shrinking the budget is not possible, so force a burst with one
        // giant message that evicts everything ahead of it in a single add.
        let giant: String = "z".repeat(9_980);
        h.add(Message::new("chat:1", "u", "test", &giant)).await;

        let docs = store.snapshot();
        // Four messages evicted in one trim; threshold is 3, flush is uncapped.
        assert_eq!(docs.len(), 1);
        for tag in ['q', 'r', 'v', 'w'] {
            assert!(docs[0].contains(tag));
        }
    }

    #[tokio::test]
    async fn test_no_loss_eviction_order_across_lifetime() {
        let store = Arc::new(MemoryRetrievalStore::new());
        let mut h = history(45, 2, Some(store.clone()));

        let tags = ['q', 'r', 'v', 'w', 'x', 'y'];
        for tag in tags {
            h.add(msg20(tag)).await;
        }
        h.emergency_save().await;

        // Every message appears exactly once across the archival payloads,
        // in original order.
        let all = store.snapshot().join("\n");
        let mut last_pos = 0;
        for tag in tags {
            let pos = all.find(tag).unwrap_or_else(|| panic!("{} missing", tag));
            assert!(pos >= last_pos, "{} archived out of order", tag);
            assert_eq!(all.matches(tag).count(), 17, "{} archived more than once", tag);
            last_pos = pos;
        }
    }

    #[tokio::test]
    async fn test_emergency_save_chunks_oldest_first() {
        let store = Arc::new(MemoryRetrievalStore::new());
        let mut h = history(10_000, 2, Some(store.clone()));
        for tag in ['q', 'r', 'v', 'w', 'x'] {
            h.add(msg20(tag)).await;
        }
        h.emergency_save().await;

        let docs = store.snapshot();
        // Five messages in chunks of two: [q,r], [v,w], [x]
        assert_eq!(docs.len(), 3);
        assert!(docs[0].contains('q') && docs[0].contains('r'));
        assert!(docs[1].contains('v') && docs[1].contains('w'));
        assert!(docs[2].contains('x'));
        assert!(h.is_empty());
    }

    #[tokio::test]
    async fn test_emergency_save_without_sink_is_noop() {
        let mut h = history(10_000, 2, None);
        h.add(msg20('a')).await;
        h.emergency_save().await;
        // Live buffer untouched when there is nowhere to save
        assert_eq!(h.len(), 1);
    }

    #[tokio::test]
    async fn test_str_of_depth_idempotent() {
        let mut h = history(10_000, 5, None);
        for tag in ['a', 'b', 'c'] {
            h.add(msg20(tag)).await;
        }
        let first = h.str_of_depth(2);
        let second = h.str_of_depth(2);
        assert_eq!(first, second);
        assert_eq!(h.len(), 3);
    }

    #[tokio::test]
    async fn test_str_of_depth_window_is_oldest_first() {
        let mut h = history(10_000, 5, None);
        h.add(Message::new("c", "u", "t", "one")).await;
        h.add(Message::new("c", "u", "t", "two")).await;
        h.add(Message::new("c", "u", "t", "three")).await;

        let window = h.str_of_depth(2);
        assert_eq!(window, "u: two\nu: three");

        // Depth larger than the buffer returns everything
        let all = h.str_of_depth(10);
        assert_eq!(all, "u: one\nu: two\nu: three");
    }

    #[tokio::test]
    async fn test_clear_keeps_eviction_buffer() {
        let store = Arc::new(MemoryRetrievalStore::new());
        let mut h = history(45, 10, Some(store.clone()));
        for tag in ['q', 'r', 'v'] {
            h.add(msg20(tag)).await;
        }
        assert_eq!(h.evicted_len(), 1);

        h.clear();
        assert!(h.is_empty());
        assert_eq!(h.evicted_len(), 1);

        h.emergency_save().await;
        let docs = store.snapshot();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].contains('q'));
    }

    #[tokio::test]
    async fn test_image_attachments_chronological() {
        let mut h = history(10_000, 5, None);
        h.add(
            Message::new("c", "u", "t", "first")
                .with_attachment(Attachment::new("one.png", "https://cdn/one.png")),
        )
        .await;
        h.add(Message::new("c", "u", "t", "no attachment")).await;
        h.add(
            Message::new("c", "u", "t", "second")
                .with_attachment(Attachment::new("doc.pdf", "https://cdn/doc.pdf"))
                .with_attachment(Attachment::new("two.jpg", "https://cdn/two.jpg")),
        )
        .await;

        assert_eq!(
            h.image_attachments(),
            vec!["https://cdn/one.png", "https://cdn/two.jpg"]
        );
    }

    #[tokio::test]
    async fn test_archive_lines_carry_title_prefix() {
        let store = Arc::new(MemoryRetrievalStore::new());
        let mut h = ConversationHistory::new("general", 45, 1, false, false, Some(store.clone()));
        for tag in ['q', 'r', 'v'] {
            h.add(msg20(tag)).await;
        }
        let docs = store.snapshot();
        assert!(!docs.is_empty());
        assert!(docs[0].starts_with("(general) "));
    }
}
