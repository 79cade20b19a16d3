//! Message types for conversation history
//!
//! This module defines the immutable `Message` value representing one unit
//! of conversational input (text, reaction, or synthetic QA message), plus
//! attachment metadata used for archival rendering and vision input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of media that can be attached to messages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Image files (PNG, JPG, GIF, etc.)
    Image,
    /// Audio files (MP3, WAV, OGG, etc.)
    Audio,
    /// Video files (MP4, WebM, etc.)
    Video,
    /// Document files (PDF, DOCX, etc.)
    Document,
}

impl MediaKind {
    /// Infer the media kind from a filename extension.
    ///
    /// Platforms that do not tag attachment types still name their uploads,
    /// so the extension is the best available signal. Unrecognized
    /// extensions fall back to `Document`.
    pub fn from_filename(filename: &str) -> Self {
        let ext = filename
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" => MediaKind::Image,
            "mp3" | "wav" | "ogg" | "flac" | "m4a" => MediaKind::Audio,
            "mp4" | "webm" | "mov" | "mkv" => MediaKind::Video,
            _ => MediaKind::Document,
        }
    }
}

/// A file attached to a message (filename + URL).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    /// Original filename as reported by the platform
    pub filename: String,
    /// URL where the attachment content is hosted
    pub url: String,
    /// The kind of media this attachment holds
    pub kind: MediaKind,
}

impl Attachment {
    /// Create a new attachment, inferring the media kind from the filename.
    pub fn new(filename: &str, url: &str) -> Self {
        Self {
            filename: filename.to_string(),
            url: url.to_string(),
            kind: MediaKind::from_filename(filename),
        }
    }

    /// Create an attachment with an explicit media kind.
    pub fn with_kind(filename: &str, url: &str, kind: MediaKind) -> Self {
        Self {
            filename: filename.to_string(),
            url: url.to_string(),
            kind,
        }
    }

    /// Whether this attachment is an image (candidate for vision input).
    pub fn is_image(&self) -> bool {
        self.kind == MediaKind::Image
    }
}

/// One unit of conversational input.
///
/// Messages are created by an external adapter (chat platform, CLI, eval
/// harness), are immutable after construction, and are owned exclusively by
/// the `ConversationHistory` they are appended to until evicted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Opaque key of the conversation this message belongs to
    pub conversation: String,
    /// When the message was sent. `None` for synthetic QA messages.
    pub timestamp: Option<DateTime<Utc>>,
    /// Display name of the sender
    pub sender: String,
    /// Source platform tag (e.g., "discord", "cli", "eval")
    pub platform: String,
    /// The text content of the message
    pub content: String,
    /// Ordered attachments, if any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Id of the message this one replies to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Rendered summary of reactions on this message, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reactions: Option<String>,
    /// Stable message id. Platform-provided, or a generated v4 UUID.
    /// Required for reply-threading and deduplication.
    pub id: String,
}

impl Message {
    /// Create a new message with a generated id and the current timestamp.
    ///
    /// # Example
    /// ```
    /// use doppel::history::Message;
    ///
    /// let msg = Message::new("chat:1", "alice", "cli", "hello there");
    /// assert_eq!(msg.sender, "alice");
    /// assert!(msg.timestamp.is_some());
    /// assert!(!msg.id.is_empty());
    /// ```
    pub fn new(conversation: &str, sender: &str, platform: &str, content: &str) -> Self {
        Self {
            conversation: conversation.to_string(),
            timestamp: Some(Utc::now()),
            sender: sender.to_string(),
            platform: platform.to_string(),
            content: content.to_string(),
            attachments: Vec::new(),
            reply_to: None,
            reactions: None,
            id: Uuid::new_v4().to_string(),
        }
    }

    /// Create a synthetic QA message: no timestamp, generated id.
    ///
    /// Used by evaluation harnesses where question/answer pairs are
    /// independent and wall-clock time is meaningless.
    pub fn synthetic(conversation: &str, sender: &str, content: &str) -> Self {
        Self {
            conversation: conversation.to_string(),
            timestamp: None,
            sender: sender.to_string(),
            platform: "eval".to_string(),
            content: content.to_string(),
            attachments: Vec::new(),
            reply_to: None,
            reactions: None,
            id: Uuid::new_v4().to_string(),
        }
    }

    /// Derive a reaction message from a target message.
    ///
    /// Synthesizes a textual description of the reaction event so it renders
    /// like any other message in prompts and archival writes.
    ///
    /// # Example
    /// ```
    /// use doppel::history::Message;
    ///
    /// let original = Message::new("chat:1", "alice", "discord", "ship it");
    /// let reaction = Message::reaction(&original, "bob", "👍", true);
    /// assert!(reaction.content.contains("Reacted with 👍"));
    /// assert_eq!(reaction.reply_to.as_deref(), Some(original.id.as_str()));
    /// ```
    pub fn reaction(target: &Message, sender: &str, emoji: &str, added: bool) -> Self {
        let content = if added {
            format!("Reacted with {} to \"{}\"", emoji, target.content)
        } else {
            format!("Removed reaction {} from \"{}\"", emoji, target.content)
        };
        let mut msg = Message::new(&target.conversation, sender, &target.platform, &content);
        msg.reply_to = Some(target.id.clone());
        msg
    }

    /// Override the generated id with a platform-provided one (builder pattern).
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    /// Set an explicit timestamp (builder pattern).
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Append an attachment (builder pattern).
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Set the replied-to message id (builder pattern).
    pub fn with_reply_to(mut self, message_id: &str) -> Self {
        self.reply_to = Some(message_id.to_string());
        self
    }

    /// Set the reaction summary (builder pattern).
    pub fn with_reactions(mut self, reactions: &str) -> Self {
        self.reactions = Some(reactions.to_string());
        self
    }

    /// Render this message as a single prompt/archive line.
    ///
    /// `[YYYY-MM-DD HH:MM] sender: content` when `include_timestamp` is set
    /// and a timestamp is present, otherwise `sender: content`.
    pub fn render(&self, include_timestamp: bool) -> String {
        match (include_timestamp, self.timestamp) {
            (true, Some(ts)) => format!(
                "[{}] {}: {}",
                ts.format("%Y-%m-%d %H:%M"),
                self.sender,
                self.content
            ),
            _ => format!("{}: {}", self.sender, self.content),
        }
    }

    /// Render this message for an archival write, prefixed with the
    /// conversation title.
    pub fn archive_string(&self, title: &str, include_timestamp: bool) -> String {
        format!("({}) {}", title, self.render(include_timestamp))
    }

    /// URLs of image attachments on this message, in order.
    pub fn image_urls(&self) -> Vec<String> {
        self.attachments
            .iter()
            .filter(|a| a.is_image())
            .map(|a| a.url.clone())
            .collect()
    }
}
