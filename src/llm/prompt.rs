//! Prompt assembly
//!
//! Renders a [`ChatRequest`](super::ChatRequest) into the single user-role
//! prompt string sent to the backend. Templates are plain text with
//! `{placeholder}` substitution; a built-in template is used when no file
//! is configured.

use std::path::Path;

use chrono::Utc;

use crate::error::{DoppelError, Result};

use super::ChatRequest;

const DEFAULT_TEMPLATE: &str = "\
You are {name}. Respond to the conversation below as {name} would, \
speaking to {user}. Stay in character.

Relevant facts about {name}:
{gt_results}

Excerpts from past conversations:
{conversation_results}

Recent tool activity:
{tool_calls}

Conversation so far{timestamp_note}:
{history}

{name}:";

/// Renders chat requests into prompt text.
#[derive(Debug)]
pub struct PromptFormatter {
    template: String,
}

impl PromptFormatter {
    /// Use the built-in template.
    pub fn new() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }

    /// Load a template from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn from_path(path: &Path) -> Result<Self> {
        let template = std::fs::read_to_string(path).map_err(|e| {
            DoppelError::Config(format!(
                "cannot read prompt template {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self { template })
    }

    /// Render the prompt for a request.
    pub fn make_query(&self, request: &ChatRequest) -> String {
        let timestamp = if request.include_timestamp {
            Utc::now().format("%Y-%m-%d %H:%M").to_string()
        } else {
            String::new()
        };
        let timestamp_note = if request.include_timestamp {
            format!(" (current time: {})", timestamp)
        } else {
            String::new()
        };

        self.template
            .replace("{name}", &request.target_name)
            .replace("{user}", &request.sender_name)
            .replace("{history}", &request.history)
            .replace("{gt_results}", &render_results(&request.gt_results))
            .replace(
                "{conversation_results}",
                &render_results(&request.conversation_results),
            )
            .replace(
                "{tool_calls}",
                request.tool_call_history.as_deref().unwrap_or("(none)"),
            )
            .replace("{timestamp_note}", &timestamp_note)
            .replace("{timestamp}", &timestamp)
    }
}

impl Default for PromptFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn render_results(results: &[String]) -> String {
    if results.is_empty() {
        "(none)".to_string()
    } else {
        results
            .iter()
            .map(|r| format!("- {}", r))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
