//! Configuration management for Doppel
//!
//! Configuration is loaded from a JSON file with environment variable
//! overrides, validated once at startup, and passed by reference to the
//! components that need it. There is no process-wide configuration
//! singleton.

mod types;

pub use types::*;

use std::path::{Path, PathBuf};

use crate::error::{DoppelError, Result};

impl Config {
    /// Returns the Doppel configuration directory path (~/.doppel)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".doppel")
    }

    /// Returns the path to the default config file (~/.doppel/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a path with environment overrides applied.
    ///
    /// A missing file yields the default configuration. The result is
    /// validated before being returned.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Variables follow the pattern `DOPPEL_SECTION_KEY`.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DOPPEL_NAME") {
            self.name = val;
        }
        if let Ok(val) = std::env::var("DOPPEL_LLM_API_KEY") {
            self.llm.api_key = val;
        }
        if let Ok(val) = std::env::var("DOPPEL_LLM_API_BASE") {
            self.llm.api_base = val;
        }
        if let Ok(val) = std::env::var("DOPPEL_LLM_MODEL") {
            self.llm.model = val;
        }
        if let Ok(val) = std::env::var("DOPPEL_RETRIEVAL_GT_STORE_ENDPOINT") {
            self.retrieval.gt_store_endpoint = Some(val);
        }
        if let Ok(val) = std::env::var("DOPPEL_RETRIEVAL_CONVERSATION_STORE_ENDPOINT") {
            self.retrieval.conversation_store_endpoint = Some(val);
        }
        if let Ok(val) = std::env::var("DOPPEL_TOOLS_ENABLED") {
            if let Ok(v) = val.parse() {
                self.tools.enabled = v;
            }
        }
        if let Ok(val) = std::env::var("DOPPEL_TOOLS_MAX_TURNS") {
            if let Ok(v) = val.parse() {
                self.tools.max_turns = v;
            }
        }
        if let Ok(val) = std::env::var("DOPPEL_LOGGING_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Check invariants that the rest of the system relies on.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DoppelError::Config("name must not be empty".to_string()));
        }
        if self.history.max_char_length == 0 {
            return Err(DoppelError::Config(
                "history.max_char_length must be positive".to_string(),
            ));
        }
        if self.history.archive_chunk_length == 0 {
            return Err(DoppelError::Config(
                "history.archive_chunk_length must be positive".to_string(),
            ));
        }
        if self.query_context_depth == 0 {
            return Err(DoppelError::Config(
                "query_context_depth must be positive".to_string(),
            ));
        }
        if self.tools.enabled && self.tools.max_turns == 0 {
            return Err(DoppelError::Config(
                "tools.max_turns must be positive when tools are enabled".to_string(),
            ));
        }
        if self.llm.api_base.trim().is_empty() {
            return Err(DoppelError::Config(
                "llm.api_base must not be empty".to_string(),
            ));
        }
        if self.history.update_index && self.retrieval.conversation_store_endpoint.is_none() {
            return Err(DoppelError::Config(
                "history.update_index requires retrieval.conversation_store_endpoint".to_string(),
            ));
        }
        Ok(())
    }
}
