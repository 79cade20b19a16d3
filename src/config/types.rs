//! Configuration type definitions for Doppel
//!
//! All types implement serde traits for JSON serialization and have
//! sensible defaults, so a partial config file works.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Main configuration struct for Doppel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Persona name the bot answers as
    pub name: String,
    /// Display name used for users who have none
    pub default_user_name: String,
    /// How many recent messages form the retrieval query
    pub query_context_depth: usize,
    /// Conversation history and archival configuration
    pub history: HistoryConfig,
    /// Retrieval store endpoints
    pub retrieval: RetrievalConfig,
    /// Tool-use agent configuration
    pub tools: ToolsConfig,
    /// Language model backend configuration
    pub llm: LlmConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "doppel".to_string(),
            default_user_name: "user".to_string(),
            query_context_depth: 3,
            history: HistoryConfig::default(),
            retrieval: RetrievalConfig::default(),
            tools: ToolsConfig::default(),
            llm: LlmConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ============================================================================
// History Configuration
// ============================================================================

/// Conversation history and archival configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum rendered length of the live buffer, in characters
    pub max_char_length: usize,
    /// Eviction-buffer size that triggers an archival flush, in messages
    pub archive_chunk_length: usize,
    /// Whether rendered messages carry timestamps
    pub include_timestamp: bool,
    /// Whether evicted messages are written to the conversation store
    pub update_index: bool,
    /// QA mode: keep only the single most recent message per conversation
    pub qa_mode: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_char_length: 4000,
            archive_chunk_length: 10,
            include_timestamp: true,
            update_index: false,
            qa_mode: false,
        }
    }
}

// ============================================================================
// Retrieval Configuration
// ============================================================================

/// Retrieval store endpoints. Either store may be absent, in which case the
/// corresponding context is simply empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Endpoint of the static ground-truth corpus
    pub gt_store_endpoint: Option<String>,
    /// Endpoint of the rolling conversation corpus
    pub conversation_store_endpoint: Option<String>,
    /// Number of results requested per search (default: 3)
    #[serde(default = "default_n_results")]
    pub n_results: usize,
}

fn default_n_results() -> usize {
    3
}

// ============================================================================
// Tools Configuration
// ============================================================================

/// Tool-use agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Whether the agent loop is used at all
    pub enabled: bool,
    /// Non-communication turns allowed before the tool set collapses
    pub max_turns: usize,
    /// External tool provider endpoints
    pub providers: Vec<ToolProviderConfig>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_turns: 3,
            providers: Vec::new(),
        }
    }
}

/// One external tool provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolProviderConfig {
    /// Human-readable provider name
    pub name: String,
    /// Provider base URL
    pub endpoint: String,
}

// ============================================================================
// LLM Configuration
// ============================================================================

/// Language model backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Chat endpoint URL
    pub api_base: String,
    /// API key (usually supplied via DOPPEL_LLM_API_KEY)
    pub api_key: String,
    /// Model identifier
    pub model: String,
    /// Optional prompt template file; the built-in template is used when absent
    pub prompt_template_path: Option<String>,
    /// Extra request body fields (sampling parameters, max tokens, ...)
    pub prompt_params: Value,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.anthropic.com/v1/messages".to_string(),
            api_key: String::new(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            prompt_template_path: None,
            prompt_params: serde_json::json!({ "max_tokens": 1024 }),
        }
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Optional log file; stderr when absent
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable compact output
    Pretty,
    /// One JSON object per line
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.name, "doppel");
        assert_eq!(config.query_context_depth, 3);
        assert_eq!(config.history.max_char_length, 4000);
        assert_eq!(config.history.archive_chunk_length, 10);
        assert!(!config.tools.enabled);
        assert_eq!(config.tools.max_turns, 3);
        assert!(config.retrieval.gt_store_endpoint.is_none());
        assert_eq!(config.retrieval.n_results, 3);
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{"name": "zef", "history": {"max_char_length": 1200}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.name, "zef");
        assert_eq!(config.history.max_char_length, 1200);
        // Defaults apply to unspecified fields
        assert_eq!(config.history.archive_chunk_length, 10);
        assert_eq!(config.default_user_name, "user");
    }

    #[test]
    fn test_tool_provider_config() {
        let json = r#"{
            "tools": {
                "enabled": true,
                "max_turns": 5,
                "providers": [{"name": "weather", "endpoint": "http://localhost:9100"}]
            }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.tools.enabled);
        assert_eq!(config.tools.max_turns, 5);
        assert_eq!(config.tools.providers.len(), 1);
        assert_eq!(config.tools.providers[0].name, "weather");
    }

    #[test]
    fn test_log_format_serde() {
        let format: LogFormat = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(format, LogFormat::Json);
        assert_eq!(serde_json::to_string(&LogFormat::Pretty).unwrap(), "\"pretty\"");
    }
}
