//! External tool provider protocol
//!
//! Dynamically discovered tools come from pluggable providers: anything
//! that can list its tools and execute a call by name. The agent builds a
//! `name -> provider` lookup table from `list_tools` at initialization.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{DoppelError, Result};

use super::types::{ToolCallEvent, ToolSpec};

/// A pluggable source of external tools.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Human-readable provider name, for logging.
    fn name(&self) -> &str;

    /// Enumerate the tools this provider offers.
    async fn list_tools(&self) -> Result<Vec<ToolSpec>>;

    /// Invoke a tool by name. Returns one event per result payload.
    async fn call(&self, tool_name: &str, args: Value) -> Result<Vec<ToolCallEvent>>;
}

#[derive(Deserialize)]
struct ListToolsResponse {
    tools: Vec<ToolSpec>,
}

#[derive(Deserialize)]
struct CallResponse {
    results: Vec<String>,
}

/// JSON-over-HTTP tool provider.
///
/// Wire format: `POST {base}/tools/list` returning `{tools: [ToolSpec]}`,
/// and `POST {base}/tools/call` with `{name, arguments}` returning
/// `{results: [string]}`.
pub struct HttpToolProvider {
    name: String,
    endpoint: String,
    client: reqwest::Client,
}

impl HttpToolProvider {
    /// Create a provider client for the given endpoint.
    pub fn new(name: &str, endpoint: &str) -> Self {
        Self {
            name: name.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ToolProvider for HttpToolProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        debug!(provider = %self.name, "Listing external tools");
        let response = self
            .client
            .post(format!("{}/tools/list", self.endpoint))
            .send()
            .await
            .map_err(|e| DoppelError::Tool(format!("{}: list failed: {}", self.name, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DoppelError::Tool(format!(
                "{}: list returned HTTP {}",
                self.name, status
            )));
        }

        let parsed: ListToolsResponse = response
            .json()
            .await
            .map_err(|e| DoppelError::Tool(format!("{}: malformed tool list: {}", self.name, e)))?;
        Ok(parsed.tools)
    }

    async fn call(&self, tool_name: &str, args: Value) -> Result<Vec<ToolCallEvent>> {
        let start = Utc::now();
        debug!(provider = %self.name, tool = tool_name, "Calling external tool");
        let response = self
            .client
            .post(format!("{}/tools/call", self.endpoint))
            .json(&serde_json::json!({ "name": tool_name, "arguments": args }))
            .send()
            .await
            .map_err(|e| DoppelError::Tool(format!("{}: call failed: {}", self.name, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DoppelError::Tool(format!(
                "{}: call returned HTTP {}: {}",
                self.name, status, body
            )));
        }

        let parsed: CallResponse = response
            .json()
            .await
            .map_err(|e| DoppelError::Tool(format!("{}: malformed call result: {}", self.name, e)))?;
        let end = Utc::now();

        Ok(parsed
            .results
            .into_iter()
            .map(|result| ToolCallEvent::completed(tool_name, args.clone(), &result, start, end))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_provider_trims_trailing_slash() {
        let provider = HttpToolProvider::new("weather", "http://localhost:9100/");
        assert_eq!(provider.endpoint, "http://localhost:9100");
        assert_eq!(provider.name(), "weather");
    }

    #[test]
    fn test_list_tools_response_deserialization() {
        let body = r#"{"tools": [{"name": "weather_lookup", "description": "Look up weather", "parameters": {"type": "object", "properties": {}, "required": []}}]}"#;
        let parsed: ListToolsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.tools.len(), 1);
        assert_eq!(parsed.tools[0].name, "weather_lookup");
    }

    #[test]
    fn test_call_response_deserialization() {
        let body = r#"{"results": ["sunny", "22C"]}"#;
        let parsed: CallResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.results, vec!["sunny", "22C"]);
    }
}
