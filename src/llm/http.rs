//! HTTP chat-completion backend
//!
//! Speaks both the Anthropic messages dialect and the OpenAI
//! chat-completions dialect over one code path. The dialect is sniffed
//! from the model name and endpoint, matching how the deployment configs
//! name their backends.

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{DoppelError, Result};
use crate::tools::ToolSpec;

use super::{ChatOutcome, ChatRequest, LanguageModel, ModelResponse, PromptFormatter};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Anthropic,
    OpenAi,
}

impl Dialect {
    fn detect(model: &str, api_base: &str) -> Self {
        if model.to_lowercase().contains("claude") || api_base.contains("anthropic") {
            Dialect::Anthropic
        } else {
            Dialect::OpenAi
        }
    }
}

/// Chat backend over HTTP.
pub struct HttpLanguageModel {
    api_base: String,
    api_key: String,
    model: String,
    prompt_params: Value,
    formatter: PromptFormatter,
    dialect: Dialect,
    client: reqwest::Client,
}

impl HttpLanguageModel {
    /// Create a backend client.
    ///
    /// `prompt_params` is a JSON object merged into every request body
    /// (sampling parameters, max tokens, and so on).
    pub fn new(api_base: &str, api_key: &str, model: &str, prompt_params: Value) -> Self {
        Self {
            api_base: api_base.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            prompt_params,
            formatter: PromptFormatter::new(),
            dialect: Dialect::detect(model, api_base),
            client: reqwest::Client::new(),
        }
    }

    /// Replace the default prompt formatter (builder pattern).
    pub fn with_formatter(mut self, formatter: PromptFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    fn build_body(&self, prompt: &str, request: &ChatRequest) -> Value {
        let content = build_user_content(prompt, &request.image_urls, self.dialect);
        let mut body = Map::new();
        body.insert("model".into(), json!(self.model));
        body.insert(
            "messages".into(),
            json!([{ "role": "user", "content": content }]),
        );
        if !request.allowed_tools.is_empty() {
            body.insert(
                "tools".into(),
                encode_tools(&request.allowed_tools, self.dialect),
            );
        }
        if let Value::Object(params) = &self.prompt_params {
            for (key, value) in params {
                body.insert(key.clone(), value.clone());
            }
        }
        Value::Object(body)
    }
}

#[async_trait::async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn chat_step(&self, request: &ChatRequest) -> Result<ChatOutcome> {
        let prompt = self.formatter.make_query(request);
        let body = self.build_body(&prompt, request);
        debug!(
            model = %self.model,
            conversation = %request.conversation,
            tools = request.allowed_tools.len(),
            "Sending chat request"
        );

        let mut http_request = self
            .client
            .post(&self.api_base)
            .header("content-type", "application/json");
        http_request = match self.dialect {
            Dialect::Anthropic => http_request
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            Dialect::OpenAi => {
                http_request.header("Authorization", format!("Bearer {}", self.api_key))
            }
        };

        let response = http_request
            .json(&body)
            .send()
            .await
            .map_err(|e| DoppelError::Provider(format!("chat request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DoppelError::Provider(format!(
                "chat request returned HTTP {}: {}",
                status, body
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| DoppelError::ModelResponseParse(format!("invalid JSON body: {}", e)))?;

        let responses = match self.dialect {
            Dialect::Anthropic => parse_anthropic_payload(&payload)?,
            Dialect::OpenAi => parse_openai_payload(&payload)?,
        };
        debug!(
            conversation = %request.conversation,
            responses = responses.len(),
            "Chat request completed"
        );
        Ok(ChatOutcome { prompt, responses })
    }

    fn name(&self) -> &str {
        &self.model
    }
}

fn build_user_content(prompt: &str, image_urls: &[String], dialect: Dialect) -> Value {
    if image_urls.is_empty() {
        return json!(prompt);
    }
    let mut blocks: Vec<Value> = image_urls
        .iter()
        .map(|url| match dialect {
            Dialect::Anthropic => json!({
                "type": "image",
                "source": { "type": "url", "url": url },
            }),
            Dialect::OpenAi => json!({
                "type": "image_url",
                "image_url": { "url": url },
            }),
        })
        .collect();
    blocks.push(json!({ "type": "text", "text": prompt }));
    json!(blocks)
}

fn encode_tools(tools: &[ToolSpec], dialect: Dialect) -> Value {
    let encoded: Vec<Value> = tools
        .iter()
        .map(|tool| match dialect {
            Dialect::Anthropic => json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.parameters,
            }),
            Dialect::OpenAi => json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                },
            }),
        })
        .collect();
    json!(encoded)
}

fn parse_anthropic_payload(payload: &Value) -> Result<Vec<ModelResponse>> {
    let content = payload
        .get("content")
        .and_then(|v| v.as_array())
        .ok_or_else(|| DoppelError::ModelResponseParse("missing content array".to_string()))?;

    let mut responses = Vec::new();
    for block in content {
        match block.get("type").and_then(|v| v.as_str()) {
            Some("text") => {
                let text = block.get("text").and_then(|v| v.as_str()).ok_or_else(|| {
                    DoppelError::ModelResponseParse("text block without text".to_string())
                })?;
                responses.push(ModelResponse::Text(text.to_string()));
            }
            Some("tool_use") => {
                let name = block.get("name").and_then(|v| v.as_str()).ok_or_else(|| {
                    DoppelError::ModelResponseParse("tool_use block without name".to_string())
                })?;
                let id = block
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let arguments = block.get("input").cloned().unwrap_or(json!({}));
                responses.push(ModelResponse::ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments,
                });
            }
            other => {
                return Err(DoppelError::ModelResponseParse(format!(
                    "unexpected content block type: {:?}",
                    other
                )));
            }
        }
    }
    if responses.is_empty() {
        return Err(DoppelError::ModelResponseParse(
            "empty content array".to_string(),
        ));
    }
    Ok(responses)
}

fn parse_openai_payload(payload: &Value) -> Result<Vec<ModelResponse>> {
    let message = payload
        .get("choices")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("message"))
        .ok_or_else(|| DoppelError::ModelResponseParse("missing choices[0].message".to_string()))?;

    if let Some(calls) = message.get("tool_calls").and_then(|v| v.as_array()) {
        let mut responses = Vec::new();
        for call in calls {
            let function = call.get("function").ok_or_else(|| {
                DoppelError::ModelResponseParse("tool call without function".to_string())
            })?;
            let name = function
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    DoppelError::ModelResponseParse("tool call without name".to_string())
                })?;
            let raw_args = function
                .get("arguments")
                .and_then(|v| v.as_str())
                .unwrap_or("{}");
            let arguments: Value = serde_json::from_str(raw_args).map_err(|e| {
                DoppelError::ModelResponseParse(format!(
                    "tool call arguments are not valid JSON: {}",
                    e
                ))
            })?;
            let id = call.get("id").and_then(|v| v.as_str()).unwrap_or_default();
            responses.push(ModelResponse::ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            });
        }
        if !responses.is_empty() {
            return Ok(responses);
        }
    }

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            DoppelError::ModelResponseParse("message has neither tool calls nor content".to_string())
        })?;
    Ok(vec![ModelResponse::Text(content.to_string())])
}
