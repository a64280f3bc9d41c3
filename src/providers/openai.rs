// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! OpenAI-compatible provider implementation.
//!
//! This module provides a [`Provider`] implementation for any backend that
//! speaks the Chat Completions API with function calling.
//!
//! # Supported Endpoints
//!
//! - **OpenAI** - `https://api.openai.com/v1`
//! - **Gemini** - `https://generativelanguage.googleapis.com/v1beta/openai`
//! - **Ollama** - `http://localhost:11434/v1` (no API key needed)
//! - **Any OpenAI-compatible** - Just set base_url
//!
//! Transient failures (rate limits, network errors, timeouts) are retried a
//! few times with exponential backoff before the error is returned.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[cfg(feature = "telemetry")]
use tracing::debug;
use tracing::warn;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use crate::error::ProviderError;
use crate::types::{
    ContentBlockType, Message, MessageContent, Provider, ProviderConfig, ProviderResponse, Role,
    StopReason, TokenUsage, ToolCall, ToolDefinition,
};

/// Default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Gemini's OpenAI-compatible endpoint.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Default Ollama base URL.
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

const DEFAULT_MAX_TOKENS: u32 = 8192;
const DEFAULT_TIMEOUT_SECS: u64 = 300;
const MAX_RETRIES: u32 = 2;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// OpenAI-compatible chat completions provider.
pub struct OpenAIProvider {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: Option<f32>,
    provider_name: String,
}

impl OpenAIProvider {
    /// Create a new provider.
    pub fn new(
        api_key: Option<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        config: ProviderConfig,
    ) -> Result<Self, ProviderError> {
        let timeout = config
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to build HTTP client: {e}")))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        let provider_name = Self::detect_provider_name(&base_url);

        Ok(Self {
            client,
            api_key,
            model: model.into(),
            base_url,
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: config.temperature,
            provider_name,
        })
    }

    fn detect_provider_name(base_url: &str) -> String {
        if base_url.contains("openai.com") {
            "OpenAI".to_string()
        } else if base_url.contains("generativelanguage.googleapis.com") {
            "Gemini".to_string()
        } else if base_url.contains("localhost:11434") || base_url.contains("ollama") {
            "Ollama".to_string()
        } else {
            "OpenAI-Compatible".to_string()
        }
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        system_prompt: Option<&str>,
    ) -> ChatRequest {
        let mut api_messages: Vec<ChatMessage> = Vec::new();

        if let Some(system) = system_prompt {
            api_messages.push(ChatMessage::text("system", system));
        }

        for msg in messages {
            api_messages.extend(chat_messages_from(msg));
        }

        let tools_json: Option<Vec<ChatTool>> = tools
            .filter(|t| !t.is_empty())
            .map(|t| t.iter().map(ChatTool::from).collect());

        ChatRequest {
            model: self.model.clone(),
            messages: api_messages,
            tools: tools_json,
            max_tokens: Some(self.max_tokens),
            temperature: self.temperature,
        }
    }

    async fn send_once(&self, request: &ChatRequest) -> Result<ProviderResponse, ProviderError> {
        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("content-type", "application/json");

        if let Some(ref api_key) = self.api_key {
            req = req.header("authorization", format!("Bearer {}", api_key));
        }

        let response = req.json(request).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(DEFAULT_TIMEOUT_SECS * 1000)
            } else {
                ProviderError::NetworkError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(handle_error_response(status.as_u16(), &error_text));
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        Ok(api_response.into())
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        system_prompt: Option<&str>,
    ) -> Result<ProviderResponse, ProviderError> {
        let request = self.build_request(messages, tools, system_prompt);
        let start = Instant::now();
        let operation_name = format!("{}.chat", self.provider_name.to_lowercase());

        #[cfg(feature = "telemetry")]
        debug!(model = %self.model, messages = messages.len(), "Sending chat request");

        let mut attempt = 0;
        let result = loop {
            match self.send_once(&request).await {
                Err(err) if err.is_retryable() && attempt < MAX_RETRIES => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt);
                    warn!(model = %self.model, error = %err, ?delay, "Retrying chat request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => break other,
            }
        };

        #[cfg(feature = "telemetry")]
        {
            GLOBAL_METRICS.record_operation(&operation_name, start.elapsed());
            if let Ok(ProviderResponse { usage: Some(ref usage), .. }) = result {
                debug!(
                    model = %self.model,
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "Chat response received"
                );
            }
        }
        #[cfg(not(feature = "telemetry"))]
        let _ = (start, operation_name);

        result
    }

    fn name(&self) -> &str {
        &self.provider_name
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn handle_error_response(status_code: u16, body: &str) -> ProviderError {
    // Some backends (Gemini) wrap the error object in a one-element array.
    let parsed = serde_json::from_str::<ApiError>(body).ok().or_else(|| {
        serde_json::from_str::<Vec<ApiError>>(body)
            .ok()
            .and_then(|v| v.into_iter().next())
    });

    match parsed {
        Some(error) => {
            let message = error.error.message;
            match error.error.error_type.as_deref() {
                Some("authentication_error") | Some("invalid_api_key") => {
                    ProviderError::AuthError(message)
                }
                Some("rate_limit_error") | Some("rate_limit_exceeded") => {
                    ProviderError::RateLimited(message)
                }
                Some("model_not_found") => ProviderError::ModelNotFound(message),
                _ => match status_code {
                    401 | 403 => ProviderError::AuthError(message),
                    429 => ProviderError::RateLimited(message),
                    404 => ProviderError::ModelNotFound(message),
                    _ => ProviderError::api(message, status_code),
                },
            }
        }
        None => match status_code {
            429 => ProviderError::RateLimited(body.to_string()),
            _ => ProviderError::api(body.to_string(), status_code),
        },
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    call_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function: Option<ChatFunction>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatFunction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arguments: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: ChatToolFunction,
}

#[derive(Debug, Serialize)]
struct ChatToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
}

// ============================================================================
// Type Conversions
// ============================================================================

/// Convert one conversation message into API messages.
///
/// A block message carrying several tool results becomes one `tool` message
/// per result.
fn chat_messages_from(msg: &Message) -> Vec<ChatMessage> {
    let role = match msg.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    };

    let blocks = match &msg.content {
        MessageContent::Text(s) => return vec![ChatMessage::text(role, s.clone())],
        MessageContent::Blocks(blocks) => blocks,
    };

    let mut text = Vec::new();
    let mut tool_calls = Vec::new();
    let mut tool_results = Vec::new();

    for block in blocks {
        match block.block_type {
            ContentBlockType::Text => {
                if let Some(ref t) = block.text {
                    text.push(t.clone());
                }
            }
            ContentBlockType::ToolUse => tool_calls.push(ChatToolCall {
                id: block.id.clone(),
                call_type: Some("function".to_string()),
                function: Some(ChatFunction {
                    name: block.name.clone(),
                    arguments: block.input.as_ref().map(|v| v.to_string()),
                }),
            }),
            ContentBlockType::ToolResult => tool_results.push(ChatMessage {
                role: "tool".to_string(),
                content: Some(block.content.clone().unwrap_or_default()),
                tool_calls: None,
                tool_call_id: block.tool_use_id.clone(),
            }),
        }
    }

    if !tool_results.is_empty() {
        return tool_results;
    }

    vec![ChatMessage {
        role: role.to_string(),
        content: if text.is_empty() { None } else { Some(text.join("\n")) },
        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
        tool_call_id: None,
    }]
}

impl From<&ToolDefinition> for ChatTool {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: ChatToolFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: serde_json::to_value(&tool.input_schema).unwrap_or_default(),
            },
        }
    }
}

impl From<ChatResponse> for ProviderResponse {
    fn from(response: ChatResponse) -> Self {
        let choice = response.choices.into_iter().next();

        let (content, tool_calls, stop_reason) = if let Some(choice) = choice {
            let content = choice.message.content.unwrap_or_default();

            let tool_calls = choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .enumerate()
                .filter_map(|(index, tc)| {
                    let func = tc.function?;
                    let name = func.name?;
                    let id = tc.id.unwrap_or_else(|| format!("call_{index}"));
                    let empty = || serde_json::Value::Object(Default::default());
                    let (input, malformed) = match func.arguments.as_deref().map(str::trim) {
                        None | Some("") => (empty(), None),
                        Some(raw) => match serde_json::from_str(raw) {
                            Ok(input) => (input, None),
                            Err(e) => (empty(), Some(e.to_string())),
                        },
                    };
                    Some(ToolCall { id, name, input, malformed })
                })
                .collect::<Vec<_>>();

            let stop_reason = match choice.finish_reason.as_deref() {
                Some("tool_calls") => StopReason::ToolUse,
                Some("length") => StopReason::MaxTokens,
                _ if !tool_calls.is_empty() => StopReason::ToolUse,
                _ => StopReason::EndTurn,
            };

            (content, tool_calls, stop_reason)
        } else {
            (String::new(), Vec::new(), StopReason::EndTurn)
        };

        Self {
            content,
            tool_calls,
            stop_reason,
            usage: response.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
            model: response.model.filter(|m| !m.trim().is_empty()),
        }
    }
}
