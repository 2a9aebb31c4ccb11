//! OpenAI-compatible `/chat/completions` client.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use gitpulse_core::config::LlmConfig;
use gitpulse_core::{GenerateError, TextGenerator, ToolSpec};

use crate::chat::{ChatMessage, ChatModel, Completion, ToolCall};

pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            timeout: config.timeout(),
        }
    }

    async fn send(&self, body: &Value) -> Result<Completion, GenerateError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GenerateError::Provider("no LLM API key configured".into()))?;

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(network_error)?;

        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(network_error)?;
        if !(200..300).contains(&status) {
            return Err(classify_status(status, &text));
        }
        let parsed: CompletionResponse = serde_json::from_str(&text)
            .map_err(|e| GenerateError::Provider(format!("failed to parse response: {e}")))?;
        Ok(parse_completion(parsed))
    }
}

#[async_trait::async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<Completion, GenerateError> {
        let body = request_body(&self.model, messages, tools);
        debug!(
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "chat completion"
        );
        match tokio::time::timeout(self.timeout, self.send(&body)).await {
            Ok(result) => result,
            Err(_) => Err(GenerateError::Timeout(self.timeout)),
        }
    }
}

#[async_trait::async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(&self, instructions: &str, prompt: &str) -> Result<String, GenerateError> {
        let messages = [
            ChatMessage::System(instructions.to_string()),
            ChatMessage::User(prompt.to_string()),
        ];
        let completion = self.complete(&messages, &[]).await?;
        match completion.content {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(GenerateError::Empty),
        }
    }
}

fn network_error(e: reqwest::Error) -> GenerateError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        GenerateError::Transient(e.to_string())
    } else {
        GenerateError::Provider(e.to_string())
    }
}

/// Rate limits and server-side failures may succeed on retry; anything
/// else is the caller's problem.
pub(crate) fn classify_status(status: u16, body: &str) -> GenerateError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string());
    match status {
        408 | 429 | 500..=599 => GenerateError::Transient(format!("HTTP {status}: {message}")),
        _ => GenerateError::Provider(format!("HTTP {status}: {message}")),
    }
}

pub(crate) fn request_body(model: &str, messages: &[ChatMessage], tools: &[ToolSpec]) -> Value {
    let mut body = json!({
        "model": model,
        "messages": messages.iter().map(message_json).collect::<Vec<_>>(),
    });
    if !tools.is_empty() {
        body["tools"] = tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        body["tool_choice"] = json!("auto");
    }
    body
}

fn message_json(message: &ChatMessage) -> Value {
    match message {
        ChatMessage::System(text) => json!({"role": "system", "content": text}),
        ChatMessage::User(text) => json!({"role": "user", "content": text}),
        ChatMessage::Assistant {
            content,
            tool_calls,
        } => {
            let mut msg = json!({"role": "assistant", "content": content});
            if !tool_calls.is_empty() {
                msg["tool_calls"] = tool_calls
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": {"name": c.name, "arguments": c.arguments.to_string()},
                        })
                    })
                    .collect();
            }
            msg
        }
        ChatMessage::ToolResult { call_id, content } => {
            json!({"role": "tool", "tool_call_id": call_id, "content": content})
        }
    }
}

// ── Response payload ──

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

pub(crate) fn parse_completion(resp: CompletionResponse) -> Completion {
    let Some(choice) = resp.choices.into_iter().next() else {
        return Completion::default();
    };
    let tool_calls = choice
        .message
        .tool_calls
        .into_iter()
        .map(|c| ToolCall {
            id: c.id,
            name: c.function.name,
            // Models occasionally send empty or broken argument strings.
            arguments: serde_json::from_str(&c.function.arguments).unwrap_or_else(|_| json!({})),
        })
        .collect();
    Completion {
        content: choice.message.content,
        tool_calls,
        finish_reason: choice.finish_reason,
    }
}
