use serde_json::Value;

use gitpulse_core::{GenerateError, Role, ToolSpec};

/// One entry of a chat-completions conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    System(String),
    User(String),
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    ToolResult {
        call_id: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn assistant(text: impl Into<String>) -> Self {
        ChatMessage::Assistant {
            content: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Map a `{role, content}` pair from a chat request. Tool transcript
    /// entries are display-only and yield `None`.
    pub fn from_role(role: Role, content: &str) -> Option<Self> {
        match role {
            Role::User => Some(ChatMessage::User(content.to_string())),
            Role::Assistant => Some(ChatMessage::assistant(content)),
            Role::Tool => None,
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One model response: text, tool calls, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
}

impl Completion {
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// A model that can run one tool-aware chat completion.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<Completion, GenerateError>;
}
