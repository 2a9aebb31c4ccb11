use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// A renderable conversation entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_output: Option<Value>,
    /// Set on assistant messages that report a failed request.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content.into())
    }

    /// A completed tool invocation: the call and its result together.
    pub fn tool(tool_name: impl Into<String>, input: Value, output: Value) -> Self {
        let tool_name = tool_name.into();
        Self {
            role: Role::Tool,
            content: format!("Using tool: {tool_name}"),
            tool_name: Some(tool_name),
            tool_input: Some(input),
            tool_output: Some(output),
            error: false,
        }
    }

    pub fn failure(reason: &str) -> Self {
        Self {
            error: true,
            ..Self::plain(Role::Assistant, format!("Error: {reason}"))
        }
    }

    fn plain(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            tool_name: None,
            tool_input: None,
            tool_output: None,
            error: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_message_content_names_tool() {
        let m = Message::tool("getRepositoryInfo", serde_json::json!({"owner": "a"}), Value::Null);
        assert_eq!(m.role, Role::Tool);
        assert_eq!(m.content, "Using tool: getRepositoryInfo");
        assert_eq!(m.tool_name.as_deref(), Some("getRepositoryInfo"));
    }

    #[test]
    fn error_flag_omitted_when_false() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert!(json.get("error").is_none());
        let json = serde_json::to_value(Message::failure("boom")).unwrap();
        assert_eq!(json["error"], true);
        assert_eq!(json["content"], "Error: boom");
    }
}
