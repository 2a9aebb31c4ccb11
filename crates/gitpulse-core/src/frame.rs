use serde_json::Value;

/// One decoded unit of the chat stream.
///
/// Ordering is significant: frames are produced, transmitted and applied in
/// exactly the order the agent emitted them. The wire prefixes live in
/// `gitpulse-stream`; nothing else needs to know about them.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A fragment of assistant text.
    TextDelta(String),
    /// The agent started a tool invocation.
    ToolCallStart { tool_name: String, args: Value },
    /// The most recent tool invocation finished.
    ToolCallResult { result: Value },
    /// A new assistant message begins.
    MessageBoundary { message_id: String },
    /// One agent step finished (text and/or tool use). Informational.
    StepFinish { finish_reason: Option<String> },
    /// The turn is over; nothing follows.
    StreamEnd { finish_reason: Option<String> },
}

impl Frame {
    pub fn text(s: impl Into<String>) -> Self {
        Frame::TextDelta(s.into())
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::TextDelta(_) => "text_delta",
            Frame::ToolCallStart { .. } => "tool_call_start",
            Frame::ToolCallResult { .. } => "tool_call_result",
            Frame::MessageBoundary { .. } => "message_boundary",
            Frame::StepFinish { .. } => "step_finish",
            Frame::StreamEnd { .. } => "stream_end",
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Frame::StreamEnd { .. })
    }
}
