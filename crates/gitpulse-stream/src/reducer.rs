//! Fold decoded frames into renderable conversation messages.

use serde_json::Value;
use tracing::warn;

use gitpulse_core::{Frame, Message, Role};

/// What a single `apply` did to the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Text appended to the open assistant message.
    Appended,
    /// A new assistant message was started.
    Started,
    /// The open assistant message (if any) was closed.
    Closed,
    /// A tool call is now pending.
    Pending,
    /// A tool message was emitted.
    ToolCompleted,
    /// A tool result arrived with no pending call and was dropped.
    Discarded,
    /// The stream ended.
    Finished,
    /// A frame arrived after the stream ended.
    Rejected,
}

#[derive(Debug, Clone, PartialEq)]
struct PendingCall {
    tool_name: String,
    args: Value,
}

/// Per-request conversation reducer.
///
/// Holds the only mutable state of a chat turn besides the transcript
/// itself: the open assistant message and the single pending tool call.
/// Construct one per request; sessions never share a reducer.
#[derive(Debug, Default)]
pub struct ConversationReducer {
    pending: Option<PendingCall>,
    /// Index of the assistant message still accepting text.
    open: Option<usize>,
    finished: bool,
    desyncs: usize,
}

impl ConversationReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one frame to `messages`.
    pub fn apply(&mut self, messages: &mut Vec<Message>, frame: Frame) -> Applied {
        if self.finished {
            warn!(frame = frame.kind(), "frame after stream end rejected");
            return Applied::Rejected;
        }
        match frame {
            Frame::TextDelta(text) => {
                if let Some(msg) = self.open_message(messages) {
                    msg.content.push_str(&text);
                    return Applied::Appended;
                }
                messages.push(Message::assistant(text));
                self.open = Some(messages.len() - 1);
                Applied::Started
            }
            Frame::MessageBoundary { .. } | Frame::StepFinish { .. } => {
                self.open = None;
                Applied::Closed
            }
            Frame::ToolCallStart { tool_name, args } => {
                self.open = None;
                if let Some(prev) = &self.pending {
                    warn!(
                        replaced = %prev.tool_name,
                        tool = %tool_name,
                        "tool call started before previous result; replacing pending call"
                    );
                }
                self.pending = Some(PendingCall { tool_name, args });
                Applied::Pending
            }
            Frame::ToolCallResult { result } => {
                self.open = None;
                match self.pending.take() {
                    Some(call) => {
                        messages.push(Message::tool(call.tool_name, call.args, result));
                        Applied::ToolCompleted
                    }
                    None => {
                        self.desyncs += 1;
                        warn!(
                            desyncs = self.desyncs,
                            "tool result with no pending call discarded (protocol desync)"
                        );
                        Applied::Discarded
                    }
                }
            }
            Frame::StreamEnd { .. } => {
                self.open = None;
                self.finished = true;
                if let Some(call) = self.pending.take() {
                    warn!(tool = %call.tool_name, "stream ended with an unresolved tool call");
                }
                Applied::Finished
            }
        }
    }

    /// Reduce a whole frame sequence onto an existing transcript.
    pub fn reduce(
        mut messages: Vec<Message>,
        frames: impl IntoIterator<Item = Frame>,
    ) -> (Vec<Message>, Self) {
        let mut reducer = Self::new();
        for frame in frames {
            reducer.apply(&mut messages, frame);
        }
        (messages, reducer)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Tool results dropped because no call was pending.
    pub fn desync_count(&self) -> usize {
        self.desyncs
    }

    /// Name of the tool call awaiting its result, if any.
    pub fn pending_tool(&self) -> Option<&str> {
        self.pending.as_ref().map(|c| c.tool_name.as_str())
    }

    fn open_message<'a>(&self, messages: &'a mut [Message]) -> Option<&'a mut Message> {
        let idx = self.open?;
        if idx + 1 != messages.len() {
            return None;
        }
        messages
            .get_mut(idx)
            .filter(|m| m.role == Role::Assistant && !m.error)
    }
}
