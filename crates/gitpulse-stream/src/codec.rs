//! Line-oriented wire format for chat turns.
//!
//! Every frame is one line, `{prefix}:{json}\n`:
//!
//! | prefix | frame            | payload                         |
//! |--------|------------------|---------------------------------|
//! | `0`    | text delta       | JSON string                     |
//! | `9`    | tool call start  | `{"toolName": .., "args": ..}`  |
//! | `a`    | tool call result | `{"result": ..}`                |
//! | `f`    | message boundary | `{"messageId": ..}` or a string |
//! | `e`    | step finish      | ignored (`finishReason` kept)   |
//! | `d`    | stream end       | ignored (`finishReason` kept)   |
//!
//! Unknown prefixes are skipped. A malformed line is logged and skipped; it
//! never aborts the rest of the stream.

use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use gitpulse_core::Frame;

pub const PREFIX_TEXT: &str = "0";
pub const PREFIX_TOOL_CALL: &str = "9";
pub const PREFIX_TOOL_RESULT: &str = "a";
pub const PREFIX_MESSAGE: &str = "f";
pub const PREFIX_STEP_FINISH: &str = "e";
pub const PREFIX_FINISH: &str = "d";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("line has no prefix separator")]
    MissingSeparator,
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
    #[error("invalid payload for prefix {prefix:?}: {source}")]
    Payload {
        prefix: String,
        #[source]
        source: serde_json::Error,
    },
}

// ── Encoding ──

/// Encode one frame as a complete wire line, trailing newline included.
pub fn encode(frame: &Frame) -> String {
    let (prefix, payload) = match frame {
        Frame::TextDelta(text) => (PREFIX_TEXT, Value::String(text.clone())),
        Frame::ToolCallStart { tool_name, args } => (
            PREFIX_TOOL_CALL,
            serde_json::json!({ "toolName": tool_name, "args": args }),
        ),
        Frame::ToolCallResult { result } => {
            (PREFIX_TOOL_RESULT, serde_json::json!({ "result": result }))
        }
        Frame::MessageBoundary { message_id } => {
            (PREFIX_MESSAGE, serde_json::json!({ "messageId": message_id }))
        }
        Frame::StepFinish { finish_reason } => (PREFIX_STEP_FINISH, finish_payload(finish_reason)),
        Frame::StreamEnd { finish_reason } => (PREFIX_FINISH, finish_payload(finish_reason)),
    };
    format!("{prefix}:{payload}\n")
}

/// Encode a sequence of frames into one buffer.
pub fn encode_all<'a>(frames: impl IntoIterator<Item = &'a Frame>) -> String {
    frames.into_iter().map(encode).collect()
}

fn finish_payload(reason: &Option<String>) -> Value {
    match reason {
        Some(r) => serde_json::json!({ "finishReason": r }),
        None => serde_json::json!({}),
    }
}

// ── Decoding ──

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallPayload {
    tool_name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Deserialize)]
struct ToolResultPayload {
    #[serde(default)]
    result: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MessageIdPayload {
    Object {
        #[serde(rename = "messageId")]
        message_id: String,
    },
    Bare(String),
}

fn payload<T: for<'de> Deserialize<'de>>(prefix: &str, json: &str) -> Result<T, DecodeError> {
    serde_json::from_str(json).map_err(|source| DecodeError::Payload {
        prefix: prefix.to_string(),
        source,
    })
}

/// `finishReason` if present; anything else about the payload is ignored.
fn finish_reason(json: &str) -> Option<String> {
    serde_json::from_str::<Value>(json)
        .ok()?
        .get("finishReason")?
        .as_str()
        .map(str::to_string)
}

/// Decode a single line (without its newline).
///
/// Returns `Ok(None)` for blank lines and unknown prefixes.
pub fn decode_line(line: &str) -> Result<Option<Frame>, DecodeError> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() {
        return Ok(None);
    }
    let (prefix, json) = line.split_once(':').ok_or(DecodeError::MissingSeparator)?;
    let frame = match prefix {
        PREFIX_TEXT => Frame::TextDelta(payload::<String>(prefix, json)?),
        PREFIX_TOOL_CALL => {
            let p: ToolCallPayload = payload(prefix, json)?;
            Frame::ToolCallStart {
                tool_name: p.tool_name,
                args: p.args,
            }
        }
        PREFIX_TOOL_RESULT => {
            let p: ToolResultPayload = payload(prefix, json)?;
            Frame::ToolCallResult { result: p.result }
        }
        PREFIX_MESSAGE => {
            let message_id = match payload::<MessageIdPayload>(prefix, json)? {
                MessageIdPayload::Object { message_id } | MessageIdPayload::Bare(message_id) => {
                    message_id
                }
            };
            Frame::MessageBoundary { message_id }
        }
        PREFIX_STEP_FINISH => Frame::StepFinish {
            finish_reason: finish_reason(json),
        },
        PREFIX_FINISH => Frame::StreamEnd {
            finish_reason: finish_reason(json),
        },
        other => {
            debug!(prefix = other, "skipping frame with unknown prefix");
            return Ok(None);
        }
    };
    Ok(Some(frame))
}

/// Incremental decoder over arbitrarily split byte chunks.
///
/// Incomplete trailing lines are buffered until the next chunk (or
/// [`FrameDecoder::finish`]) completes them. Exactly one `StreamEnd` is ever
/// produced; anything after it is dropped.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    ended: bool,
    skipped: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the frames completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            self.accept(&line[..line.len() - 1], &mut frames);
        }
        frames
    }

    /// Transport closed: decode any unterminated last line, then end the stream.
    pub fn finish(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        if !self.buf.is_empty() {
            let line = std::mem::take(&mut self.buf);
            self.accept(&line, &mut frames);
        }
        if !self.ended {
            self.ended = true;
            frames.push(Frame::StreamEnd {
                finish_reason: None,
            });
        }
        frames
    }

    /// Lines dropped because they could not be decoded.
    pub fn skipped_lines(&self) -> usize {
        self.skipped
    }

    fn accept(&mut self, raw: &[u8], out: &mut Vec<Frame>) {
        if self.ended {
            if !raw.iter().all(u8::is_ascii_whitespace) {
                debug!("dropping line received after stream end");
            }
            return;
        }
        let decoded = std::str::from_utf8(raw)
            .map_err(|_| DecodeError::InvalidUtf8)
            .and_then(decode_line);
        match decoded {
            Ok(Some(frame)) => {
                if frame.is_end() {
                    self.ended = true;
                }
                out.push(frame);
            }
            Ok(None) => {}
            Err(e) => {
                self.skipped += 1;
                warn!(error = %e, "skipping malformed stream line");
            }
        }
    }
}

/// Lazily decode a stream of byte chunks into frames.
///
/// A transport error is passed through and terminates the stream; a clean
/// end of transport flushes the decoder and yields the final `StreamEnd`.
pub fn decode_stream<S, B, E>(chunks: S) -> impl Stream<Item = Result<Frame, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    async_stream::stream! {
        let mut decoder = FrameDecoder::new();
        futures_util::pin_mut!(chunks);
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => {
                    for frame in decoder.push(bytes.as_ref()) {
                        yield Ok(frame);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        for frame in decoder.finish() {
            yield Ok(frame);
        }
    }
}
