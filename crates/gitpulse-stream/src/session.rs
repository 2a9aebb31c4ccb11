//! Client side of a chat: send a question, decode the streamed turn and
//! fold it into the session transcript.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use gitpulse_core::{Message, Role};

use crate::codec::decode_stream;
use crate::reducer::ConversationReducer;

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<WireMessage>,
    pub owner: String,
    pub repo: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("HTTP error! status: {0}")]
    Status(u16),
    #[error("{0}")]
    Network(String),
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Opens the byte stream for one chat request.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError>;
}

/// `POST {endpoint}` over HTTP.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait::async_trait]
impl ChatTransport for HttpTransport {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Network(e.to_string())));
        Ok(Box::pin(body))
    }
}

/// How one `send` ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed { frames: usize, desyncs: usize },
    /// Transport failure; an error message was appended to the transcript.
    Failed(String),
    /// Superseded by a newer message. Not an error; nothing is appended.
    Cancelled,
    /// Blank input; nothing was sent.
    Ignored,
}

/// A chat session bound to one repository.
///
/// At most one request is in flight: sending a new message aborts the
/// previous one before the new user message is recorded.
pub struct ChatSession<T> {
    transport: Arc<T>,
    owner: String,
    repo: String,
    transcript: Mutex<Vec<Message>>,
    inflight: Mutex<Option<(u64, CancellationToken)>>,
    next_id: AtomicU64,
}

impl<T: ChatTransport> ChatSession<T> {
    pub fn new(transport: Arc<T>, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            transport,
            owner: owner.into(),
            repo: repo.into(),
            transcript: Mutex::new(Vec::new()),
            inflight: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Snapshot of the transcript.
    pub fn messages(&self) -> Vec<Message> {
        self.transcript().clone()
    }

    pub fn clear(&self) {
        self.transcript().clear();
    }

    /// Send one user message and stream the reply into the transcript.
    pub async fn send(&self, content: &str) -> TurnOutcome {
        if content.trim().is_empty() {
            return TurnOutcome::Ignored;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        {
            let mut slot = lock(&self.inflight);
            if let Some((prev_id, prev)) = slot.replace((id, token.clone())) {
                debug!(request = prev_id, "aborting in-flight chat request");
                prev.cancel();
            }
        }
        let history = {
            let mut transcript = self.transcript();
            transcript.push(Message::user(content));
            wire_history(&transcript)
        };

        let request = ChatRequest {
            messages: history,
            owner: self.owner.clone(),
            repo: self.repo.clone(),
        };

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => TurnOutcome::Cancelled,
            outcome = self.stream_turn(&request, &token) => outcome,
        };

        let mut slot = lock(&self.inflight);
        if slot.as_ref().map(|(current, _)| *current) == Some(id) {
            *slot = None;
        }
        outcome
    }

    async fn stream_turn(&self, request: &ChatRequest, token: &CancellationToken) -> TurnOutcome {
        let body = match self.transport.open(request).await {
            Ok(body) => body,
            Err(e) => return self.fail(e, token),
        };
        let mut reducer = ConversationReducer::new();
        let mut frames = 0;
        let decoded = decode_stream(body);
        futures_util::pin_mut!(decoded);
        while let Some(item) = decoded.next().await {
            let frame = match item {
                Ok(frame) => frame,
                Err(e) => return self.fail(e, token),
            };
            let mut transcript = self.transcript();
            // Checked under the transcript lock: a newer request cancels
            // before it records its user message.
            if token.is_cancelled() {
                return TurnOutcome::Cancelled;
            }
            reducer.apply(&mut transcript, frame);
            frames += 1;
        }
        TurnOutcome::Completed {
            frames,
            desyncs: reducer.desync_count(),
        }
    }

    fn fail(&self, error: TransportError, token: &CancellationToken) -> TurnOutcome {
        let mut transcript = self.transcript();
        if token.is_cancelled() {
            return TurnOutcome::Cancelled;
        }
        warn!(owner = %self.owner, repo = %self.repo, error = %error, "chat request failed");
        let reason = error.to_string();
        transcript.push(Message::failure(&reason));
        TurnOutcome::Failed(reason)
    }

    fn transcript(&self) -> MutexGuard<'_, Vec<Message>> {
        lock(&self.transcript)
    }
}

/// User and assistant text sent upstream. Tool entries and failure notices
/// stay local.
fn wire_history(transcript: &[Message]) -> Vec<WireMessage> {
    transcript
        .iter()
        .filter(|m| !m.error && m.role != Role::Tool && !m.content.is_empty())
        .map(|m| WireMessage {
            role: m.role,
            content: m.content.clone(),
        })
        .collect()
}

fn lock<V>(m: &Mutex<V>) -> MutexGuard<'_, V> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
