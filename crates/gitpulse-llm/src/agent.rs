//! Tool-augmented agent turn that emits stream frames.
//!
//! Each step is one model completion. A step emits a message boundary, the
//! step's text, one start/result pair per tool call and a step-finish
//! frame. The turn ends with exactly one `StreamEnd`, unless the receiver
//! went away first.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use gitpulse_core::{Frame, GenerateError, ToolInvoker};

use crate::chat::{ChatMessage, ChatModel};

/// Upper bound on model completions per turn.
pub const MAX_STEPS: usize = 10;

const INSTRUCTIONS: &str = "You are a helpful assistant that answers questions about a GitHub \
repository. Use the getRepositoryInfo tool to look up repository metadata, recent commits and \
contributors, and the recallMemory tool to read previously stored analyses. If a tool reports \
ok=false, explain the problem to the user instead of guessing.";

/// Input of one agent turn.
#[derive(Debug, Clone)]
pub struct AgentTurn {
    pub owner: String,
    pub repo: String,
    /// Prior conversation, oldest first, ending with the new user message.
    pub messages: Vec<ChatMessage>,
}

pub fn repository_context(owner: &str, repo: &str) -> String {
    format!("The repository owner is {owner} and the repository name is {repo}")
}

enum TurnError {
    Generate(GenerateError),
    Disconnected,
}

struct Emitter {
    tx: mpsc::Sender<Frame>,
    sent: usize,
}

impl Emitter {
    async fn send(&mut self, frame: Frame) -> Result<(), TurnError> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| TurnError::Disconnected)?;
        self.sent += 1;
        Ok(())
    }
}

pub struct RepoAgent {
    model: Arc<dyn ChatModel>,
    tools: Arc<dyn ToolInvoker>,
    max_steps: usize,
    tool_timeout: Duration,
}

impl RepoAgent {
    pub fn new(model: Arc<dyn ChatModel>, tools: Arc<dyn ToolInvoker>) -> Self {
        Self {
            model,
            tools,
            max_steps: MAX_STEPS,
            tool_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Run one turn, sending frames to `tx`.
    ///
    /// A generation failure is returned as `Err`. If frames were already
    /// sent, the stream is closed with `finish_reason = "error"` first, so
    /// `Err` with nothing sent means the turn never started. A dropped
    /// receiver ends the turn quietly.
    pub async fn run(&self, turn: AgentTurn, tx: mpsc::Sender<Frame>) -> Result<(), GenerateError> {
        let mut out = Emitter { tx, sent: 0 };
        match self.steps(turn, &mut out).await {
            Ok(()) => Ok(()),
            Err(TurnError::Disconnected) => {
                debug!("receiver dropped; agent turn abandoned");
                Ok(())
            }
            Err(TurnError::Generate(e)) => {
                if out.sent > 0 {
                    let _ = out
                        .send(Frame::StreamEnd {
                            finish_reason: Some("error".into()),
                        })
                        .await;
                }
                Err(e)
            }
        }
    }

    async fn steps(&self, turn: AgentTurn, out: &mut Emitter) -> Result<(), TurnError> {
        let specs = self.tools.tools();
        let mut conversation = vec![
            ChatMessage::System(INSTRUCTIONS.to_string()),
            ChatMessage::System(repository_context(&turn.owner, &turn.repo)),
        ];
        conversation.extend(turn.messages);

        for step in 1..=self.max_steps {
            let completion = self
                .model
                .complete(&conversation, &specs)
                .await
                .map_err(TurnError::Generate)?;

            let message_id = format!("msg_{}", ulid::Ulid::new().to_string().to_lowercase());
            out.send(Frame::MessageBoundary { message_id }).await?;
            if !completion.text().is_empty() {
                out.send(Frame::text(completion.text())).await?;
            }

            if completion.tool_calls.is_empty() {
                let reason = completion.finish_reason.unwrap_or_else(|| "stop".into());
                out.send(Frame::StepFinish {
                    finish_reason: Some(reason.clone()),
                })
                .await?;
                out.send(Frame::StreamEnd {
                    finish_reason: Some(reason),
                })
                .await?;
                info!(owner = %turn.owner, repo = %turn.repo, steps = step, "agent turn finished");
                return Ok(());
            }

            conversation.push(ChatMessage::Assistant {
                content: completion.content.clone(),
                tool_calls: completion.tool_calls.clone(),
            });
            for call in completion.tool_calls {
                out.send(Frame::ToolCallStart {
                    tool_name: call.name.clone(),
                    args: call.arguments.clone(),
                })
                .await?;
                let result = match tokio::time::timeout(
                    self.tool_timeout,
                    self.tools.call_tool(&call.name, call.arguments),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            tool = %call.name,
                            timeout = ?self.tool_timeout,
                            "tool call timed out"
                        );
                        json!({"ok": false, "message": format!("{} timed out", call.name)})
                    }
                };
                conversation.push(ChatMessage::ToolResult {
                    call_id: call.id,
                    content: result.to_string(),
                });
                out.send(Frame::ToolCallResult { result }).await?;
            }
            out.send(Frame::StepFinish {
                finish_reason: Some("tool-calls".into()),
            })
            .await?;
        }

        warn!(max_steps = self.max_steps, "agent turn hit the step limit");
        out.send(Frame::StreamEnd {
            finish_reason: Some("tool-calls".into()),
        })
        .await
    }
}
