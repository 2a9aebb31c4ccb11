use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use gitpulse_core::config::Config;
use gitpulse_core::{Message, Role};
use gitpulse_stream::{ChatSession, HttpTransport, TurnOutcome};

/// REPL command that empties the local transcript.
const CLEAR: &str = "/clear";

pub fn execute(
    config: &Config,
    owner: &str,
    repo: &str,
    url: Option<String>,
) -> anyhow::Result<()> {
    let url = url
        .unwrap_or_else(|| format!("http://{}:{}/api/chat", config.serve.bind, config.serve.port));
    let session = ChatSession::new(Arc::new(HttpTransport::new(url)), owner, repo);
    tokio::runtime::Runtime::new()?.block_on(repl(&session, owner, repo))
}

async fn repl(
    session: &ChatSession<HttpTransport>,
    owner: &str,
    repo: &str,
) -> anyhow::Result<()> {
    eprintln!("Chatting about {owner}/{repo}. One question per line, {CLEAR} to start over.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim() == CLEAR {
            session.clear();
            eprintln!("(conversation cleared)");
            continue;
        }
        let before = session.messages().len();
        match session.send(&line).await {
            TurnOutcome::Ignored | TurnOutcome::Cancelled => continue,
            TurnOutcome::Completed { desyncs, .. } if desyncs > 0 => {
                tracing::warn!(desyncs, "stream carried tool results without a matching call");
            }
            _ => {}
        }
        // Skip the user's own line.
        for message in session.messages().iter().skip(before + 1) {
            println!("{}", render(message));
        }
    }
    Ok(())
}

fn render(message: &Message) -> String {
    match message.role {
        Role::Tool => format!(
            "[{}] {}",
            message.tool_name.as_deref().unwrap_or("tool"),
            message
                .tool_output
                .as_ref()
                .map(|v| summarize(&v.to_string()))
                .unwrap_or_default()
        ),
        Role::Assistant if message.error => format!("! {}", message.content),
        _ => message.content.clone(),
    }
}

fn summarize(s: &str) -> String {
    const MAX: usize = 120;
    if s.chars().count() <= MAX {
        return s.to_string();
    }
    let cut: String = s.chars().take(MAX).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_each_role() {
        assert_eq!(render(&Message::assistant("Hi")), "Hi");
        assert_eq!(
            render(&Message::failure("HTTP error! status: 500")),
            "! Error: HTTP error! status: 500"
        );
        let tool = Message::tool("getRepositoryInfo", json!({}), json!({"ok": false}));
        assert_eq!(render(&tool), "[getRepositoryInfo] {\"ok\":false}");
    }

    #[test]
    fn long_tool_output_is_truncated() {
        let long = "x".repeat(500);
        assert!(summarize(&long).ends_with("..."));
        assert_eq!(summarize(&long).chars().count(), 123);
    }
}
