use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use gitpulse_analysis::{AnalysisWorkflow, Report};
use gitpulse_core::config::Config;
use gitpulse_core::{Frame, MemoryStore, RepoSource};
use gitpulse_github::GitHubClient;
use gitpulse_llm::{AgentTurn, ChatMessage, OpenAiClient, RepoAgent, RepoTools};
use gitpulse_store::FileMemoryStore;
use gitpulse_stream::{encode, ChatRequest};

/// Marks the body as the line-framed chat stream.
pub const STREAM_HEADER: &str = "x-vercel-ai-data-stream";

// ── App State ──

#[derive(Clone)]
pub struct AppState {
    agent: Arc<RepoAgent>,
    workflow: Arc<AnalysisWorkflow>,
}

impl AppState {
    pub fn new(agent: Arc<RepoAgent>, workflow: Arc<AnalysisWorkflow>) -> Self {
        Self { agent, workflow }
    }

    /// Wire the GitHub source, the LLM client and the file store from config.
    pub fn from_config(config: &Config) -> Self {
        let caps = Capabilities::from_config(config);
        let tools = Arc::new(RepoTools::new(caps.source.clone(), caps.store.clone()));
        // getRepositoryInfo makes three sequential REST calls.
        let agent = RepoAgent::new(caps.llm.clone(), tools)
            .with_tool_timeout(config.github.timeout() * 3);
        Self::new(Arc::new(agent), Arc::new(caps.workflow(config)))
    }
}

struct Capabilities {
    source: Arc<dyn RepoSource>,
    store: Arc<dyn MemoryStore>,
    llm: Arc<OpenAiClient>,
}

impl Capabilities {
    fn from_config(config: &Config) -> Self {
        Self {
            source: Arc::new(GitHubClient::new(&config.github)),
            store: Arc::new(FileMemoryStore::new(&config.store_dir)),
            llm: Arc::new(OpenAiClient::new(&config.llm)),
        }
    }

    fn workflow(self, config: &Config) -> AnalysisWorkflow {
        AnalysisWorkflow::new(
            self.source,
            self.llm,
            self.store,
            &config.pipeline,
            &config.output_dir,
        )
    }
}

/// The analysis workflow backed by GitHub, the configured LLM and the file store.
pub fn analysis_workflow(config: &Config) -> AnalysisWorkflow {
    Capabilities::from_config(config).workflow(config)
}

// ── Error Handling ──

struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        warn!(error = %format!("{:#}", self.0), "request failed");
        let body = serde_json::json!({ "error": format!("{:#}", self.0) });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

// ── Entrypoint ──

pub async fn serve(state: AppState, bind: &str, port: u16) -> anyhow::Result<()> {
    let app = router(state);
    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "gitpulse HTTP server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the router (for testing without binding to a port).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/chat", post(post_chat))
        .route("/api/analyze", post(post_analyze))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

// ── POST /api/chat ──

async fn post_chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = body?;
    let messages: Vec<ChatMessage> = body
        .messages
        .iter()
        .filter_map(|m| ChatMessage::from_role(m.role, &m.content))
        .collect();
    if messages.is_empty() {
        return Err(anyhow::anyhow!("chat request has no messages").into());
    }
    info!(owner = %body.owner, repo = %body.repo, messages = messages.len(), "chat turn");

    let turn = AgentTurn {
        owner: body.owner,
        repo: body.repo,
        messages,
    };
    let (tx, mut rx) = mpsc::channel::<Frame>(64);
    let agent = state.agent.clone();
    let task = tokio::spawn(async move { agent.run(turn, tx).await });

    // Nothing sent yet means the turn never started: answer with a plain error.
    let Some(first) = rx.recv().await else {
        return match task.await? {
            Ok(()) => Err(anyhow::anyhow!("agent produced no output").into()),
            Err(e) => Err(anyhow::Error::new(e).context("agent turn failed").into()),
        };
    };
    tokio::spawn(async move {
        match task.await {
            Ok(Err(e)) => warn!(error = %e, "agent turn failed mid-stream"),
            Err(e) => warn!(error = %e, "agent task panicked"),
            Ok(Ok(())) => {}
        }
    });

    let frames = async_stream::stream! {
        yield Ok::<_, Infallible>(encode(&first));
        while let Some(frame) = rx.recv().await {
            yield Ok(encode(&frame));
        }
    };
    let resp = Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(STREAM_HEADER, "v1")
        .body(Body::from_stream(frames))?;
    Ok(resp)
}

// ── POST /api/analyze ──

#[derive(Deserialize)]
struct AnalyzeBody {
    owner: String,
    repo: String,
}

async fn post_analyze(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeBody>, JsonRejection>,
) -> Result<Json<Report>, AppError> {
    let Json(body) = body?;
    let report = state.workflow.run(&body.owner, &body.repo).await?;
    Ok(Json(report))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use gitpulse_core::config::PipelineConfig;
    use gitpulse_core::{
        GenerateError, License, RepoInfo, RepoInfoResult, Repository, TextGenerator, ToolInvoker,
        ToolSpec,
    };
    use gitpulse_llm::{ChatModel, Completion, ToolCall};
    use gitpulse_stream::FrameDecoder;

    struct Scripted(Mutex<VecDeque<Result<Completion, GenerateError>>>);

    #[async_trait::async_trait]
    impl ChatModel for Scripted {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolSpec],
        ) -> Result<Completion, GenerateError> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(GenerateError::Empty))
        }
    }

    struct Echo;

    #[async_trait::async_trait]
    impl ToolInvoker for Echo {
        fn tools(&self) -> Vec<ToolSpec> {
            Vec::new()
        }
        async fn call_tool(&self, name: &str, _args: Value) -> Value {
            json!({"ok": true, "tool": name})
        }
    }

    struct Source(RepoInfoResult);

    #[async_trait::async_trait]
    impl RepoSource for Source {
        async fn repository_info(&self, _owner: &str, _repo: &str) -> RepoInfoResult {
            self.0.clone()
        }
    }

    struct Writer;

    #[async_trait::async_trait]
    impl TextGenerator for Writer {
        async fn generate(&self, _i: &str, _prompt: &str) -> Result<String, GenerateError> {
            Ok("Hello from Mem0.ai".into())
        }
    }

    fn repository() -> Repository {
        Repository {
            name: "widget".into(),
            full_name: "acme/widget".into(),
            description: Some("Widgets".into()),
            url: "https://github.com/acme/widget".into(),
            stars: 4,
            forks: 1,
            watchers: 4,
            open_issues: 0,
            language: None,
            topics: vec![],
            created_at: String::new(),
            updated_at: String::new(),
            pushed_at: String::new(),
            size: 1,
            default_branch: "main".into(),
            license: Some(License {
                key: "mit".into(),
                name: "MIT License".into(),
                url: None,
            }),
            visibility: "public".into(),
            archived: false,
            disabled: false,
        }
    }

    fn app(
        replies: Vec<Result<Completion, GenerateError>>,
        source: RepoInfoResult,
        dir: &std::path::Path,
    ) -> Router {
        let agent = RepoAgent::new(Arc::new(Scripted(Mutex::new(replies.into()))), Arc::new(Echo));
        let workflow = AnalysisWorkflow::new(
            Arc::new(Source(source)),
            Arc::new(Writer),
            Arc::new(FileMemoryStore::new(dir.join("memory"))),
            &PipelineConfig::default(),
            dir.join("output"),
        );
        router(AppState::new(Arc::new(agent), Arc::new(workflow)))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn chat_body() -> Value {
        json!({
            "messages": [{"role": "user", "content": "How many stars?"}],
            "owner": "acme",
            "repo": "widget"
        })
    }

    fn found() -> RepoInfoResult {
        RepoInfoResult::Found(Box::new(RepoInfo {
            repository: repository(),
            commits: vec![],
            contributors: vec![],
        }))
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = app(vec![], found(), tmp.path())
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["ok"], true);
    }

    #[tokio::test]
    async fn chat_streams_encoded_frames() {
        let tmp = tempfile::tempdir().unwrap();
        let replies = vec![
            Ok(Completion {
                content: None,
                tool_calls: vec![ToolCall {
                    id: "c1".into(),
                    name: "getRepositoryInfo".into(),
                    arguments: json!({"owner": "acme", "repo": "widget"}),
                }],
                finish_reason: Some("tool_calls".into()),
            }),
            Ok(Completion {
                content: Some("It has 4 stars.".into()),
                tool_calls: vec![],
                finish_reason: Some("stop".into()),
            }),
        ];
        let resp = app(replies, found(), tmp.path())
            .oneshot(post_json("/api/chat", chat_body()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[STREAM_HEADER], "v1");

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let mut decoder = FrameDecoder::new();
        let mut frames = decoder.push(&bytes);
        frames.extend(decoder.finish());
        assert_eq!(decoder.skipped_lines(), 0);
        assert!(frames.contains(&Frame::text("It has 4 stars.")));
        assert_eq!(frames.iter().filter(|f| f.is_end()).count(), 1);
        assert!(frames.iter().any(|f| matches!(
            f,
            Frame::ToolCallStart { tool_name, .. } if tool_name == "getRepositoryInfo"
        )));
    }

    #[tokio::test]
    async fn chat_failure_before_streaming_is_500() {
        let tmp = tempfile::tempdir().unwrap();
        let replies = vec![Err(GenerateError::Provider("HTTP 401: bad key".into()))];
        let resp = app(replies, found(), tmp.path())
            .oneshot(post_json("/api/chat", chat_body()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("bad key"));
    }

    #[tokio::test]
    async fn chat_without_messages_is_500() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = app(vec![], found(), tmp.path())
            .oneshot(post_json(
                "/api/chat",
                json!({"messages": [], "owner": "acme", "repo": "widget"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn malformed_chat_body_is_500_json() {
        let tmp = tempfile::tempdir().unwrap();
        let req = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let resp = app(vec![], found(), tmp.path()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("JSON"));
    }

    #[tokio::test]
    async fn analyze_missing_fields_is_500_json() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = app(vec![], found(), tmp.path())
            .oneshot(post_json("/api/analyze", json!({"owner": "acme"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].is_string());
        assert!(!tmp.path().join("output").exists());
    }

    #[tokio::test]
    async fn analyze_returns_report() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = app(vec![], found(), tmp.path())
            .oneshot(post_json("/api/analyze", json!({"owner": "acme", "repo": "widget"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["summary"]["name"], "widget");
        assert_eq!(json["healthScore"]["maintenance"], 60);
        assert!(tmp.path().join("output").join("acme-widget-analysis.json").exists());
    }

    #[tokio::test]
    async fn analyze_source_failure_is_500() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = app(vec![], RepoInfoResult::failed("Not Found"), tmp.path())
            .oneshot(post_json("/api/analyze", json!({"owner": "acme", "repo": "nope"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "failed to get repository info: Not Found");
    }
}
