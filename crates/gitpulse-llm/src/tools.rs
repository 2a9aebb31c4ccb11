use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use gitpulse_core::{MemoryStore, RepoSource, ToolInvoker, ToolSpec};

pub const GET_REPOSITORY_INFO: &str = "getRepositoryInfo";
pub const RECALL_MEMORY: &str = "recallMemory";

/// The agent's tool belt: repository lookup and memory recall.
pub struct RepoTools {
    source: Arc<dyn RepoSource>,
    memory: Arc<dyn MemoryStore>,
}

impl RepoTools {
    pub fn new(source: Arc<dyn RepoSource>, memory: Arc<dyn MemoryStore>) -> Self {
        Self { source, memory }
    }

    async fn repository_info(&self, args: &Value) -> Value {
        let (Some(owner), Some(repo)) = (str_arg(args, "owner"), str_arg(args, "repo")) else {
            return failure("getRepositoryInfo requires string arguments `owner` and `repo`");
        };
        let result = self.source.repository_info(owner, repo).await;
        serde_json::to_value(&result).unwrap_or_else(|e| failure(&e.to_string()))
    }

    async fn recall(&self, args: &Value) -> Value {
        let Some(key) = str_arg(args, "key") else {
            return failure("recallMemory requires a string argument `key`");
        };
        match self.memory.recall(key).await {
            Ok(Some(data)) => json!({"ok": true, "key": key, "data": data}),
            Ok(None) => failure(&format!("nothing stored under {key}")),
            Err(e) => {
                warn!(key, error = %e, "memory recall failed");
                failure(&e.to_string())
            }
        }
    }
}

fn str_arg<'a>(args: &'a Value, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn failure(message: &str) -> Value {
    json!({"ok": false, "message": message})
}

#[async_trait::async_trait]
impl ToolInvoker for RepoTools {
    fn tools(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec {
                name: GET_REPOSITORY_INFO.into(),
                description: "Get repository metadata, the most recent commits and the top \
                              contributors of a GitHub repository"
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "owner": {"type": "string", "description": "The owner of the repository"},
                        "repo": {"type": "string", "description": "The name of the repository"}
                    },
                    "required": ["owner", "repo"]
                }),
            },
            ToolSpec {
                name: RECALL_MEMORY.into(),
                description: "Recall a previously stored analysis or campaign record by its key"
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "key": {"type": "string", "description": "Key such as owner-repo-timestamp"}
                    },
                    "required": ["key"]
                }),
            },
        ]
    }

    async fn call_tool(&self, name: &str, args: Value) -> Value {
        debug!(tool = name, %args, "tool call");
        match name {
            GET_REPOSITORY_INFO => self.repository_info(&args).await,
            RECALL_MEMORY => self.recall(&args).await,
            other => failure(&format!("unknown tool {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitpulse_core::RepoInfoResult;

    struct MissingRepo;

    #[async_trait::async_trait]
    impl RepoSource for MissingRepo {
        async fn repository_info(&self, _owner: &str, _repo: &str) -> RepoInfoResult {
            RepoInfoResult::failed("Not Found")
        }
    }

    struct OneKey;

    #[async_trait::async_trait]
    impl MemoryStore for OneKey {
        async fn memorize(&self, key: &str, _data: &Value) -> anyhow::Result<Value> {
            Ok(json!({"success": true, "campaignId": key}))
        }
        async fn recall(&self, key: &str) -> anyhow::Result<Option<Value>> {
            Ok((key == "acme-widget-1").then(|| json!({"campaign": {"totalEmails": 2}})))
        }
    }

    fn tools() -> RepoTools {
        RepoTools::new(Arc::new(MissingRepo), Arc::new(OneKey))
    }

    #[tokio::test]
    async fn source_failure_is_ok_false() {
        let out = tools()
            .call_tool(GET_REPOSITORY_INFO, json!({"owner": "acme", "repo": "nope"}))
            .await;
        assert_eq!(out, json!({"ok": false, "message": "Not Found"}));
    }

    #[tokio::test]
    async fn bad_arguments_are_ok_false() {
        let out = tools().call_tool(GET_REPOSITORY_INFO, json!({"owner": 3})).await;
        assert_eq!(out["ok"], false);
        let out = tools().call_tool("deleteEverything", json!({})).await;
        assert_eq!(out["ok"], false);
    }

    #[tokio::test]
    async fn recall_hit_and_miss() {
        let hit = tools().call_tool(RECALL_MEMORY, json!({"key": "acme-widget-1"})).await;
        assert_eq!(hit["ok"], true);
        assert_eq!(hit["data"]["campaign"]["totalEmails"], 2);
        let miss = tools().call_tool(RECALL_MEMORY, json!({"key": "other"})).await;
        assert_eq!(miss["ok"], false);
    }

    #[test]
    fn declares_both_tools() {
        let names: Vec<_> = tools().tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec![GET_REPOSITORY_INFO, RECALL_MEMORY]);
    }
}
