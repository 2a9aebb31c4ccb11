//! GitHub REST implementation of [`RepoSource`].
//!
//! Every failure (network, status, decoding, timeout) is caught here and
//! turned into `RepoInfoResult::Failed`; nothing escapes this boundary.

mod model;

use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use gitpulse_core::config::GithubConfig;
use gitpulse_core::{RepoInfo, RepoInfoResult, RepoSource};

pub use model::{map_commit, map_contributor, map_repository};

/// Most recent commits fetched per analysis.
pub const COMMITS_PER_PAGE: u32 = 100;
/// Top contributors fetched per analysis.
pub const CONTRIBUTORS_PER_PAGE: u32 = 20;

const USER_AGENT: &str = concat!("gitpulse/", env!("CARGO_PKG_VERSION"));

pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
    timeout: Duration,
}

impl GitHubClient {
    pub fn new(config: &GithubConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            timeout: config.timeout(),
        }
    }

    /// One GET, with the timeout covering the request and the body read.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> anyhow::Result<T> {
        tokio::time::timeout(self.timeout, self.request(path, query))
            .await
            .with_context(|| format!("GET {path} timed out after {:?}", self.timeout))?
    }

    async fn request<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> anyhow::Result<T> {
        let url = format!("{}{}", self.api_base, path);
        let mut req = self
            .http
            .get(&url)
            .query(query)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        debug!(%url, "GET");
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                .unwrap_or_else(|| status.to_string());
            anyhow::bail!("{message}");
        }
        resp.json::<T>()
            .await
            .with_context(|| format!("decoding response of GET {path}"))
    }

    async fn fetch(&self, owner: &str, repo: &str) -> anyhow::Result<RepoInfo> {
        let base = format!("/repos/{owner}/{repo}");
        let raw_repo: model::RawRepository = self.get(&base, &[]).await?;
        let raw_commits: Vec<model::RawCommit> = self
            .get(
                &format!("{base}/commits"),
                &[("per_page", COMMITS_PER_PAGE.to_string())],
            )
            .await?;
        let raw_contributors: Vec<model::RawContributor> = self
            .get(
                &format!("{base}/contributors"),
                &[("per_page", CONTRIBUTORS_PER_PAGE.to_string())],
            )
            .await?;
        Ok(RepoInfo {
            repository: map_repository(raw_repo),
            commits: raw_commits.into_iter().map(map_commit).collect(),
            contributors: raw_contributors.into_iter().map(map_contributor).collect(),
        })
    }
}

#[async_trait::async_trait]
impl RepoSource for GitHubClient {
    async fn repository_info(&self, owner: &str, repo: &str) -> RepoInfoResult {
        match self.fetch(owner, repo).await {
            Ok(info) => RepoInfoResult::Found(Box::new(info)),
            Err(e) => {
                warn!(owner, repo, error = %e, "error fetching repository information");
                RepoInfoResult::failed(e.to_string())
            }
        }
    }
}
