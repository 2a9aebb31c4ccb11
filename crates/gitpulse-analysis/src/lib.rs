pub mod campaign;
pub mod metrics;
pub mod persist;
pub mod workflow;

pub use campaign::{
    extract_authors, Author, AuthorState, CampaignOutcome, Email, EmailCampaignPipeline, Stage,
    StageError, StageFailure,
};
pub use metrics::{analyze, CommitAnalysis, HealthScore, RecentActivity, RepositoryAnalysis};
pub use persist::{CampaignRecord, PersistError, Report};
pub use workflow::{AnalysisWorkflow, WorkflowError};

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use time::macros::datetime;
    use time::OffsetDateTime;

    use gitpulse_core::{
        CommitRecord, GenerateError, License, RepoInfo, RepoInfoResult, RepoSource, Repository,
        TextGenerator,
    };

    pub const NOW: OffsetDateTime = datetime!(2024-06-01 12:00 UTC);

    pub fn repository() -> Repository {
        Repository {
            name: "widget".into(),
            full_name: "acme/widget".into(),
            description: Some("Widgets for everyone".into()),
            url: "https://github.com/acme/widget".into(),
            stars: 10,
            forks: 2,
            watchers: 10,
            open_issues: 1,
            language: Some("Rust".into()),
            topics: vec!["cli".into(), "widgets".into()],
            created_at: "2024-01-01T00:00:00Z".into(),
            updated_at: "2024-06-01T00:00:00Z".into(),
            pushed_at: "2024-06-01T00:00:00Z".into(),
            size: 128,
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

    /// Commit by `username`, author name capitalized.
    pub fn commit(username: &str, date: Option<OffsetDateTime>, verified: bool) -> CommitRecord {
        let mut name = username.to_string();
        if let Some(first) = name.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        CommitRecord {
            sha: format!("{username}-sha"),
            message: "change".into(),
            author_name: name,
            author_email: format!("{username}@example.com"),
            author_username: Some(username.into()),
            date,
            verified,
            url: String::new(),
            author_avatar_url: None,
            author_profile_url: None,
        }
    }

    /// acme/widget: 3 commits, 2 verified, 2 authors, one in the last 24h.
    pub fn info() -> RepoInfo {
        RepoInfo {
            repository: repository(),
            commits: vec![
                commit("ada", Some(NOW - time::Duration::hours(2)), true),
                commit("bob", Some(NOW - time::Duration::hours(100)), true),
                commit("ada", Some(NOW - time::Duration::hours(400)), false),
            ],
            contributors: vec![],
        }
    }

    pub struct StaticSource(RepoInfoResult);

    impl StaticSource {
        pub fn found(info: RepoInfo) -> Self {
            Self(RepoInfoResult::Found(Box::new(info)))
        }
        pub fn failed(message: &str) -> Self {
            Self(RepoInfoResult::failed(message))
        }
    }

    #[async_trait::async_trait]
    impl RepoSource for StaticSource {
        async fn repository_info(&self, _owner: &str, _repo: &str) -> RepoInfoResult {
            self.0.clone()
        }
    }

    /// Deterministic writer. Replies depend on which stage the prompt is for.
    #[derive(Default)]
    pub struct ScriptedWriter {
        calls: AtomicUsize,
        fail_when: Option<(String, GenerateError)>,
        fail_first: Mutex<Option<(usize, GenerateError)>>,
        stall: bool,
        blank: bool,
    }

    impl ScriptedWriter {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn with(f: impl FnOnce(&mut Self)) -> Arc<Self> {
            let mut w = Self::default();
            f(&mut w);
            Arc::new(w)
        }

        /// Fails every call whose prompt contains `needle`.
        pub fn failing_when(needle: &str, err: GenerateError) -> Arc<Self> {
            let needle = needle.to_string();
            Self::with(|w| w.fail_when = Some((needle, err)))
        }

        /// Fails the first `n` calls.
        pub fn failing_times(n: usize, err: GenerateError) -> Arc<Self> {
            Self::with(|w| w.fail_first = Mutex::new(Some((n, err))))
        }

        pub fn stalled() -> Arc<Self> {
            Self::with(|w| w.stall = true)
        }

        pub fn blank() -> Arc<Self> {
            Self::with(|w| w.blank = true)
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn recipient(prompt: &str) -> &str {
        prompt
            .split("email to ")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap_or("")
            .trim_end_matches('.')
    }

    #[async_trait::async_trait]
    impl TextGenerator for ScriptedWriter {
        async fn generate(
            &self,
            _instructions: &str,
            prompt: &str,
        ) -> Result<String, GenerateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.stall {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.blank {
                return Ok("   ".into());
            }
            if let Some((needle, err)) = &self.fail_when {
                if prompt.contains(needle.as_str()) {
                    return Err(err.clone());
                }
            }
            {
                let mut first = self.fail_first.lock().unwrap();
                if let Some((remaining, err)) = first.as_mut() {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(err.clone());
                    }
                }
            }
            let name = recipient(prompt);
            Ok(if prompt.starts_with("Generate a compelling subject line") {
                format!("\"subject for {name}\"\n")
            } else if prompt.starts_with("Edit this email") {
                format!("edited: Dear {name}, try Mem0.ai")
            } else {
                format!("Dear {name}, Mem0.ai is a memory layer for LLM apps.")
            })
        }
    }
}
