use serde::{Deserialize, Serialize, Serializer};
use time::OffsetDateTime;

/// Repository metadata as returned by the repository source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub url: String,
    pub stars: u64,
    pub forks: u64,
    pub watchers: u64,
    pub open_issues: u64,
    pub language: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
    pub pushed_at: String,
    pub size: u64,
    pub default_branch: String,
    pub license: Option<License>,
    pub visibility: String,
    pub archived: bool,
    pub disabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct License {
    pub key: String,
    pub name: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Contributor {
    pub username: String,
    pub contributions: u64,
    pub avatar_url: String,
    pub url: String,
}

/// One commit, flattened to the fields the analysis needs. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommitRecord {
    pub sha: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_username: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub date: Option<OffsetDateTime>,
    pub verified: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_profile_url: Option<String>,
}

impl CommitRecord {
    /// Identity used for per-author counting: username when known, email otherwise.
    pub fn author_key(&self) -> &str {
        self.author_username
            .as_deref()
            .unwrap_or(self.author_email.as_str())
    }
}

/// Everything the repository source knows about one repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepoInfo {
    pub repository: Repository,
    pub commits: Vec<CommitRecord>,
    pub contributors: Vec<Contributor>,
}

/// Outcome of a repository lookup.
///
/// Source failures are data, not errors: they serialize as
/// `{"ok": false, "message": ...}` so an agent can narrate them.
#[derive(Debug, Clone, PartialEq)]
pub enum RepoInfoResult {
    Found(Box<RepoInfo>),
    Failed { message: String },
}

impl RepoInfoResult {
    pub fn failed(message: impl Into<String>) -> Self {
        RepoInfoResult::Failed {
            message: message.into(),
        }
    }
}

impl Serialize for RepoInfoResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Found<'a> {
            ok: bool,
            #[serde(flatten)]
            info: &'a RepoInfo,
        }
        #[derive(Serialize)]
        struct Failed<'a> {
            ok: bool,
            message: &'a str,
        }
        match self {
            RepoInfoResult::Found(info) => Found { ok: true, info }.serialize(serializer),
            RepoInfoResult::Failed { message } => {
                Failed { ok: false, message }.serialize(serializer)
            }
        }
    }
}
