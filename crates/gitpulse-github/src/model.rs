//! Raw GitHub REST payloads and their mapping onto the core model.

use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use gitpulse_core::{CommitRecord, Contributor, License, Repository};

#[derive(Debug, Deserialize)]
pub struct RawRepository {
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub watchers_count: u64,
    #[serde(default)]
    pub open_issues_count: u64,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub topics: Option<Vec<String>>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub pushed_at: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub license: Option<RawLicense>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct RawLicense {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawCommit {
    pub sha: String,
    #[serde(default)]
    pub html_url: String,
    pub commit: RawCommitDetail,
    #[serde(default)]
    pub author: Option<RawUser>,
    #[serde(default)]
    pub committer: Option<RawUser>,
}

#[derive(Debug, Deserialize)]
pub struct RawCommitDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub author: Option<RawSignature>,
    #[serde(default)]
    pub committer: Option<RawSignature>,
    #[serde(default)]
    pub verification: Option<RawVerification>,
}

#[derive(Debug, Deserialize)]
pub struct RawSignature {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawVerification {
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Deserialize)]
pub struct RawUser {
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawContributor {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub contributions: u64,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub html_url: String,
}

pub fn map_repository(raw: RawRepository) -> Repository {
    Repository {
        name: raw.name,
        full_name: raw.full_name,
        description: raw.description,
        url: raw.html_url,
        stars: raw.stargazers_count,
        forks: raw.forks_count,
        watchers: raw.watchers_count,
        open_issues: raw.open_issues_count,
        language: raw.language,
        topics: raw.topics.unwrap_or_default(),
        created_at: raw.created_at.unwrap_or_default(),
        updated_at: raw.updated_at.unwrap_or_default(),
        pushed_at: raw.pushed_at.unwrap_or_default(),
        size: raw.size,
        default_branch: raw.default_branch.unwrap_or_default(),
        license: raw.license.map(|l| License {
            key: l.key,
            name: l.name,
            url: l.url,
        }),
        visibility: raw.visibility.unwrap_or_else(|| "public".to_string()),
        archived: raw.archived,
        disabled: raw.disabled,
    }
}

/// First non-empty value, author side before committer side.
fn first_present<T>(
    author: Option<&T>,
    committer: Option<&T>,
    field: impl Fn(&T) -> Option<&str>,
) -> Option<String> {
    [author, committer]
        .into_iter()
        .flatten()
        .filter_map(&field)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// Each author field falls back to the committer, then to a placeholder.
/// Empty strings count as missing.
pub fn map_commit(raw: RawCommit) -> CommitRecord {
    let detail = raw.commit;
    let (sig_a, sig_c) = (detail.author.as_ref(), detail.committer.as_ref());
    let (user_a, user_c) = (raw.author.as_ref(), raw.committer.as_ref());

    let author_name = first_present(sig_a, sig_c, |s| s.name.as_deref())
        .unwrap_or_else(|| "Unknown".to_string());
    let author_email = first_present(sig_a, sig_c, |s| s.email.as_deref())
        .unwrap_or_else(|| "unknown".to_string());
    let date = first_present(sig_a, sig_c, |s| s.date.as_deref())
        .and_then(|d| OffsetDateTime::parse(&d, &Rfc3339).ok());

    CommitRecord {
        sha: raw.sha,
        message: detail.message,
        author_name,
        author_email,
        author_username: first_present(user_a, user_c, |u| Some(u.login.as_str())),
        date,
        verified: detail.verification.map(|v| v.verified).unwrap_or(false),
        url: raw.html_url,
        author_avatar_url: first_present(user_a, user_c, |u| u.avatar_url.as_deref()),
        author_profile_url: first_present(user_a, user_c, |u| u.html_url.as_deref()),
    }
}

pub fn map_contributor(raw: RawContributor) -> Contributor {
    Contributor {
        username: raw.login,
        contributions: raw.contributions,
        avatar_url: raw.avatar_url,
        url: raw.html_url,
    }
}
