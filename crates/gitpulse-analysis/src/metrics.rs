//! Commit aggregation and the four-part health score.
//!
//! All functions here are pure: "now" is a parameter, nothing reads the clock.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use gitpulse_core::{CommitRecord, Contributor, RepoInfo, Repository};

const HOURS_DAY: f64 = 24.0;
const HOURS_WEEK: f64 = 168.0;
const HOURS_MONTH: f64 = 720.0;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecentActivity {
    #[serde(rename = "last24Hours")]
    pub last_24_hours: u32,
    #[serde(rename = "lastWeek")]
    pub last_week: u32,
    #[serde(rename = "lastMonth")]
    pub last_month: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommitAnalysis {
    pub total_commits: u32,
    pub unique_authors: u32,
    pub verified_commits: u32,
    pub commits_by_author: BTreeMap<String, u32>,
    pub recent_activity: RecentActivity,
}

/// Health sub-scores before rounding, each already clamped to [0, 100].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawScores {
    pub activity: f64,
    pub community: f64,
    pub maintenance: f64,
    pub documentation: f64,
}

impl RawScores {
    /// Rounded mean of the unrounded sub-scores.
    pub fn total(&self) -> u32 {
        let mean = (self.activity + self.community + self.maintenance + self.documentation) / 4.0;
        mean.round() as u32
    }

    pub fn rounded(&self) -> HealthScore {
        HealthScore {
            total: self.total(),
            activity: self.activity.round() as u32,
            community: self.community.round() as u32,
            maintenance: self.maintenance.round() as u32,
            documentation: self.documentation.round() as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthScore {
    pub total: u32,
    pub activity: u32,
    pub community: u32,
    pub maintenance: u32,
    pub documentation: u32,
}

/// Full analysis artifact for one repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryAnalysis {
    pub repository: Repository,
    pub contributors: Vec<Contributor>,
    pub commit_analysis: CommitAnalysis,
    pub health_score: HealthScore,
}

/// Bucket commits by age. Buckets nest: a commit from 2 hours ago counts
/// toward all three. Commits without a date count toward none.
pub fn recent_activity(commits: &[CommitRecord], now: OffsetDateTime) -> RecentActivity {
    let mut activity = RecentActivity::default();
    for date in commits.iter().filter_map(|c| c.date) {
        let hours = (now - date).as_seconds_f64() / 3600.0;
        if hours <= HOURS_DAY {
            activity.last_24_hours += 1;
        }
        if hours <= HOURS_WEEK {
            activity.last_week += 1;
        }
        if hours <= HOURS_MONTH {
            activity.last_month += 1;
        }
    }
    activity
}

pub fn commit_analysis(commits: &[CommitRecord], now: OffsetDateTime) -> CommitAnalysis {
    let mut by_author: BTreeMap<String, u32> = BTreeMap::new();
    for commit in commits {
        *by_author.entry(commit.author_key().to_string()).or_default() += 1;
    }
    CommitAnalysis {
        total_commits: commits.len() as u32,
        unique_authors: by_author.len() as u32,
        verified_commits: commits.iter().filter(|c| c.verified).count() as u32,
        commits_by_author: by_author,
        recent_activity: recent_activity(commits, now),
    }
}

pub fn activity_score(recent: &RecentActivity) -> f64 {
    let weighted = f64::from(recent.last_24_hours) * 30.0
        + f64::from(recent.last_week) * 10.0
        + f64::from(recent.last_month) * 2.0;
    clamp(weighted / 10.0)
}

pub fn community_score(repo: &Repository, contributor_count: usize) -> f64 {
    let weighted = repo.stars as f64 * 0.5
        + repo.forks as f64 * 2.0
        + repo.watchers as f64
        + contributor_count as f64 * 5.0;
    clamp(weighted / 10.0)
}

/// With no commits the verified ratio is 0, not NaN.
pub fn maintenance_score(repo: &Repository, analysis: &CommitAnalysis) -> f64 {
    let verified_ratio = if analysis.total_commits == 0 {
        0.0
    } else {
        f64::from(analysis.verified_commits) / f64::from(analysis.total_commits)
    };
    let archived = if repo.archived { 0.0 } else { 30.0 };
    let disabled = if repo.disabled { 0.0 } else { 30.0 };
    clamp(verified_ratio * 40.0 + archived + disabled)
}

pub fn documentation_score(repo: &Repository) -> f64 {
    let description = match repo.description.as_deref() {
        Some(d) if !d.is_empty() => 30.0,
        _ => 0.0,
    };
    let license = if repo.license.is_some() { 30.0 } else { 0.0 };
    clamp(description + repo.topics.len() as f64 * 10.0 + license)
}

pub fn raw_scores(info: &RepoInfo, analysis: &CommitAnalysis) -> RawScores {
    RawScores {
        activity: activity_score(&analysis.recent_activity),
        community: community_score(&info.repository, info.contributors.len()),
        maintenance: maintenance_score(&info.repository, analysis),
        documentation: documentation_score(&info.repository),
    }
}

/// Aggregate everything the source returned into one analysis.
pub fn analyze(info: &RepoInfo, now: OffsetDateTime) -> RepositoryAnalysis {
    let commit_analysis = commit_analysis(&info.commits, now);
    let health_score = raw_scores(info, &commit_analysis).rounded();
    RepositoryAnalysis {
        repository: info.repository.clone(),
        contributors: info.contributors.clone(),
        commit_analysis,
        health_score,
    }
}

fn clamp(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}
