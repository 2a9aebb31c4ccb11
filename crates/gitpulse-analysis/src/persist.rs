//! Campaign record storage and the on-disk analysis report.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;

use gitpulse_core::{rfc3339, MemoryStore};

use crate::campaign::{CampaignOutcome, Email, StageFailure};
use crate::metrics::{HealthScore, RecentActivity, RepositoryAnalysis};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("storing campaign {key}: {source}")]
    Store {
        key: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("store returned an invalid acknowledgement: {0}")]
    Protocol(String),
    #[error("store rejected campaign {0}")]
    Rejected(String),
    #[error("writing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

/// Store key: `{owner}-{repo}-{unix millis}`.
pub fn campaign_key(owner: &str, repo: &str, at: OffsetDateTime) -> String {
    let millis = at.unix_timestamp_nanos() / 1_000_000;
    format!("{owner}-{repo}-{millis}")
}

/// `output_dir/{owner}-{repo}-analysis.json`
pub fn report_path(output_dir: &Path, owner: &str, repo: &str) -> PathBuf {
    output_dir.join(format!("{owner}-{repo}-analysis.json"))
}

// ── Campaign record ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordRepository {
    pub owner: String,
    pub name: String,
    pub total_authors: u32,
    pub processed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordCampaign {
    pub total_emails: usize,
    pub recipients: Vec<String>,
    pub emails: Vec<Email>,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordQuery {
    pub owner: String,
    pub repo: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    pub campaign_id: String,
    pub status: String,
    pub last_updated: String,
    pub query: RecordQuery,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordStats {
    pub total_authors: u32,
    pub total_emails: usize,
    pub average_email_length: usize,
    pub unique_domains: Vec<String>,
}

/// Everything one workflow run produced. Written once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignRecord {
    pub repository: RecordRepository,
    pub campaign: RecordCampaign,
    pub metadata: RecordMetadata,
    pub analysis: RepositoryAnalysis,
    pub stats: RecordStats,
    #[serde(default)]
    pub failures: Vec<StageFailure>,
}

impl CampaignRecord {
    pub fn new(
        owner: &str,
        repo: &str,
        analysis: RepositoryAnalysis,
        outcome: CampaignOutcome,
        at: OffsetDateTime,
    ) -> Self {
        let ts = rfc3339(at);
        let total_authors = analysis.commit_analysis.unique_authors;
        let emails = outcome.emails;

        let average_email_length = if emails.is_empty() {
            0
        } else {
            let total: usize = emails.iter().map(|e| e.body.chars().count()).sum();
            (total as f64 / emails.len() as f64).round() as usize
        };
        let unique_domains: BTreeSet<String> = emails
            .iter()
            .filter_map(|e| e.recipient_email.split_once('@').map(|(_, d)| d.to_lowercase()))
            .collect();

        Self {
            repository: RecordRepository {
                owner: owner.to_string(),
                name: repo.to_string(),
                total_authors,
                processed_at: ts.clone(),
            },
            campaign: RecordCampaign {
                total_emails: emails.len(),
                recipients: emails.iter().map(|e| e.recipient_email.clone()).collect(),
                emails: emails.clone(),
                generated_at: ts.clone(),
            },
            metadata: RecordMetadata {
                campaign_id: campaign_key(owner, repo, at),
                status: "completed".to_string(),
                last_updated: ts.clone(),
                query: RecordQuery {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                    timestamp: ts,
                },
            },
            analysis,
            stats: RecordStats {
                total_authors,
                total_emails: emails.len(),
                average_email_length,
                unique_domains: unique_domains.into_iter().collect(),
            },
            failures: outcome.failures,
        }
    }

    pub fn key(&self) -> &str {
        &self.metadata.campaign_id
    }
}

/// `{success, campaignId}` returned by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub success: bool,
    pub campaign_id: String,
}

pub fn parse_ack(raw: &Value) -> Result<Ack, PersistError> {
    let success = raw
        .get("success")
        .and_then(Value::as_bool)
        .ok_or_else(|| PersistError::Protocol(format!("missing boolean `success` in {raw}")))?;
    let campaign_id = raw
        .get("campaignId")
        .and_then(Value::as_str)
        .ok_or_else(|| PersistError::Protocol(format!("missing string `campaignId` in {raw}")))?;
    Ok(Ack {
        success,
        campaign_id: campaign_id.to_string(),
    })
}

/// Store the record under its key. Any failure is fatal for the run.
pub async fn store_campaign(
    store: &dyn MemoryStore,
    record: &CampaignRecord,
) -> Result<Ack, PersistError> {
    let key = record.key().to_string();
    let data = serde_json::to_value(record).map_err(|e| PersistError::Store {
        key: key.clone(),
        source: e.into(),
    })?;
    let raw = store
        .memorize(&key, &data)
        .await
        .map_err(|source| PersistError::Store {
            key: key.clone(),
            source,
        })?;
    let ack = parse_ack(&raw)?;
    if !ack.success {
        return Err(PersistError::Rejected(key));
    }
    info!(campaign_id = %ack.campaign_id, "campaign stored");
    Ok(ack)
}

/// Write the analysis as pretty JSON, creating missing directories.
pub fn write_analysis(
    output_dir: &Path,
    owner: &str,
    repo: &str,
    analysis: &RepositoryAnalysis,
) -> Result<PathBuf, PersistError> {
    let path = report_path(output_dir, owner, repo);
    let io_err = |source: anyhow::Error| PersistError::Io {
        path: path.clone(),
        source,
    };
    let json = serde_json::to_string_pretty(analysis).map_err(|e| io_err(e.into()))?;
    gitpulse_store::write_atomic(&path, json.as_bytes()).map_err(io_err)?;
    info!(path = %path.display(), "analysis written");
    Ok(path)
}

// ── Report ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub name: String,
    pub url: String,
    pub stars: u64,
    pub contributors: usize,
    pub commits: u32,
    pub recent_activity: RecentActivity,
}

/// What a workflow run returns to its caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub report_path: PathBuf,
    pub campaign_id: String,
    pub health_score: HealthScore,
    pub summary: ReportSummary,
}

impl Report {
    pub fn new(report_path: PathBuf, ack: Ack, analysis: &RepositoryAnalysis) -> Self {
        Self {
            report_path,
            campaign_id: ack.campaign_id,
            health_score: analysis.health_score,
            summary: ReportSummary {
                name: analysis.repository.name.clone(),
                url: analysis.repository.url.clone(),
                stars: analysis.repository.stars,
                contributors: analysis.contributors.len(),
                commits: analysis.commit_analysis.total_commits,
                recent_activity: analysis.commit_analysis.recent_activity,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::analyze;
    use crate::testutil::{info, NOW};
    use serde_json::json;

    struct FixedAck(Value);

    #[async_trait::async_trait]
    impl MemoryStore for FixedAck {
        async fn memorize(&self, _key: &str, _data: &Value) -> anyhow::Result<Value> {
            Ok(self.0.clone())
        }
        async fn recall(&self, _key: &str) -> anyhow::Result<Option<Value>> {
            Ok(None)
        }
    }

    struct Broken;

    #[async_trait::async_trait]
    impl MemoryStore for Broken {
        async fn memorize(&self, _key: &str, _data: &Value) -> anyhow::Result<Value> {
            anyhow::bail!("disk full")
        }
        async fn recall(&self, _key: &str) -> anyhow::Result<Option<Value>> {
            Ok(None)
        }
    }

    fn record() -> CampaignRecord {
        let outcome = CampaignOutcome {
            emails: vec![
                Email {
                    recipient_name: "Ada".into(),
                    recipient_email: "ada@Example.com".into(),
                    subject: "s".into(),
                    body: "1234".into(),
                },
                Email {
                    recipient_name: "Bob".into(),
                    recipient_email: "bob@example.com".into(),
                    subject: "s".into(),
                    body: "123456789".into(),
                },
            ],
            failures: vec![],
        };
        CampaignRecord::new("acme", "widget", analyze(&info(), NOW), outcome, NOW)
    }

    #[test]
    fn key_uses_unix_millis() {
        let expected = format!("acme-widget-{}", NOW.unix_timestamp() * 1000);
        assert_eq!(campaign_key("acme", "widget", NOW), expected);
    }

    #[test]
    fn record_stats_and_metadata() {
        let r = record();
        assert_eq!(r.metadata.status, "completed");
        assert_eq!(r.key(), campaign_key("acme", "widget", NOW));
        assert_eq!(r.campaign.total_emails, 2);
        assert_eq!(r.stats.average_email_length, 7);
        assert_eq!(r.stats.unique_domains, vec!["example.com".to_string()]);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["metadata"]["campaignId"], r.key());
        assert_eq!(json["campaign"]["emails"][0]["recipientName"], "Ada");
    }

    #[test]
    fn ack_shape_is_validated() {
        assert!(parse_ack(&json!({"success": true, "campaignId": "k"})).is_ok());
        assert!(matches!(parse_ack(&json!({"ok": true})), Err(PersistError::Protocol(_))));
        assert!(matches!(
            parse_ack(&json!({"success": "yes", "campaignId": "k"})),
            Err(PersistError::Protocol(_))
        ));
        assert!(matches!(parse_ack(&json!("stored")), Err(PersistError::Protocol(_))));
    }

    #[tokio::test]
    async fn store_failures_are_fatal() {
        let r = record();
        let err = store_campaign(&FixedAck(json!({"done": 1})), &r).await.unwrap_err();
        assert!(matches!(err, PersistError::Protocol(_)));
        let err = store_campaign(&FixedAck(json!({"success": false, "campaignId": "x"})), &r)
            .await
            .unwrap_err();
        assert!(matches!(err, PersistError::Rejected(_)));
        let err = store_campaign(&Broken, &r).await.unwrap_err();
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn analysis_written_under_missing_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("nested").join("output");
        let analysis = analyze(&info(), NOW);
        let path = write_analysis(&out, "acme", "widget", &analysis).unwrap();
        assert!(path.ends_with("acme-widget-analysis.json"));
        let back: RepositoryAnalysis =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, analysis);
    }

    #[test]
    fn unwritable_output_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let err = write_analysis(&blocker, "acme", "widget", &analyze(&info(), NOW)).unwrap_err();
        assert!(matches!(err, PersistError::Io { .. }));
    }
}
