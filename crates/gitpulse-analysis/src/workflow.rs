use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;

use gitpulse_core::config::PipelineConfig;
use gitpulse_core::{MemoryStore, RepoInfoResult, RepoSource, TextGenerator};

use crate::campaign::{extract_authors, EmailCampaignPipeline};
use crate::metrics::analyze;
use crate::persist::{store_campaign, write_analysis, CampaignRecord, PersistError, Report};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("failed to get repository info: {0}")]
    Source(String),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Analysis workflow for one `{owner, repo}` trigger.
///
/// Steps run strictly in order: fetch, author extraction, email
/// generation, aggregation, campaign storage, report file.
pub struct AnalysisWorkflow {
    source: Arc<dyn RepoSource>,
    store: Arc<dyn MemoryStore>,
    pipeline: EmailCampaignPipeline,
    output_dir: PathBuf,
}

impl AnalysisWorkflow {
    pub fn new(
        source: Arc<dyn RepoSource>,
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn MemoryStore>,
        pipeline: &PipelineConfig,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            store,
            pipeline: EmailCampaignPipeline::new(generator, pipeline),
            output_dir: output_dir.into(),
        }
    }

    pub async fn run(&self, owner: &str, repo: &str) -> Result<Report, WorkflowError> {
        self.run_at(owner, repo, OffsetDateTime::now_utc()).await
    }

    pub async fn run_at(
        &self,
        owner: &str,
        repo: &str,
        now: OffsetDateTime,
    ) -> Result<Report, WorkflowError> {
        info!(owner, repo, "analysis workflow started");
        let info = match self.source.repository_info(owner, repo).await {
            RepoInfoResult::Found(info) => info,
            RepoInfoResult::Failed { message } => return Err(WorkflowError::Source(message)),
        };

        let authors = extract_authors(&info.commits);
        info!(authors = authors.len(), commits = info.commits.len(), "authors extracted");
        let outcome = self.pipeline.run(&authors).await;

        let analysis = analyze(&info, now);
        let record = CampaignRecord::new(owner, repo, analysis.clone(), outcome, now);
        let ack = store_campaign(self.store.as_ref(), &record).await?;
        let path = write_analysis(&self.output_dir, owner, repo, &analysis)?;

        info!(
            owner,
            repo,
            campaign_id = %ack.campaign_id,
            health = analysis.health_score.total,
            "analysis workflow finished"
        );
        Ok(Report::new(path, ack, &analysis))
    }
}
