//! Per-contributor outreach email generation.
//!
//! Every author moves through `Pending -> SubjectDrafted -> BodyDrafted ->
//! Edited -> Done`; any stage error moves it to `Failed` instead. One
//! author's failure never affects another's.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use gitpulse_core::config::PipelineConfig;
use gitpulse_core::{CommitRecord, GenerateError, TextGenerator};

const WRITER_INSTRUCTIONS: &str = "You are an experienced developer-relations writer. \
Write clear, professional outreach emails for the given subject and recipient.";

const EDITOR_INSTRUCTIONS: &str = "You are an editor for outreach emails. Do not change the \
wording of the email; only fix its formatting. Reply with the edited email and nothing else.";

/// A commit author eligible for outreach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    pub recipient_name: String,
    pub recipient_email: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Subject,
    Body,
    Edit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Subject => "subject",
            Stage::Body => "body",
            Stage::Edit => "edit",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorState {
    Pending,
    SubjectDrafted,
    BodyDrafted,
    Edited,
    Done,
    Failed(Stage),
}

// ── Valid transitions ──

const VALID_TRANSITIONS: &[(AuthorState, &[AuthorState])] = &[
    (
        AuthorState::Pending,
        &[AuthorState::SubjectDrafted, AuthorState::Failed(Stage::Subject)],
    ),
    (
        AuthorState::SubjectDrafted,
        &[AuthorState::BodyDrafted, AuthorState::Failed(Stage::Body)],
    ),
    (
        AuthorState::BodyDrafted,
        &[AuthorState::Edited, AuthorState::Failed(Stage::Edit)],
    ),
    (AuthorState::Edited, &[AuthorState::Done]),
    // Done and Failed are terminal
];

pub fn is_valid_transition(from: AuthorState, to: AuthorState) -> bool {
    VALID_TRANSITIONS
        .iter()
        .any(|(f, targets)| *f == from && targets.contains(&to))
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{stage} generation failed after {attempts} attempt(s): {source}")]
pub struct StageError {
    pub stage: Stage,
    pub attempts: u32,
    #[source]
    pub source: GenerateError,
}

/// Why an author was dropped from the campaign.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageFailure {
    pub recipient: String,
    pub stage: Stage,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CampaignOutcome {
    /// In author discovery order.
    pub emails: Vec<Email>,
    pub failures: Vec<StageFailure>,
}

/// Distinct authors in first-commit order.
///
/// Identity is the username when known, the email otherwise. Authors whose
/// name could not be resolved are skipped.
pub fn extract_authors(commits: &[CommitRecord]) -> Vec<Author> {
    let mut seen = HashSet::new();
    let mut authors = Vec::new();
    for commit in commits {
        let name = commit.author_name.trim();
        if name.is_empty() || name == "Unknown" {
            continue;
        }
        if !seen.insert(commit.author_key().to_string()) {
            continue;
        }
        authors.push(Author {
            name: name.to_string(),
            email: commit.author_email.clone(),
            username: commit.author_username.clone(),
        });
    }
    authors
}

pub fn subject_prompt(author: &Author) -> String {
    format!(
        "Generate a compelling subject line for an email to {name} about Mem0.ai. \
The subject should be professional and highlight the value proposition. \
Keep it between 6 and 12 words and reply with the subject line only.",
        name = author.name
    )
}

pub fn body_prompt(author: &Author, subject: &str) -> String {
    format!(
        "Write a personalized email to {name} with the subject \"{subject}\" about how Mem0.ai \
can enhance their AI applications.\n\
Focus on:\n\
1. How Mem0.ai provides a memory layer for LLM applications\n\
2. Benefits of personalized AI experiences\n\
3. Cost savings through intelligent data filtering\n\
4. Easy integration with existing AI solutions\n\
Keep it professional and concise.",
        name = author.name
    )
}

pub fn edit_prompt(author: &Author, draft: &str) -> String {
    format!(
        "Edit this email to {name} so it reads professionally:\n\n{draft}\n\n\
Keep the recipient's name, the company name (Mem0.ai) and the company website. \
Do not use any words other than those already in the email.",
        name = author.name
    )
}

struct Progress<'a> {
    author: &'a Author,
    state: AuthorState,
}

impl Progress<'_> {
    fn advance(&mut self, to: AuthorState) {
        debug_assert!(
            is_valid_transition(self.state, to),
            "invalid author transition {:?} -> {to:?}",
            self.state
        );
        debug!(author = %self.author.name, from = ?self.state, to = ?to, "author state");
        self.state = to;
    }
}

/// Three-stage email generation over a list of authors.
pub struct EmailCampaignPipeline {
    generator: Arc<dyn TextGenerator>,
    stage_timeout: Duration,
    max_attempts: u32,
}

impl EmailCampaignPipeline {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &PipelineConfig) -> Self {
        Self {
            generator,
            stage_timeout: config.stage_timeout(),
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Generate one email per author, sequentially, in input order.
    pub async fn run(&self, authors: &[Author]) -> CampaignOutcome {
        let mut outcome = CampaignOutcome::default();
        for author in authors {
            match self.draft(author).await {
                Ok(email) => outcome.emails.push(email),
                Err(e) => {
                    warn!(
                        author = %author.name,
                        stage = %e.stage,
                        error = %e,
                        "email generation failed; skipping author"
                    );
                    outcome.failures.push(StageFailure {
                        recipient: author.name.clone(),
                        stage: e.stage,
                        error: e.to_string(),
                    });
                }
            }
        }
        info!(
            emails = outcome.emails.len(),
            failed = outcome.failures.len(),
            "email campaign generated"
        );
        outcome
    }

    pub async fn draft(&self, author: &Author) -> Result<Email, StageError> {
        let mut progress = Progress {
            author,
            state: AuthorState::Pending,
        };

        let subject = self
            .stage(&mut progress, Stage::Subject, WRITER_INSTRUCTIONS, &subject_prompt(author))
            .await?;
        let subject = subject.trim().trim_matches('"').to_string();
        progress.advance(AuthorState::SubjectDrafted);

        let draft = self
            .stage(&mut progress, Stage::Body, WRITER_INSTRUCTIONS, &body_prompt(author, &subject))
            .await?;
        progress.advance(AuthorState::BodyDrafted);

        let edited = self
            .stage(&mut progress, Stage::Edit, EDITOR_INSTRUCTIONS, &edit_prompt(author, &draft))
            .await?;
        progress.advance(AuthorState::Edited);

        progress.advance(AuthorState::Done);
        Ok(Email {
            recipient_name: author.name.clone(),
            recipient_email: author.email.clone(),
            subject,
            body: edited,
        })
    }

    async fn stage(
        &self,
        progress: &mut Progress<'_>,
        stage: Stage,
        instructions: &str,
        prompt: &str,
    ) -> Result<String, StageError> {
        let result = self.generate(stage, instructions, prompt).await;
        if result.is_err() {
            progress.advance(AuthorState::Failed(stage));
        }
        result
    }

    /// One generation call with a timeout, retried while the failure is retryable.
    async fn generate(
        &self,
        stage: Stage,
        instructions: &str,
        prompt: &str,
    ) -> Result<String, StageError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let call = self.generator.generate(instructions, prompt);
            let result = match tokio::time::timeout(self.stage_timeout, call).await {
                Ok(Ok(text)) if text.trim().is_empty() => Err(GenerateError::Empty),
                Ok(result) => result,
                Err(_) => Err(GenerateError::Timeout(self.stage_timeout)),
            };
            match result {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempts < self.max_attempts => {
                    warn!(%stage, attempt = attempts, error = %e, "retrying generation");
                }
                Err(source) => {
                    return Err(StageError {
                        stage,
                        attempts,
                        source,
                    })
                }
            }
        }
    }
}
