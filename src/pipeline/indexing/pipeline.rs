//! Extraction → embedding → vector index, for one `(document, version)`.
//!
//! Each run tracks its progress on the document (`index_state`,
//! `index_attempts`, `index_error`). State writes are conditioned on the
//! version still being current, so a run for a superseded version never
//! overwrites the state of a newer one. The current version is checked
//! again after every vector write; a run whose write landed after the
//! document moved on reindexes the current version.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::{IndexError, IndexJob};
use crate::db::{self, Database};
use crate::models::enums::IndexState;
use crate::pipeline::extraction::{extract_version_text, TextExtractor};
use crate::pipeline::storage::{
    document_payload, ContentStore, EmbeddingModel, PayloadFilter, VectorIndex,
};
use crate::pipeline::UpstreamError;

/// Maximum characters of extracted text sent to the embedding model.
const MAX_EMBED_CHARS: usize = 8_000;

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Final result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    Indexed { attempts: u32 },
    /// No extractable text; any previous vector was removed.
    Emptied { attempts: u32 },
    /// The document moved to another version (or was deleted) mid-run.
    Superseded,
    Failed { attempts: u32, reason: String },
}

enum RunStep {
    Indexed,
    Emptied,
    Superseded,
    /// The vector write raced a newer version (or a delete).
    Overtaken(Option<Uuid>),
}

pub struct IndexingPipeline {
    db: Arc<Database>,
    content: Arc<dyn ContentStore>,
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn EmbeddingModel>,
    index: Arc<dyn VectorIndex>,
    retry: RetryPolicy,
}

impl IndexingPipeline {
    pub fn new(
        db: Arc<Database>,
        content: Arc<dyn ContentStore>,
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn EmbeddingModel>,
        index: Arc<dyn VectorIndex>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            db,
            content,
            extractor,
            embedder,
            index,
            retry,
        }
    }

    /// Run the pipeline to completion. Failures end up on the document,
    /// never in the return path of the caller that scheduled the job.
    pub fn run(&self, job: IndexJob) -> IndexOutcome {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.set_state(&job, IndexState::Processing, attempt, None) {
                Ok(true) => {}
                Ok(false) => return self.superseded(&job),
                Err(e) => {
                    tracing::error!(document_id = %job.document_id, error = %e, "Cannot record indexing state");
                    return IndexOutcome::Failed {
                        attempts: attempt,
                        reason: e.to_string(),
                    };
                }
            }

            let result = self.process(&job);
            let (state, outcome) = match result {
                Ok(RunStep::Indexed) => (
                    IndexState::Completed,
                    IndexOutcome::Indexed { attempts: attempt },
                ),
                Ok(RunStep::Emptied) => (
                    IndexState::Completed,
                    IndexOutcome::Emptied { attempts: attempt },
                ),
                Ok(RunStep::Superseded) => return self.superseded(&job),
                Ok(RunStep::Overtaken(current)) => return self.repair(&job, current),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(
                        document_id = %job.document_id,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Indexing attempt failed, retrying"
                    );
                    std::thread::sleep(delay);
                    continue;
                }
                Err(e) => {
                    let reason = e.to_string();
                    tracing::warn!(
                        document_id = %job.document_id,
                        attempts = attempt,
                        error = %reason,
                        "Indexing failed"
                    );
                    (
                        IndexState::Failed,
                        IndexOutcome::Failed {
                            attempts: attempt,
                            reason,
                        },
                    )
                }
            };

            let error = match &outcome {
                IndexOutcome::Failed { reason, .. } => Some(reason.as_str()),
                _ => None,
            };
            return match self.set_state(&job, state, attempt, error) {
                Ok(true) => {
                    tracing::info!(
                        document_id = %job.document_id,
                        version_id = %job.version_id,
                        state = state.as_str(),
                        attempts = attempt,
                        "Indexing finished"
                    );
                    outcome
                }
                Ok(false) => self.superseded(&job),
                Err(e) => {
                    tracing::error!(document_id = %job.document_id, error = %e, "Cannot record indexing state");
                    outcome
                }
            };
        }
    }

    fn superseded(&self, job: &IndexJob) -> IndexOutcome {
        tracing::debug!(
            document_id = %job.document_id,
            version_id = %job.version_id,
            "Indexing run superseded by a newer version"
        );
        IndexOutcome::Superseded
    }

    /// Undo a stale vector write by reindexing whatever is current now.
    fn repair(&self, job: &IndexJob, current: Option<Uuid>) -> IndexOutcome {
        match current {
            Some(version_id) => {
                tracing::info!(
                    document_id = %job.document_id,
                    stale_version_id = %job.version_id,
                    version_id = %version_id,
                    "Stale vector written, reindexing current version"
                );
                self.run(IndexJob {
                    document_id: job.document_id,
                    version_id,
                });
            }
            None => {
                if let Err(e) = self
                    .index
                    .delete_where(&PayloadFilter::document(&job.document_id))
                {
                    tracing::warn!(document_id = %job.document_id, error = %e, "Cannot remove orphaned vector");
                }
            }
        }
        self.superseded(job)
    }

    fn set_state(
        &self,
        job: &IndexJob,
        state: IndexState,
        attempts: u32,
        error: Option<&str>,
    ) -> Result<bool, IndexError> {
        self.db.with_conn(|conn| {
            Ok(db::update_index_state(
                conn,
                &job.document_id,
                &job.version_id,
                state,
                attempts,
                error,
            )?)
        })
    }

    fn current_version(&self, job: &IndexJob) -> Result<Option<Uuid>, IndexError> {
        let doc = self
            .db
            .with_conn(|conn| db::get_document(conn, &job.document_id))?;
        Ok(doc.and_then(|d| d.current_version_id))
    }

    fn is_current(&self, job: &IndexJob) -> Result<bool, IndexError> {
        Ok(self.current_version(job)? == Some(job.version_id))
    }

    /// Confirm a vector write still belongs to the current version.
    fn confirm_write(&self, job: &IndexJob, step: RunStep) -> Result<RunStep, IndexError> {
        match self.current_version(job)? {
            Some(current) if current == job.version_id => Ok(step),
            current => Ok(RunStep::Overtaken(current)),
        }
    }

    fn process(&self, job: &IndexJob) -> Result<RunStep, IndexError> {
        let version = self
            .db
            .with_conn(|conn| db::get_version(conn, &job.version_id))?
            .filter(|v| v.document_id == job.document_id)
            .ok_or(IndexError::VersionMissing(job.version_id))?;

        let text = extract_version_text(self.content.as_ref(), self.extractor.as_ref(), &version)?;

        if text.trim().is_empty() {
            if !self.is_current(job)? {
                return Ok(RunStep::Superseded);
            }
            self.index.delete_where(&PayloadFilter::document(&job.document_id))?;
            return self.confirm_write(job, RunStep::Emptied);
        }

        let vector = self.embedder.embed(truncate_chars(&text, MAX_EMBED_CHARS))?;
        if vector.is_empty() {
            return Err(UpstreamError::EmptyEmbedding.into());
        }

        if !self.is_current(job)? {
            return Ok(RunStep::Superseded);
        }

        self.index.upsert(
            &record_id(&job.document_id),
            &vector,
            &document_payload(&job.document_id),
        )?;
        self.confirm_write(job, RunStep::Indexed)
    }
}

/// Vector record id for a document: one record per document.
pub fn record_id(document_id: &Uuid) -> String {
    document_id.to_string()
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
