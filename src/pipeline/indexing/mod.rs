pub mod pipeline;
pub mod queue;

pub use pipeline::{IndexOutcome, IndexingPipeline, RetryPolicy};
pub use queue::IndexingQueue;

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::pipeline::storage::StorageError;
use crate::pipeline::UpstreamError;

/// One request to (re)index a document at a given version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexJob {
    pub document_id: Uuid,
    pub version_id: Uuid,
}

/// Fire-and-forget trigger for indexing runs. `schedule` never blocks on
/// the run itself and never reports its outcome.
pub trait IndexScheduler: Send + Sync {
    fn schedule(&self, job: IndexJob);
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Version {0} not found for document")]
    VersionMissing(Uuid),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl IndexError {
    /// Whether the run should be retried after a backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Upstream(e) => e.is_transient(),
            Self::Storage(e) => e.is_transient(),
            Self::VersionMissing(_) | Self::Database(_) => false,
        }
    }
}

/// Scheduler that only records jobs, for tests of the triggering side.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingScheduler {
    pub jobs: std::sync::Mutex<Vec<IndexJob>>,
}

#[cfg(test)]
impl RecordingScheduler {
    pub fn jobs(&self) -> Vec<IndexJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl IndexScheduler for RecordingScheduler {
    fn schedule(&self, job: IndexJob) {
        self.jobs.lock().unwrap().push(job);
    }
}
