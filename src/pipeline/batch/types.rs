use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::enums::DocumentStatus;
use crate::pipeline::suggestion::MergePolicy;

/// Which documents a batch covers and how it runs.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Eligible statuses; empty means every document.
    pub statuses: Vec<DocumentStatus>,
    /// Documents processed at once (1 = sequential).
    pub concurrency: usize,
    pub merge_policy: MergePolicy,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            statuses: Vec::new(),
            concurrency: 1,
            merge_policy: MergePolicy::PreserveHumanEdits,
        }
    }
}

/// Shared flag that stops a running batch from starting new documents.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One document the batch could not fully process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentFailure {
    pub document_id: Uuid,
    pub error: String,
}

/// Result of a batch run, returned even under partial failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub documents_total: u32,
    pub documents_processed: u32,
    /// Not started because the run was cancelled.
    pub documents_skipped: u32,
    pub rules_processed: u32,
    pub risks_processed: u32,
    pub errors_count: u32,
    /// One human-readable line per action taken.
    pub summary: Vec<String>,
    pub failures: Vec<DocumentFailure>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl BatchSummary {
    pub fn empty() -> Self {
        Self {
            documents_total: 0,
            documents_processed: 0,
            documents_skipped: 0,
            rules_processed: 0,
            risks_processed: 0,
            errors_count: 0,
            summary: Vec::new(),
            failures: Vec::new(),
            cancelled: false,
            duration_ms: 0,
        }
    }
}

/// Progress notifications emitted while a batch runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BatchStatusEvent {
    Started {
        document_count: u32,
    },
    Progress {
        completed: u32,
        total: u32,
        document_id: Uuid,
    },
    Completed {
        rules_processed: u32,
        risks_processed: u32,
        errors_count: u32,
        duration_ms: u64,
    },
    Cancelled {
        completed: u32,
        total: u32,
    },
    Failed {
        error: String,
    },
}
