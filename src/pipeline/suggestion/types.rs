use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::db::MergeOutcome;
use crate::models::enums::{Level, MitigationStatus};
use crate::models::{Risk, Rule};

/// A rule proposed by the model, after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleCandidate {
    pub name: String,
    pub description: String,
    pub category: String,
    pub priority: Level,
    pub tags: Vec<String>,
}

/// A risk proposed by the model, after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskCandidate {
    pub title: String,
    pub description: String,
    pub category: String,
    pub probability: Level,
    pub impact: Level,
    /// Rule names as written by the model; resolved to ids on merge.
    pub linked_rules: Vec<String>,
    pub mitigations: Vec<MitigationCandidate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MitigationCandidate {
    pub description: String,
    pub responsible_party: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub status: MitigationStatus,
}

/// Normalized candidates plus the reasons some raw items were dropped.
#[derive(Debug, Clone)]
pub struct Normalized<T> {
    pub candidates: Vec<T>,
    pub skipped: Vec<String>,
}

/// Merge counters for one suggestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeCounts {
    pub created: usize,
    pub updated: usize,
    pub preserved: usize,
}

impl MergeCounts {
    pub fn record(&mut self, outcome: &MergeOutcome) {
        match outcome {
            MergeOutcome::Created(_) => self.created += 1,
            MergeOutcome::Updated(_) => self.updated += 1,
            MergeOutcome::Preserved(_) => self.preserved += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.preserved
    }
}

/// Result of suggesting rules then risks for one document.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestionReport {
    pub document_id: Uuid,
    /// Stored state of every rule the run touched.
    pub rules: Vec<Rule>,
    pub risks: Vec<Risk>,
    pub rule_counts: MergeCounts,
    pub risk_counts: MergeCounts,
    /// Candidates dropped for a missing name/title.
    pub skipped: Vec<String>,
    /// Upstream failures absorbed during the run.
    pub errors: Vec<String>,
}

impl SuggestionReport {
    pub fn new(document_id: Uuid) -> Self {
        Self {
            document_id,
            rules: Vec::new(),
            risks: Vec::new(),
            rule_counts: MergeCounts::default(),
            risk_counts: MergeCounts::default(),
            skipped: Vec::new(),
            errors: Vec::new(),
        }
    }
}
