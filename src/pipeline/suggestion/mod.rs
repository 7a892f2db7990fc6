//! AI-assisted rule and risk suggestion.
//!
//! A completion model is prompted with a document's text, its output is
//! parsed leniently into candidates, and candidates are merged into the
//! rule/risk tables by natural key.

pub mod engine;
pub mod normalize;
pub mod parser;
pub mod prompt;
pub mod types;

pub use engine::SuggestionEngine;
pub use parser::{parse_completion, ParseResult};
pub use types::*;

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::extraction::TextSourceError;
use super::UpstreamError;
use crate::db::DatabaseError;

/// Text generation model abstraction.
pub trait CompletionModel: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String, UpstreamError>;
}

/// How AI re-suggestions treat records a human has edited since.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Leave human-edited records untouched and report them as preserved.
    PreserveHumanEdits,
    /// Apply the AI candidate and clear the human-edit mark.
    Overwrite,
}

impl MergePolicy {
    pub fn overwrites(self) -> bool {
        self == Self::Overwrite
    }
}

impl FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "preserve_human_edits" | "preserve" => Ok(Self::PreserveHumanEdits),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(format!("unknown merge policy: {other}")),
        }
    }
}

#[derive(Error, Debug)]
pub enum SuggestionError {
    #[error("Cannot read document text: {0}")]
    Text(#[from] TextSourceError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

type Responder = Box<dyn Fn(&str) -> Result<String, UpstreamError> + Send + Sync>;

/// Scripted completion model for tests and offline runs.
///
/// Answers every prompt through a responder closure and records the prompts
/// it received.
pub struct MockCompletionModel {
    responder: Responder,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockCompletionModel {
    /// Always answer with `response`.
    pub fn fixed(response: &str) -> Self {
        let response = response.to_string();
        Self::with_responder(move |_| Ok(response.clone()))
    }

    /// Answer rule prompts with `rules` and risk prompts with `risks`.
    pub fn rules_then_risks(rules: &str, risks: &str) -> Self {
        let rules = rules.to_string();
        let risks = risks.to_string();
        Self::with_responder(move |prompt| {
            if prompt.contains(prompt::RISK_PROMPT_MARKER) {
                Ok(risks.clone())
            } else {
                Ok(rules.clone())
            }
        })
    }

    /// Fail every call with a transient upstream error.
    pub fn unavailable() -> Self {
        Self::with_responder(|_| {
            Err(UpstreamError::Connection {
                service: "completion",
                url: "mock://unavailable".into(),
            })
        })
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<String, UpstreamError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl CompletionModel for MockCompletionModel {
    fn complete(&self, prompt: &str) -> Result<String, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        (self.responder)(prompt)
    }
}
