//! Semantic document search: embed the query, take nearest neighbours,
//! join them back to documents the caller may view.

pub mod engine;

pub use engine::SearchEngine;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::DatabaseError;
use crate::models::Document;
use crate::pipeline::UpstreamError;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid search request: {0}")]
    Validation(String),

    #[error("Search upstream failure: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub top_k: usize,
    /// Hits scoring below this are dropped.
    #[serde(default)]
    pub min_score: f32,
}

/// A document matched by a search, with its similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentHit {
    pub document: Document,
    pub score: f32,
}
