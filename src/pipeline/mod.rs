pub mod batch; // Batch suggestion runs across the corpus
pub mod extraction;
pub mod indexing; // Extraction → embedding → vector index
pub mod ollama;
pub mod search;
pub mod storage;
pub mod suggestion; // Rule/risk suggestion from document text

use thiserror::Error;

/// Failure of an external model or index call. Timeouts are failures too.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("Cannot connect to {service} at {url}")]
    Connection { service: &'static str, url: String },

    #[error("{service} request timed out after {secs}s")]
    Timeout { service: &'static str, secs: u64 },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Failed to parse upstream response: {0}")]
    ResponseParsing(String),

    #[error("Embedding model returned an empty vector")]
    EmptyEmbedding,

    #[error("Vector index error: {0}")]
    VectorIndex(String),
}

impl UpstreamError {
    /// Whether repeating the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } | Self::HttpClient(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::VectorIndex(_) => true,
            Self::ResponseParsing(_) | Self::EmptyEmbedding => false,
        }
    }
}
