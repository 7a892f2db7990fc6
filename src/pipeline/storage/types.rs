use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StorageError;
use crate::pipeline::UpstreamError;

/// Raw byte storage for version content.
pub trait ContentStore: Send + Sync {
    /// Store `bytes` under `key`, returning the key to persist.
    fn store(&self, key: &str, bytes: &[u8]) -> Result<String, StorageError>;
    fn fetch(&self, key: &str) -> Result<Vec<u8>, StorageError>;
    /// Delete `key`. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Embedding model abstraction
pub trait EmbeddingModel: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError>;
}

/// Nearest-neighbour index over document embeddings.
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the record stored under `id`.
    fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        payload: &serde_json::Value,
    ) -> Result<(), UpstreamError>;

    /// Top `top_k` records by similarity, sorted by descending score.
    fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorHit>, UpstreamError>;

    /// Remove every record whose payload matches `filter`.
    fn delete_where(&self, filter: &PayloadFilter) -> Result<usize, UpstreamError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub payload: serde_json::Value,
}

impl VectorHit {
    /// The `document_id` carried in the payload, if well-formed.
    pub fn document_id(&self) -> Option<Uuid> {
        self.payload
            .get(DOCUMENT_ID_KEY)
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

/// Payload field holding the owning document id.
pub const DOCUMENT_ID_KEY: &str = "document_id";

/// Equality match on one payload field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadFilter {
    pub key: String,
    pub value: String,
}

impl PayloadFilter {
    pub fn document(document_id: &Uuid) -> Self {
        Self {
            key: DOCUMENT_ID_KEY.to_string(),
            value: document_id.to_string(),
        }
    }

    pub fn matches(&self, payload: &serde_json::Value) -> bool {
        payload
            .get(&self.key)
            .and_then(|v| v.as_str())
            .is_some_and(|v| v == self.value)
    }
}

/// Payload stored alongside a document's embedding.
pub fn document_payload(document_id: &Uuid) -> serde_json::Value {
    serde_json::json!({ DOCUMENT_ID_KEY: document_id.to_string() })
}
