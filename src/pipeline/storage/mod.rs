pub mod content;
pub mod embedder;
pub mod types;
pub mod vectordb;

use thiserror::Error;

pub use content::{content_key, FsContentStore, InMemoryContentStore};
pub use embedder::MockEmbedder;
pub use types::*;
pub use vectordb::{cosine_similarity, InMemoryVectorIndex, SqliteVectorIndex};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Content not found: {0}")]
    NotFound(String),

    #[error("Invalid content key: {0}")]
    InvalidKey(String),

    #[error("Content store lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// Whether repeating the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
