pub mod sanitize;
pub mod text_only;

pub use sanitize::*;
pub use text_only::PlainTextExtractor;

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::db::{self, Database, DatabaseError};
use crate::models::Version;
use crate::pipeline::storage::{ContentStore, StorageError};

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Unsupported format for extraction: {0}")]
    UnsupportedFormat(String),

    #[error("Text encoding error: {0}")]
    EncodingError(String),
}

/// Converts stored bytes into plain text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], media_type: &str) -> Result<String, ExtractionError>;
}

/// Extract text, degrading to a lossy UTF-8 decode when the extractor
/// cannot handle the format. Never fails.
pub fn extract_with_fallback(
    extractor: &dyn TextExtractor,
    bytes: &[u8],
    media_type: &str,
) -> String {
    match extractor.extract(bytes, media_type) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(media_type, error = %e, "Falling back to raw text decode");
            sanitize_extracted_text(&String::from_utf8_lossy(bytes))
        }
    }
}

/// Fetch a version's bytes and extract its text.
pub fn extract_version_text(
    content: &dyn ContentStore,
    extractor: &dyn TextExtractor,
    version: &Version,
) -> Result<String, StorageError> {
    let bytes = content.fetch(&version.content_key)?;
    Ok(extract_with_fallback(extractor, &bytes, &version.media_type))
}

#[derive(Error, Debug)]
pub enum TextSourceError {
    #[error("Document not found: {0}")]
    DocumentNotFound(Uuid),

    #[error("Document {0} has no current version")]
    NoCurrentVersion(Uuid),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Supplies the extracted text of a document's current version.
pub trait DocumentTextSource: Send + Sync {
    fn document_text(&self, document_id: &Uuid) -> Result<String, TextSourceError>;
}

/// Reads the current version from the store and extracts its text.
pub struct StoredTextSource {
    db: Arc<Database>,
    content: Arc<dyn ContentStore>,
    extractor: Arc<dyn TextExtractor>,
}

impl StoredTextSource {
    pub fn new(
        db: Arc<Database>,
        content: Arc<dyn ContentStore>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            db,
            content,
            extractor,
        }
    }
}

impl DocumentTextSource for StoredTextSource {
    fn document_text(&self, document_id: &Uuid) -> Result<String, TextSourceError> {
        let version = self.db.with_conn(|conn| -> Result<Version, TextSourceError> {
            let doc = db::get_document(conn, document_id)?
                .ok_or(TextSourceError::DocumentNotFound(*document_id))?;
            let version_id = doc
                .current_version_id
                .ok_or(TextSourceError::NoCurrentVersion(*document_id))?;
            db::get_version(conn, &version_id)?
                .ok_or(TextSourceError::NoCurrentVersion(*document_id))
        })?;

        Ok(extract_version_text(
            self.content.as_ref(),
            self.extractor.as_ref(),
            &version,
        )?)
    }
}
