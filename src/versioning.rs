//! Document and version lifecycle.
//!
//! A document always points at one of its own versions and mirrors that
//! version's file metadata. Every change of the current version resets
//! indexing to `pending` and schedules a pipeline run without waiting on it.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::authorization::{Capability, Principal};
use crate::db::{self, Database, DatabaseError};
use crate::models::enums::{DocumentStatus, IndexState};
use crate::models::{AccessControl, Document, Version};
use crate::pipeline::indexing::{IndexJob, IndexScheduler};
use crate::pipeline::storage::{content_key, ContentStore, PayloadFilter, StorageError, VectorIndex};

#[derive(Error, Debug)]
pub enum VersionStoreError {
    #[error("Invalid upload: {0}")]
    Validation(String),

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Content storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl From<DatabaseError> for VersionStoreError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound { entity_type, id } => Self::NotFound { entity_type, id },
            other => Self::Database(other),
        }
    }
}

fn not_found(entity_type: &str, id: &Uuid) -> VersionStoreError {
    VersionStoreError::NotFound {
        entity_type: entity_type.to_string(),
        id: id.to_string(),
    }
}

/// Uploaded file content plus the metadata that travels with it.
#[derive(Debug, Clone)]
pub struct NewContent {
    pub file_name: String,
    /// Guessed from the file name when absent.
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
    pub change_description: Option<String>,
}

impl NewContent {
    fn validate(&self) -> Result<(), VersionStoreError> {
        if self.file_name.trim().is_empty() {
            return Err(VersionStoreError::Validation("file name is required".into()));
        }
        if self.bytes.is_empty() {
            return Err(VersionStoreError::Validation("content is empty".into()));
        }
        Ok(())
    }

    fn resolved_media_type(&self) -> String {
        match self.media_type.as_deref().map(str::trim) {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => mime_guess::from_path(&self.file_name)
                .first_or_octet_stream()
                .to_string(),
        }
    }

    fn to_version(&self, document_id: Uuid, number: u32, key: String, uploader: &str) -> Version {
        Version {
            id: Uuid::new_v4(),
            document_id,
            version_number: number,
            content_key: key,
            file_name: self.file_name.trim().to_string(),
            size_bytes: self.bytes.len() as u64,
            media_type: self.resolved_media_type(),
            uploaded_by: uploader.to_string(),
            change_description: self
                .change_description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            created_at: Utc::now().naive_utc(),
        }
    }
}

pub struct VersionStore {
    db: Arc<Database>,
    content: Arc<dyn ContentStore>,
    index: Arc<dyn VectorIndex>,
    scheduler: Arc<dyn IndexScheduler>,
}

impl VersionStore {
    pub fn new(
        db: Arc<Database>,
        content: Arc<dyn ContentStore>,
        index: Arc<dyn VectorIndex>,
        scheduler: Arc<dyn IndexScheduler>,
    ) -> Self {
        Self {
            db,
            content,
            index,
            scheduler,
        }
    }

    /// Create a document on first upload (`document_id == None`), otherwise
    /// add a version to it. Returns the document as it now stands.
    pub fn upload_version(
        &self,
        document_id: Option<Uuid>,
        content: NewContent,
        principal: &Principal,
        access_control: Option<AccessControl>,
    ) -> Result<Document, VersionStoreError> {
        match document_id {
            None => self.create_document(content, principal, access_control),
            Some(id) => {
                self.create_version(&id, content, principal)?;
                self.load(&id)
            }
        }
    }

    /// Insert a document together with its version 1.
    pub fn create_document(
        &self,
        content: NewContent,
        principal: &Principal,
        access_control: Option<AccessControl>,
    ) -> Result<Document, VersionStoreError> {
        content.validate()?;
        if !principal.has_capability(Capability::Submit) {
            return Err(VersionStoreError::PermissionDenied(
                "creating documents requires the submitter role".into(),
            ));
        }
        let access_control = access_control.unwrap_or_default();
        if access_control.view_roles.is_empty() {
            return Err(VersionStoreError::Validation(
                "access control must allow at least one viewer role".into(),
            ));
        }

        let document_id = Uuid::new_v4();
        let key = self
            .content
            .store(&content_key(&document_id, &content.bytes), &content.bytes)?;
        let version = content.to_version(document_id, 1, key, &principal.id);
        let now = version.created_at;

        let document = Document {
            id: document_id,
            name: version.file_name.clone(),
            size_bytes: version.size_bytes,
            media_type: version.media_type.clone(),
            current_version_id: None,
            status: DocumentStatus::Draft,
            index_state: IndexState::Pending,
            index_error: None,
            index_attempts: 0,
            access_control,
            created_by: principal.id.clone(),
            created_at: now,
            updated_at: now,
            status_changed_by: None,
            status_changed_at: None,
        };

        let inserted = self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            db::insert_document(&tx, &document)?;
            db::insert_version(&tx, &version)?;
            db::set_current_version(&tx, &document_id, &version, now)?;
            tx.commit()?;
            Ok::<_, DatabaseError>(())
        });
        if let Err(e) = inserted {
            self.discard_content(&version.content_key);
            return Err(e.into());
        }

        tracing::info!(
            document_id = %document_id,
            version_id = %version.id,
            size_bytes = version.size_bytes,
            media_type = %version.media_type,
            "Document created"
        );
        self.schedule(document_id, version.id);
        self.load(&document_id)
    }

    /// Append a version (`max + 1`) and make it current.
    pub fn create_version(
        &self,
        document_id: &Uuid,
        content: NewContent,
        principal: &Principal,
    ) -> Result<Version, VersionStoreError> {
        content.validate()?;
        let document = self.load(document_id)?;
        self.require_edit(&document, principal)?;

        let key = content_key(document_id, &content.bytes);
        // Identical bytes share a key with an earlier version; keep that blob on failure.
        let key_in_use = self
            .db
            .with_conn(|conn| db::list_versions(conn, document_id))?
            .iter()
            .any(|v| v.content_key == key);
        let key = self.content.store(&key, &content.bytes)?;

        let result = self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let number = db::next_version_number(&tx, document_id)?;
            let version = content.to_version(*document_id, number, key.clone(), &principal.id);
            db::insert_version(&tx, &version)?;
            db::set_current_version(&tx, document_id, &version, version.created_at)?;
            tx.commit()?;
            Ok::<_, DatabaseError>(version)
        });

        let version = match result {
            Ok(version) => version,
            Err(e) => {
                if !key_in_use {
                    self.discard_content(&key);
                }
                return Err(e.into());
            }
        };

        tracing::info!(
            document_id = %document_id,
            version_id = %version.id,
            version_number = version.version_number,
            "Version created"
        );
        self.schedule(*document_id, version.id);
        Ok(version)
    }

    /// Point the document at one of its existing versions. Re-indexes even
    /// when the version is already current.
    pub fn set_current_version(
        &self,
        document_id: &Uuid,
        version_id: &Uuid,
        principal: &Principal,
    ) -> Result<Document, VersionStoreError> {
        let document = self.load(document_id)?;
        self.require_edit(&document, principal)?;

        self.db.with_conn(|conn| {
            let version = db::get_version(conn, version_id)?
                .filter(|v| v.document_id == *document_id)
                .ok_or_else(|| not_found("Version", version_id))?;
            db::set_current_version(conn, document_id, &version, Utc::now().naive_utc())?;
            Ok::<_, VersionStoreError>(())
        })?;

        tracing::info!(document_id = %document_id, version_id = %version_id, "Current version set");
        self.schedule(*document_id, *version_id);
        self.load(document_id)
    }

    /// Versions of a document, newest first.
    pub fn list_versions(
        &self,
        document_id: &Uuid,
        principal: &Principal,
    ) -> Result<Vec<Version>, VersionStoreError> {
        let document = self.load(document_id)?;
        self.require_view(&document, principal)?;
        Ok(self.db.with_conn(|conn| db::list_versions(conn, document_id))?)
    }

    pub fn get_document(
        &self,
        document_id: &Uuid,
        principal: &Principal,
    ) -> Result<Document, VersionStoreError> {
        let document = self.load(document_id)?;
        self.require_view(&document, principal)?;
        Ok(document)
    }

    /// Documents the caller may view, oldest first.
    pub fn list_documents(&self, principal: &Principal) -> Result<Vec<Document>, VersionStoreError> {
        let documents = self.db.with_conn(db::list_documents)?;
        Ok(documents
            .into_iter()
            .filter(|d| principal.can_view(&d.access_control))
            .collect())
    }

    /// Delete a document with its versions, suggested records, content and
    /// vector. Content and vector removal are best effort.
    pub fn delete_document(
        &self,
        document_id: &Uuid,
        principal: &Principal,
    ) -> Result<(), VersionStoreError> {
        let document = self.load(document_id)?;
        self.require_edit(&document, principal)?;

        let keys: BTreeSet<String> = self
            .db
            .with_conn(|conn| {
                let versions = db::list_versions(conn, document_id)?;
                db::delete_document(conn, document_id)?;
                Ok::<_, DatabaseError>(versions)
            })?
            .into_iter()
            .map(|v| v.content_key)
            .collect();

        for key in &keys {
            self.discard_content(key);
        }
        if let Err(e) = self.index.delete_where(&PayloadFilter::document(document_id)) {
            tracing::warn!(document_id = %document_id, error = %e, "Vector removal failed");
        }

        tracing::info!(document_id = %document_id, blobs = keys.len(), "Document deleted");
        Ok(())
    }

    fn load(&self, document_id: &Uuid) -> Result<Document, VersionStoreError> {
        self.db
            .with_conn(|conn| db::get_document(conn, document_id))?
            .ok_or_else(|| not_found("Document", document_id))
    }

    fn require_view(&self, document: &Document, principal: &Principal) -> Result<(), VersionStoreError> {
        if principal.can_view(&document.access_control) {
            Ok(())
        } else {
            Err(VersionStoreError::PermissionDenied(format!(
                "{} may not view document {}",
                principal.id, document.id
            )))
        }
    }

    fn require_edit(&self, document: &Document, principal: &Principal) -> Result<(), VersionStoreError> {
        if principal.can_edit(&document.access_control) {
            Ok(())
        } else {
            Err(VersionStoreError::PermissionDenied(format!(
                "{} may not edit document {}",
                principal.id, document.id
            )))
        }
    }

    fn schedule(&self, document_id: Uuid, version_id: Uuid) {
        self.scheduler.schedule(IndexJob {
            document_id,
            version_id,
        });
    }

    fn discard_content(&self, key: &str) {
        if let Err(e) = self.content.delete(key) {
            tracing::warn!(content_key = %key, error = %e, "Content cleanup failed");
        }
    }
}
