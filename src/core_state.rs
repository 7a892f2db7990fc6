//! Transport-agnostic application state.
//!
//! `CoreState` owns every service handle and is the single entry point for
//! the HTTP layer. Services are built once at startup from an [`AppConfig`]
//! (or from explicit collaborators in tests) and shared through `Arc`.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use uuid::Uuid;

use crate::authorization::{Capability, Principal};
use crate::config::{self, AppConfig};
use crate::db::{self, Database, DatabaseError};
use crate::models::enums::DocumentStatus;
use crate::models::{AccessControl, Document, Risk, Rule, Version};
use crate::pipeline::batch::{self, BatchError, BatchOptions, BatchStatusEvent, BatchSummary, CancelToken};
use crate::pipeline::extraction::{PlainTextExtractor, StoredTextSource, TextExtractor, TextSourceError};
use crate::pipeline::indexing::{IndexingPipeline, IndexingQueue, RetryPolicy};
use crate::pipeline::ollama::OllamaClient;
use crate::pipeline::search::{DocumentHit, SearchEngine, SearchError, SearchQuery};
use crate::pipeline::storage::{
    ContentStore, EmbeddingModel, FsContentStore, SqliteVectorIndex, StorageError, VectorIndex,
};
use crate::pipeline::suggestion::{
    CompletionModel, MergePolicy, SuggestionEngine, SuggestionError, SuggestionReport,
};
use crate::pipeline::UpstreamError;
use crate::versioning::{NewContent, VersionStore, VersionStoreError};
use crate::workflow::{WorkflowEngine, WorkflowError};

/// Errors surfaced by [`CoreState`] operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Transition {from} -> {to} is not allowed")]
    InvalidTransition {
        from: DocumentStatus,
        to: DocumentStatus,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream service failed: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Content storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(DatabaseError),

    #[error("Internal lock poisoned")]
    LockPoisoned,
}

impl CoreError {
    fn not_found(entity_type: &str, id: &Uuid) -> Self {
        Self::NotFound {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<DatabaseError> for CoreError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound { entity_type, id } => Self::NotFound { entity_type, id },
            DatabaseError::LockPoisoned => Self::LockPoisoned,
            other => Self::Database(other),
        }
    }
}

impl From<VersionStoreError> for CoreError {
    fn from(e: VersionStoreError) -> Self {
        match e {
            VersionStoreError::Validation(msg) => Self::Validation(msg),
            VersionStoreError::NotFound { entity_type, id } => Self::NotFound { entity_type, id },
            VersionStoreError::PermissionDenied(msg) => Self::PermissionDenied(msg),
            VersionStoreError::Storage(e) => Self::Storage(e),
            VersionStoreError::Database(e) => e.into(),
        }
    }
}

impl From<WorkflowError> for CoreError {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::UnknownStatus(_) => Self::Validation(e.to_string()),
            WorkflowError::NotFound(id) => Self::not_found("Document", &id),
            WorkflowError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
            WorkflowError::PermissionDenied { .. } => Self::PermissionDenied(e.to_string()),
            WorkflowError::Conflict(_) => Self::Conflict(e.to_string()),
            WorkflowError::Database(e) => e.into(),
        }
    }
}

impl From<SearchError> for CoreError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::Validation(msg) => Self::Validation(msg),
            SearchError::Upstream(e) => Self::Upstream(e),
            SearchError::Database(e) => e.into(),
        }
    }
}

impl From<SuggestionError> for CoreError {
    fn from(e: SuggestionError) -> Self {
        match e {
            SuggestionError::Text(TextSourceError::DocumentNotFound(id)) => {
                Self::not_found("Document", &id)
            }
            SuggestionError::Text(TextSourceError::NoCurrentVersion(id)) => {
                Self::Validation(format!("document {id} has no current version"))
            }
            SuggestionError::Text(TextSourceError::Storage(e)) => Self::Storage(e),
            SuggestionError::Text(TextSourceError::Database(e)) | SuggestionError::Database(e) => {
                e.into()
            }
        }
    }
}

impl From<BatchError> for CoreError {
    fn from(e: BatchError) -> Self {
        match e {
            BatchError::Enumeration(e) => e.into(),
        }
    }
}

/// External capabilities the core depends on.
pub struct Collaborators {
    pub content: Arc<dyn ContentStore>,
    pub extractor: Arc<dyn TextExtractor>,
    pub embedder: Arc<dyn EmbeddingModel>,
    pub completion: Arc<dyn CompletionModel>,
    pub index: Arc<dyn VectorIndex>,
}

/// Rules and risks suggested for one document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSuggestions {
    pub document_id: Uuid,
    pub rules: Vec<Rule>,
    pub risks: Vec<Risk>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub database: bool,
    pub batch_running: bool,
}

pub struct CoreState {
    db: Arc<Database>,
    versions: VersionStore,
    workflow: WorkflowEngine,
    suggestions: SuggestionEngine,
    search: SearchEngine,
    queue: Arc<IndexingQueue>,
    merge_policy: MergePolicy,
    batch_concurrency: usize,
    /// Cancel handle of the batch run in progress, if any.
    active_batch: Mutex<Option<CancelToken>>,
}

impl CoreState {
    /// Build the production stack: SQLite under the data directory,
    /// filesystem content, Ollama for completion and embedding.
    pub fn from_config(config: &AppConfig) -> Result<Self, CoreError> {
        let db = Arc::new(Database::open(&config::database_path(&config.data_dir))?);
        let content = Arc::new(FsContentStore::new(config::content_dir(&config.data_dir))?);
        let ollama = Arc::new(OllamaClient::new(
            &config.ollama_url,
            config.upstream_timeout,
            &config.completion_model,
            &config.embedding_model,
        )?);
        let index = Arc::new(SqliteVectorIndex::new(db.clone()));

        tracing::info!(
            data_dir = %config.data_dir.display(),
            ollama = %ollama.base_url(),
            completion_model = %config.completion_model,
            embedding_model = %config.embedding_model,
            "Core services configured"
        );

        let collaborators = Collaborators {
            content,
            extractor: Arc::new(PlainTextExtractor),
            embedder: ollama.clone(),
            completion: ollama,
            index,
        };
        Ok(Self::assemble(db, collaborators, config))
    }

    /// Wire services over the given collaborators and start the indexing workers.
    pub fn assemble(db: Arc<Database>, collaborators: Collaborators, config: &AppConfig) -> Self {
        let Collaborators {
            content,
            extractor,
            embedder,
            completion,
            index,
        } = collaborators;

        let retry = RetryPolicy {
            max_attempts: config.index_max_attempts,
            initial_backoff: config.index_initial_backoff,
            ..RetryPolicy::default()
        };
        let pipeline = Arc::new(IndexingPipeline::new(
            db.clone(),
            content.clone(),
            extractor.clone(),
            embedder.clone(),
            index.clone(),
            retry,
        ));
        let queue = Arc::new(IndexingQueue::start(pipeline, config.index_workers));

        let text_source = Arc::new(StoredTextSource::new(db.clone(), content.clone(), extractor));

        Self {
            versions: VersionStore::new(db.clone(), content, index.clone(), queue.clone()),
            workflow: WorkflowEngine::new(db.clone()),
            suggestions: SuggestionEngine::new(
                db.clone(),
                text_source,
                completion,
                config.max_prompt_chars,
            ),
            search: SearchEngine::new(db.clone(), embedder, index, config.search_max_top_k),
            db,
            queue,
            merge_policy: config.merge_policy,
            batch_concurrency: config.batch_concurrency,
            active_batch: Mutex::new(None),
        }
    }

    // ── Documents and versions ──────────────────────────────

    /// Create a document (no `document_id`) or add a version to one.
    pub fn upload_version(
        &self,
        document_id: Option<Uuid>,
        content: NewContent,
        principal: &Principal,
        access_control: Option<AccessControl>,
    ) -> Result<Document, CoreError> {
        Ok(self
            .versions
            .upload_version(document_id, content, principal, access_control)?)
    }

    pub fn set_current_version(
        &self,
        document_id: &Uuid,
        version_id: &Uuid,
        principal: &Principal,
    ) -> Result<Document, CoreError> {
        Ok(self
            .versions
            .set_current_version(document_id, version_id, principal)?)
    }

    pub fn get_document(&self, document_id: &Uuid, principal: &Principal) -> Result<Document, CoreError> {
        Ok(self.versions.get_document(document_id, principal)?)
    }

    pub fn list_documents(&self, principal: &Principal) -> Result<Vec<Document>, CoreError> {
        Ok(self.versions.list_documents(principal)?)
    }

    pub fn list_versions(
        &self,
        document_id: &Uuid,
        principal: &Principal,
    ) -> Result<Vec<Version>, CoreError> {
        Ok(self.versions.list_versions(document_id, principal)?)
    }

    pub fn delete_document(&self, document_id: &Uuid, principal: &Principal) -> Result<(), CoreError> {
        Ok(self.versions.delete_document(document_id, principal)?)
    }

    // ── Workflow ────────────────────────────────────────────

    pub fn change_status(
        &self,
        document_id: &Uuid,
        target: &str,
        principal: &Principal,
    ) -> Result<Document, CoreError> {
        // Callers who cannot see the document learn nothing about its status.
        self.versions.get_document(document_id, principal)?;
        Ok(self.workflow.change_status(document_id, target, principal)?)
    }

    // ── Suggestion ──────────────────────────────────────────

    /// Suggest rules and risks for one document. `overwrite` replaces
    /// human-edited records; otherwise the configured policy applies.
    pub fn suggest_entities(
        &self,
        document_id: &Uuid,
        overwrite: bool,
        principal: &Principal,
    ) -> Result<SuggestionReport, CoreError> {
        let document = self.versions.get_document(document_id, principal)?;
        if !principal.can_edit(&document.access_control) {
            return Err(CoreError::PermissionDenied(format!(
                "{} may not edit document {document_id}",
                principal.id
            )));
        }
        let policy = if overwrite {
            MergePolicy::Overwrite
        } else {
            self.merge_policy
        };
        Ok(self.suggestions.suggest_for_document(document_id, policy)?)
    }

    /// Stored rules and risks whose source is the document.
    pub fn list_suggestions(
        &self,
        document_id: &Uuid,
        principal: &Principal,
    ) -> Result<DocumentSuggestions, CoreError> {
        self.versions.get_document(document_id, principal)?;
        let (rules, risks) = self.db.with_conn(|conn| {
            let rules = db::list_rules_for_document(conn, document_id)?;
            let risks = db::list_risks_for_document(conn, document_id)?;
            Ok::<_, DatabaseError>((rules, risks))
        })?;
        Ok(DocumentSuggestions {
            document_id: *document_id,
            rules,
            risks,
        })
    }

    /// Run suggestion over every eligible document. One run at a time;
    /// an empty `statuses` means all documents.
    pub fn run_batch_suggestion(
        &self,
        statuses: Vec<DocumentStatus>,
        principal: &Principal,
        progress_fn: Option<&(dyn Fn(BatchStatusEvent) + Sync)>,
    ) -> Result<BatchSummary, CoreError> {
        if !principal.has_capability(Capability::Administer) {
            return Err(CoreError::PermissionDenied(
                "batch suggestion requires the admin role".into(),
            ));
        }

        let cancel = CancelToken::new();
        {
            let mut active = self.active_batch.lock().map_err(|_| CoreError::LockPoisoned)?;
            if active.is_some() {
                return Err(CoreError::Conflict("a batch run is already in progress".into()));
            }
            *active = Some(cancel.clone());
        }

        let options = BatchOptions {
            statuses,
            concurrency: self.batch_concurrency,
            merge_policy: self.merge_policy,
        };
        tracing::info!(actor = %principal.id, "Batch suggestion requested");
        let result = batch::run_batch(&self.db, &self.suggestions, &options, &cancel, progress_fn);

        if let Ok(mut active) = self.active_batch.lock() {
            *active = None;
        }
        Ok(result?)
    }

    /// Stop the running batch from starting new documents. Returns whether
    /// a run was in progress.
    pub fn cancel_batch(&self, principal: &Principal) -> Result<bool, CoreError> {
        if !principal.has_capability(Capability::Administer) {
            return Err(CoreError::PermissionDenied(
                "cancelling a batch requires the admin role".into(),
            ));
        }
        let active = self.active_batch.lock().map_err(|_| CoreError::LockPoisoned)?;
        match active.as_ref() {
            Some(token) => {
                token.cancel();
                tracing::info!(actor = %principal.id, "Batch suggestion cancel requested");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ── Search ──────────────────────────────────────────────

    pub fn search(&self, query: &SearchQuery, principal: &Principal) -> Result<Vec<DocumentHit>, CoreError> {
        Ok(self.search.search(query, principal)?)
    }

    // ── Lifecycle ───────────────────────────────────────────

    pub fn health(&self) -> HealthStatus {
        let database = self
            .db
            .with_conn(|conn| db::count_tables(conn))
            .map(|n| n > 0)
            .unwrap_or(false);
        let batch_running = self
            .active_batch
            .lock()
            .map(|active| active.is_some())
            .unwrap_or(false);
        HealthStatus {
            status: if database { "ok" } else { "degraded" },
            version: config::APP_VERSION,
            database,
            batch_running,
        }
    }

    /// Stop accepting indexing jobs and wait for in-flight runs.
    pub fn shutdown(&self) {
        if let Ok(active) = self.active_batch.lock() {
            if let Some(token) = active.as_ref() {
                token.cancel();
            }
        }
        self.queue.shutdown();
        tracing::info!("Core services stopped");
    }
}
