use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{DocumentStatus, IndexState, Role};

/// Role sets gating who may see and who may change a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    pub view_roles: BTreeSet<Role>,
    pub edit_roles: BTreeSet<Role>,
}

impl Default for AccessControl {
    /// Everyone may view; submitters and admins may edit.
    fn default() -> Self {
        Self {
            view_roles: Role::all().iter().copied().collect(),
            edit_roles: [Role::Submitter, Role::Admin].into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    pub size_bytes: u64,
    pub media_type: String,
    pub current_version_id: Option<Uuid>,
    pub status: DocumentStatus,
    pub index_state: IndexState,
    /// Reason of the last failed indexing run, cleared on success.
    pub index_error: Option<String>,
    /// Attempts used by the most recent indexing run.
    pub index_attempts: u32,
    pub access_control: AccessControl,
    pub created_by: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub status_changed_by: Option<String>,
    pub status_changed_at: Option<NaiveDateTime>,
}

/// One immutable snapshot of a document's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub id: Uuid,
    pub document_id: Uuid,
    pub version_number: u32,
    /// Key returned by the content store.
    pub content_key: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub media_type: String,
    pub uploaded_by: String,
    pub change_description: Option<String>,
    pub created_at: NaiveDateTime,
}
