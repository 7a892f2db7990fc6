//! Shared fixtures for unit tests.

use chrono::Utc;
use uuid::Uuid;

use crate::db::{self, Database};
use crate::models::enums::{DocumentStatus, IndexState};
use crate::models::{AccessControl, Document, Version};
use crate::pipeline::indexing::IndexJob;
use crate::pipeline::storage::{content_key, ContentStore};

/// A draft, never-indexed document with default access control.
pub fn document(name: &str, access_control: AccessControl) -> Document {
    let now = Utc::now().naive_utc();
    Document {
        id: Uuid::new_v4(),
        name: name.to_string(),
        size_bytes: 0,
        media_type: "text/plain".into(),
        current_version_id: None,
        status: DocumentStatus::Draft,
        index_state: IndexState::Pending,
        index_error: None,
        index_attempts: 0,
        access_control,
        created_by: "alice".into(),
        created_at: now,
        updated_at: now,
        status_changed_by: None,
        status_changed_at: None,
    }
}

/// Insert a document whose current version 1 holds `text`.
pub fn seed_document(
    db: &Database,
    content: &dyn ContentStore,
    name: &str,
    text: &str,
    media_type: &str,
    access_control: AccessControl,
) -> IndexJob {
    let doc = document(name, access_control);
    let now = Utc::now().naive_utc();
    let key = content_key(&doc.id, text.as_bytes());
    content.store(&key, text.as_bytes()).unwrap();

    let version = Version {
        id: Uuid::new_v4(),
        document_id: doc.id,
        version_number: 1,
        content_key: key,
        file_name: name.to_string(),
        size_bytes: text.len() as u64,
        media_type: media_type.to_string(),
        uploaded_by: "alice".into(),
        change_description: None,
        created_at: now,
    };

    db.with_conn(|conn| {
        db::insert_document(conn, &doc)?;
        db::insert_version(conn, &version)?;
        db::set_current_version(conn, &doc.id, &version, now)
    })
    .unwrap();

    IndexJob {
        document_id: doc.id,
        version_id: version.id,
    }
}

/// Store `text` as the next version of `document_id` and make it current.
pub fn add_version(
    db: &Database,
    content: &dyn ContentStore,
    document_id: &Uuid,
    text: &str,
) -> IndexJob {
    let now = Utc::now().naive_utc();
    let key = content_key(document_id, text.as_bytes());
    content.store(&key, text.as_bytes()).unwrap();

    db.with_conn(|conn| {
        let version = Version {
            id: Uuid::new_v4(),
            document_id: *document_id,
            version_number: db::next_version_number(conn, document_id)?,
            content_key: key,
            file_name: "policy.txt".into(),
            size_bytes: text.len() as u64,
            media_type: "text/plain".into(),
            uploaded_by: "alice".into(),
            change_description: None,
            created_at: now,
        };
        db::insert_version(conn, &version)?;
        db::set_current_version(conn, document_id, &version, now)?;
        Ok::<_, db::DatabaseError>(IndexJob {
            document_id: *document_id,
            version_id: version.id,
        })
    })
    .unwrap()
}

/// `seed_document` for a plain-text document readable by everyone.
pub fn seed_text(db: &Database, content: &dyn ContentStore, text: &str) -> IndexJob {
    seed_document(db, content, "policy.txt", text, "text/plain", AccessControl::default())
}
