//! Document status workflow.
//!
//! | from      | to        | capability |
//! |-----------|-----------|------------|
//! | draft     | in_review | Submit     |
//! | in_review | approved  | Review     |
//! | in_review | rejected  | Review     |
//! | in_review | draft     | Review     |
//! | approved  | draft     | Submit     |
//! | rejected  | draft     | Submit     |
//!
//! Admins skip the capability check but not the table. The write is a
//! compare-and-swap on the validated status, so two concurrent requests
//! cannot both succeed from the same starting status.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::authorization::{Capability, Principal};
use crate::db::{self, Database, DatabaseError};
use crate::models::enums::DocumentStatus;
use crate::models::Document;

/// CAS attempts before giving up on a contended document.
const MAX_CAS_ATTEMPTS: u32 = 3;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Unknown document status: {0}")]
    UnknownStatus(String),

    #[error("Document not found: {0}")]
    NotFound(Uuid),

    #[error("Transition {from} -> {to} is not allowed")]
    InvalidTransition {
        from: DocumentStatus,
        to: DocumentStatus,
    },

    #[error("{principal} lacks the {capability:?} capability")]
    PermissionDenied {
        principal: String,
        capability: Capability,
    },

    #[error("Document {0} changed concurrently, retry")]
    Conflict(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Capability required for `from -> to`, or `None` when the table has no such edge.
pub fn required_capability(from: DocumentStatus, to: DocumentStatus) -> Option<Capability> {
    use DocumentStatus::*;
    match (from, to) {
        (Draft, InReview) => Some(Capability::Submit),
        (InReview, Approved) | (InReview, Rejected) | (InReview, Draft) => Some(Capability::Review),
        (Approved, Draft) | (Rejected, Draft) => Some(Capability::Submit),
        _ => None,
    }
}

/// Check `from -> to` for `principal` without touching storage.
pub fn validate_transition(
    from: DocumentStatus,
    to: DocumentStatus,
    principal: &Principal,
) -> Result<(), WorkflowError> {
    let capability =
        required_capability(from, to).ok_or(WorkflowError::InvalidTransition { from, to })?;
    if principal.has_capability(capability) {
        Ok(())
    } else {
        Err(WorkflowError::PermissionDenied {
            principal: principal.id.clone(),
            capability,
        })
    }
}

pub struct WorkflowEngine {
    db: Arc<Database>,
}

impl WorkflowEngine {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Move a document to `target` (`draft`, `in_review`/`inReview`, ...).
    pub fn change_status(
        &self,
        document_id: &Uuid,
        target: &str,
        principal: &Principal,
    ) -> Result<Document, WorkflowError> {
        let to = DocumentStatus::parse_loose(target)
            .ok_or_else(|| WorkflowError::UnknownStatus(target.to_string()))?;

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let document = self
                .db
                .with_conn(|conn| db::get_document(conn, document_id))?
                .ok_or(WorkflowError::NotFound(*document_id))?;
            let from = document.status;

            validate_transition(from, to, principal)?;

            let swapped = self.db.with_conn(|conn| {
                db::compare_and_set_status(
                    conn,
                    document_id,
                    from,
                    to,
                    &principal.id,
                    Utc::now().naive_utc(),
                )
            })?;

            if swapped {
                tracing::info!(
                    document_id = %document_id,
                    from = from.as_str(),
                    to = to.as_str(),
                    actor = %principal.id,
                    "Document status changed"
                );
                return self
                    .db
                    .with_conn(|conn| db::get_document(conn, document_id))?
                    .ok_or(WorkflowError::NotFound(*document_id));
            }

            tracing::debug!(
                document_id = %document_id,
                attempt,
                "Status changed concurrently, re-validating"
            );
        }

        Err(WorkflowError::Conflict(*document_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::Role;
    use crate::models::AccessControl;
    use crate::test_support::document;

    fn engine_with_document(status: DocumentStatus) -> (WorkflowEngine, Arc<Database>, Uuid) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mut doc = document("policy.txt", AccessControl::default());
        doc.status = status;
        db.with_conn(|conn| db::insert_document(conn, &doc)).unwrap();
        (WorkflowEngine::new(db.clone()), db, doc.id)
    }

    fn principal(role: Role) -> Principal {
        Principal::new(format!("{role}-user"), [role])
    }

    #[test]
    fn transition_table_is_exhaustive() {
        use DocumentStatus::*;
        let allowed = [
            (Draft, InReview),
            (InReview, Approved),
            (InReview, Rejected),
            (InReview, Draft),
            (Approved, Draft),
            (Rejected, Draft),
        ];
        for from in DocumentStatus::all() {
            for to in DocumentStatus::all() {
                assert_eq!(
                    required_capability(*from, *to).is_some(),
                    allowed.contains(&(*from, *to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn draft_to_approved_is_invalid() {
        let (engine, _, id) = engine_with_document(DocumentStatus::Draft);
        let err = engine
            .change_status(&id, "approved", &principal(Role::Admin))
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidTransition {
                from: DocumentStatus::Draft,
                to: DocumentStatus::Approved
            }
        ));
    }

    #[test]
    fn reviewer_approves_in_review_document() {
        let (engine, _, id) = engine_with_document(DocumentStatus::InReview);
        let doc = engine
            .change_status(&id, "approved", &principal(Role::Reviewer))
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Approved);
        assert_eq!(doc.status_changed_by.as_deref(), Some("reviewer-user"));
        assert!(doc.status_changed_at.is_some());
    }

    #[test]
    fn non_reviewer_cannot_approve() {
        let (engine, db, id) = engine_with_document(DocumentStatus::InReview);
        let err = engine
            .change_status(&id, "approved", &principal(Role::Submitter))
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::PermissionDenied {
                capability: Capability::Review,
                ..
            }
        ));
        let doc = db.with_conn(|conn| db::require_document(conn, &id)).unwrap();
        assert_eq!(doc.status, DocumentStatus::InReview);
    }

    #[test]
    fn submitter_sends_draft_to_review_with_camel_case_target() {
        let (engine, _, id) = engine_with_document(DocumentStatus::Draft);
        let doc = engine
            .change_status(&id, "inReview", &principal(Role::Submitter))
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::InReview);
    }

    #[test]
    fn admin_bypasses_capability() {
        let (engine, _, id) = engine_with_document(DocumentStatus::InReview);
        let doc = engine
            .change_status(&id, "rejected", &principal(Role::Admin))
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Rejected);
    }

    #[test]
    fn unknown_status_and_document() {
        let (engine, _, id) = engine_with_document(DocumentStatus::Draft);
        assert!(matches!(
            engine.change_status(&id, "archived", &principal(Role::Admin)),
            Err(WorkflowError::UnknownStatus(_))
        ));
        assert!(matches!(
            engine.change_status(&Uuid::new_v4(), "draft", &principal(Role::Admin)),
            Err(WorkflowError::NotFound(_))
        ));
    }

    #[test]
    fn stale_status_loses_the_race() {
        let (engine, db, id) = engine_with_document(DocumentStatus::InReview);
        engine
            .change_status(&id, "approved", &principal(Role::Reviewer))
            .unwrap();
        // A second reviewer acting on the same stale view re-validates against `approved`.
        let err = engine
            .change_status(&id, "rejected", &principal(Role::Reviewer))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));

        let swapped = db
            .with_conn(|conn| {
                db::compare_and_set_status(
                    conn,
                    &id,
                    DocumentStatus::InReview,
                    DocumentStatus::Rejected,
                    "late",
                    Utc::now().naive_utc(),
                )
            })
            .unwrap();
        assert!(!swapped);
    }
}
