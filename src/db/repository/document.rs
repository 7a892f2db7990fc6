use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::{parse_uuid, roles_from_json, roles_to_json};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

const DOCUMENT_COLUMNS: &str = "id, name, size_bytes, media_type, current_version_id, status,
    index_state, index_error, index_attempts, view_roles, edit_roles, created_by,
    created_at, updated_at, status_changed_by, status_changed_at";

pub fn insert_document(conn: &Connection, doc: &Document) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO documents (id, name, size_bytes, media_type, current_version_id, status,
         index_state, index_error, index_attempts, view_roles, edit_roles, created_by,
         created_at, updated_at, status_changed_by, status_changed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            doc.id.to_string(),
            doc.name,
            doc.size_bytes as i64,
            doc.media_type,
            doc.current_version_id.map(|id| id.to_string()),
            doc.status.as_str(),
            doc.index_state.as_str(),
            doc.index_error,
            doc.index_attempts,
            roles_to_json(&doc.access_control.view_roles)?,
            roles_to_json(&doc.access_control.edit_roles)?,
            doc.created_by,
            doc.created_at,
            doc.updated_at,
            doc.status_changed_by,
            doc.status_changed_at,
        ],
    )?;
    Ok(())
}

pub fn get_document(conn: &Connection, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"
    ))?;

    let result = stmt.query_row(params![id.to_string()], read_document_row);

    match result {
        Ok(row) => Ok(Some(document_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Like [`get_document`], but a missing row is an error.
pub fn require_document(conn: &Connection, id: &Uuid) -> Result<Document, DatabaseError> {
    get_document(conn, id)?.ok_or_else(|| DatabaseError::not_found("Document", id))
}

/// All documents, most recently updated first.
pub fn list_documents(conn: &Connection) -> Result<Vec<Document>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY updated_at DESC"
    ))?;
    let rows = stmt.query_map([], read_document_row)?;

    let mut docs = Vec::new();
    for row in rows {
        docs.push(document_from_row(row?)?);
    }
    Ok(docs)
}

/// Ids of documents in any of the given statuses, oldest first.
/// An empty status list selects every document.
pub fn list_document_ids_by_status(
    conn: &Connection,
    statuses: &[DocumentStatus],
) -> Result<Vec<Uuid>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT id, status FROM documents ORDER BY created_at ASC, id ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut ids = Vec::new();
    for row in rows {
        let (id, status) = row?;
        let status = DocumentStatus::from_str(&status)?;
        if statuses.is_empty() || statuses.contains(&status) {
            ids.push(parse_uuid(&id)?);
        }
    }
    Ok(ids)
}

/// Point the document at `version`, mirror its metadata and reset indexing.
pub fn set_current_version(
    conn: &Connection,
    document_id: &Uuid,
    version: &Version,
    now: NaiveDateTime,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET current_version_id = ?2, name = ?3, size_bytes = ?4,
         media_type = ?5, index_state = 'pending', index_error = NULL, index_attempts = 0,
         updated_at = ?6
         WHERE id = ?1",
        params![
            document_id.to_string(),
            version.id.to_string(),
            version.file_name,
            version.size_bytes as i64,
            version.media_type,
            now,
        ],
    )?;
    if rows == 0 {
        return Err(DatabaseError::not_found("Document", document_id));
    }
    Ok(())
}

/// Write `to` only if the stored status is still `from`.
/// Returns false when another writer changed the status first.
pub fn compare_and_set_status(
    conn: &Connection,
    document_id: &Uuid,
    from: DocumentStatus,
    to: DocumentStatus,
    actor: &str,
    now: NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET status = ?3, status_changed_by = ?4, status_changed_at = ?5,
         updated_at = ?5
         WHERE id = ?1 AND status = ?2",
        params![document_id.to_string(), from.as_str(), to.as_str(), actor, now],
    )?;
    Ok(rows == 1)
}

/// Update indexing state for `version_id`. A no-op (returns false) once the
/// document has moved on to another version.
pub fn update_index_state(
    conn: &Connection,
    document_id: &Uuid,
    version_id: &Uuid,
    state: IndexState,
    attempts: u32,
    error: Option<&str>,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET index_state = ?3, index_attempts = ?4, index_error = ?5
         WHERE id = ?1 AND current_version_id = ?2",
        params![
            document_id.to_string(),
            version_id.to_string(),
            state.as_str(),
            attempts,
            error,
        ],
    )?;
    Ok(rows == 1)
}

/// Delete a document; versions, rules and risks cascade.
pub fn delete_document(conn: &Connection, document_id: &Uuid) -> Result<(), DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM documents WHERE id = ?1",
        params![document_id.to_string()],
    )?;
    if deleted == 0 {
        return Err(DatabaseError::not_found("Document", document_id));
    }
    Ok(())
}

// Internal row type for Document mapping
struct DocumentRow {
    id: String,
    name: String,
    size_bytes: i64,
    media_type: String,
    current_version_id: Option<String>,
    status: String,
    index_state: String,
    index_error: Option<String>,
    index_attempts: u32,
    view_roles: String,
    edit_roles: String,
    created_by: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
    status_changed_by: Option<String>,
    status_changed_at: Option<NaiveDateTime>,
}

fn read_document_row(row: &Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        id: row.get(0)?,
        name: row.get(1)?,
        size_bytes: row.get(2)?,
        media_type: row.get(3)?,
        current_version_id: row.get(4)?,
        status: row.get(5)?,
        index_state: row.get(6)?,
        index_error: row.get(7)?,
        index_attempts: row.get(8)?,
        view_roles: row.get(9)?,
        edit_roles: row.get(10)?,
        created_by: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
        status_changed_by: row.get(14)?,
        status_changed_at: row.get(15)?,
    })
}

fn document_from_row(row: DocumentRow) -> Result<Document, DatabaseError> {
    let view_roles: BTreeSet<Role> = roles_from_json(&row.view_roles)?;
    let edit_roles: BTreeSet<Role> = roles_from_json(&row.edit_roles)?;

    Ok(Document {
        id: parse_uuid(&row.id)?,
        name: row.name,
        size_bytes: row.size_bytes.max(0) as u64,
        media_type: row.media_type,
        current_version_id: row.current_version_id.as_deref().map(parse_uuid).transpose()?,
        status: DocumentStatus::from_str(&row.status)?,
        index_state: IndexState::from_str(&row.index_state)?,
        index_error: row.index_error,
        index_attempts: row.index_attempts,
        access_control: AccessControl {
            view_roles,
            edit_roles,
        },
        created_by: row.created_by,
        created_at: row.created_at,
        updated_at: row.updated_at,
        status_changed_by: row.status_changed_by,
        status_changed_at: row.status_changed_at,
    })
}
