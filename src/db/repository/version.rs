use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::Version;

const VERSION_COLUMNS: &str = "id, document_id, version_number, content_key, file_name,
    size_bytes, media_type, uploaded_by, change_description, created_at";

pub fn insert_version(conn: &Connection, version: &Version) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO versions (id, document_id, version_number, content_key, file_name,
         size_bytes, media_type, uploaded_by, change_description, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            version.id.to_string(),
            version.document_id.to_string(),
            version.version_number,
            version.content_key,
            version.file_name,
            version.size_bytes as i64,
            version.media_type,
            version.uploaded_by,
            version.change_description,
            version.created_at,
        ],
    )?;
    Ok(())
}

/// `max(existing) + 1`, or 1 for a document without versions.
pub fn next_version_number(conn: &Connection, document_id: &Uuid) -> Result<u32, DatabaseError> {
    let next = conn.query_row(
        "SELECT COALESCE(MAX(version_number), 0) + 1 FROM versions WHERE document_id = ?1",
        params![document_id.to_string()],
        |row| row.get::<_, u32>(0),
    )?;
    Ok(next)
}

pub fn get_version(conn: &Connection, id: &Uuid) -> Result<Option<Version>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VERSION_COLUMNS} FROM versions WHERE id = ?1"
    ))?;

    match stmt.query_row(params![id.to_string()], read_version_row) {
        Ok(row) => Ok(Some(version_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Versions of a document, newest first.
pub fn list_versions(conn: &Connection, document_id: &Uuid) -> Result<Vec<Version>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VERSION_COLUMNS} FROM versions WHERE document_id = ?1
         ORDER BY version_number DESC"
    ))?;
    let rows = stmt.query_map(params![document_id.to_string()], read_version_row)?;

    let mut versions = Vec::new();
    for row in rows {
        versions.push(version_from_row(row?)?);
    }
    Ok(versions)
}

struct VersionRow {
    id: String,
    document_id: String,
    version_number: u32,
    content_key: String,
    file_name: String,
    size_bytes: i64,
    media_type: String,
    uploaded_by: String,
    change_description: Option<String>,
    created_at: NaiveDateTime,
}

fn read_version_row(row: &Row<'_>) -> rusqlite::Result<VersionRow> {
    Ok(VersionRow {
        id: row.get(0)?,
        document_id: row.get(1)?,
        version_number: row.get(2)?,
        content_key: row.get(3)?,
        file_name: row.get(4)?,
        size_bytes: row.get(5)?,
        media_type: row.get(6)?,
        uploaded_by: row.get(7)?,
        change_description: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn version_from_row(row: VersionRow) -> Result<Version, DatabaseError> {
    Ok(Version {
        id: parse_uuid(&row.id)?,
        document_id: parse_uuid(&row.document_id)?,
        version_number: row.version_number,
        content_key: row.content_key,
        file_name: row.file_name,
        size_bytes: row.size_bytes.max(0) as u64,
        media_type: row.media_type,
        uploaded_by: row.uploaded_by,
        change_description: row.change_description,
        created_at: row.created_at,
    })
}
