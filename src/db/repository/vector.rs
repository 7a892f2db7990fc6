use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

use crate::db::DatabaseError;

/// A stored embedding row.
#[derive(Debug, Clone)]
pub struct VectorRow {
    pub id: String,
    pub embedding: Vec<f32>,
    pub payload: serde_json::Value,
}

/// Insert or replace the embedding stored under `id`.
pub fn upsert_vector_record(
    conn: &Connection,
    id: &str,
    embedding: &[f32],
    payload: &serde_json::Value,
    now: NaiveDateTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO vector_records (id, dimension, embedding, payload, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            dimension = excluded.dimension,
            embedding = excluded.embedding,
            payload = excluded.payload,
            updated_at = excluded.updated_at",
        params![
            id,
            embedding.len() as i64,
            encode_embedding(embedding),
            payload.to_string(),
            now,
        ],
    )?;
    Ok(())
}

/// Every stored embedding of the given dimension.
pub fn load_vector_records(
    conn: &Connection,
    dimension: usize,
) -> Result<Vec<VectorRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, embedding, payload FROM vector_records WHERE dimension = ?1",
    )?;
    let rows = stmt.query_map(params![dimension as i64], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Vec<u8>>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, blob, payload) = row?;
        out.push(VectorRow {
            id,
            embedding: decode_embedding(&blob),
            payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
        });
    }
    Ok(out)
}

/// Delete records whose payload field `key` equals `value`. Returns the count removed.
pub fn delete_vector_records_where(
    conn: &Connection,
    key: &str,
    value: &str,
) -> Result<usize, DatabaseError> {
    let path = format!("$.{key}");
    let removed = conn.execute(
        "DELETE FROM vector_records WHERE json_extract(payload, ?1) = ?2",
        params![path, value],
    )?;
    Ok(removed)
}

pub fn count_vector_records(conn: &Connection) -> Result<usize, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM vector_records", [], |row| {
        row.get::<_, i64>(0)
    })?;
    Ok(count.max(0) as usize)
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn now() -> NaiveDateTime {
        chrono::Utc::now().naive_utc()
    }

    #[test]
    fn embedding_blob_round_trip() {
        let v = vec![0.25f32, -1.5, 3.0];
        assert_eq!(decode_embedding(&encode_embedding(&v)), v);
    }

    #[test]
    fn upsert_replaces_instead_of_appending() {
        let conn = open_memory_database().unwrap();
        let payload = serde_json::json!({ "document_id": "doc-1" });
        upsert_vector_record(&conn, "doc-1", &[1.0, 0.0], &payload, now()).unwrap();
        upsert_vector_record(&conn, "doc-1", &[0.0, 1.0], &payload, now()).unwrap();

        let rows = load_vector_records(&conn, 2).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].embedding, vec![0.0, 1.0]);
    }

    #[test]
    fn delete_where_matches_payload_field() {
        let conn = open_memory_database().unwrap();
        upsert_vector_record(&conn, "a", &[1.0], &serde_json::json!({ "document_id": "a" }), now()).unwrap();
        upsert_vector_record(&conn, "b", &[1.0], &serde_json::json!({ "document_id": "b" }), now()).unwrap();

        assert_eq!(delete_vector_records_where(&conn, "document_id", "a").unwrap(), 1);
        assert_eq!(count_vector_records(&conn).unwrap(), 1);
        assert_eq!(delete_vector_records_where(&conn, "document_id", "zzz").unwrap(), 0);
    }
}
