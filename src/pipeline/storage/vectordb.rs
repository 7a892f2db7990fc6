use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::types::{PayloadFilter, VectorHit, VectorIndex};
use crate::db::{self, Database};
use crate::pipeline::UpstreamError;

/// Cosine similarity of two vectors; 0.0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Score every candidate against `query` and keep the best `top_k`.
fn rank<'a, I>(query: &[f32], candidates: I, top_k: usize) -> Vec<VectorHit>
where
    I: IntoIterator<Item = (&'a str, &'a [f32], &'a serde_json::Value)>,
{
    let mut hits: Vec<VectorHit> = candidates
        .into_iter()
        .map(|(id, vector, payload)| VectorHit {
            id: id.to_string(),
            score: cosine_similarity(query, vector),
            payload: payload.clone(),
        })
        .collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    hits.truncate(top_k);
    hits
}

/// Brute-force vector index persisted in the `vector_records` table.
pub struct SqliteVectorIndex {
    db: Arc<Database>,
}

impl SqliteVectorIndex {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

fn index_error(e: db::DatabaseError) -> UpstreamError {
    UpstreamError::VectorIndex(e.to_string())
}

impl VectorIndex for SqliteVectorIndex {
    fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        payload: &serde_json::Value,
    ) -> Result<(), UpstreamError> {
        let now = chrono::Utc::now().naive_utc();
        self.db
            .with_conn(|conn| db::upsert_vector_record(conn, id, vector, payload, now))
            .map_err(index_error)
    }

    fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorHit>, UpstreamError> {
        let rows = self
            .db
            .with_conn(|conn| db::load_vector_records(conn, vector.len()))
            .map_err(index_error)?;
        Ok(rank(
            vector,
            rows.iter()
                .map(|r| (r.id.as_str(), r.embedding.as_slice(), &r.payload)),
            top_k,
        ))
    }

    fn delete_where(&self, filter: &PayloadFilter) -> Result<usize, UpstreamError> {
        self.db
            .with_conn(|conn| db::delete_vector_records_where(conn, &filter.key, &filter.value))
            .map_err(index_error)
    }
}

/// In-memory vector index for testing.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    records: Mutex<HashMap<String, (Vec<f32>, serde_json::Value)>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records
            .lock()
            .map(|r| r.contains_key(id))
            .unwrap_or(false)
    }
}

fn poisoned<T>(_: T) -> UpstreamError {
    UpstreamError::VectorIndex("index lock poisoned".into())
}

impl VectorIndex for InMemoryVectorIndex {
    fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        payload: &serde_json::Value,
    ) -> Result<(), UpstreamError> {
        self.records
            .lock()
            .map_err(poisoned)?
            .insert(id.to_string(), (vector.to_vec(), payload.clone()));
        Ok(())
    }

    fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorHit>, UpstreamError> {
        let records = self.records.lock().map_err(poisoned)?;
        Ok(rank(
            vector,
            records
                .iter()
                .map(|(id, (v, payload))| (id.as_str(), v.as_slice(), payload)),
            top_k,
        ))
    }

    fn delete_where(&self, filter: &PayloadFilter) -> Result<usize, UpstreamError> {
        let mut records = self.records.lock().map_err(poisoned)?;
        let before = records.len();
        records.retain(|_, (_, payload)| !filter.matches(payload));
        Ok(before - records.len())
    }
}
