use std::collections::HashSet;
use std::sync::Arc;

use super::{DocumentHit, SearchError, SearchQuery};
use crate::authorization::Principal;
use crate::db::{self, Database};
use crate::pipeline::storage::{EmbeddingModel, VectorIndex};

pub struct SearchEngine {
    db: Arc<Database>,
    embedder: Arc<dyn EmbeddingModel>,
    index: Arc<dyn VectorIndex>,
    max_top_k: usize,
}

impl SearchEngine {
    pub fn new(
        db: Arc<Database>,
        embedder: Arc<dyn EmbeddingModel>,
        index: Arc<dyn VectorIndex>,
        max_top_k: usize,
    ) -> Self {
        Self {
            db,
            embedder,
            index,
            max_top_k: max_top_k.max(1),
        }
    }

    /// Documents most similar to `query.query` that `principal` may view,
    /// best first. No match is an empty result, not an error.
    pub fn search(
        &self,
        query: &SearchQuery,
        principal: &Principal,
    ) -> Result<Vec<DocumentHit>, SearchError> {
        let text = query.query.trim();
        if text.is_empty() {
            return Err(SearchError::Validation("query must not be empty".into()));
        }
        if query.top_k == 0 {
            return Err(SearchError::Validation("top_k must be at least 1".into()));
        }
        if !query.min_score.is_finite() {
            return Err(SearchError::Validation("min_score must be a number".into()));
        }
        let top_k = query.top_k.min(self.max_top_k);

        let vector = self.embedder.embed(text)?;
        let hits = self.index.search(&vector, top_k)?;
        let raw_hits = hits.len();

        // Index results arrive best first; the first hit per document wins.
        let mut seen = HashSet::new();
        let candidates: Vec<_> = hits
            .into_iter()
            .filter(|h| h.score >= query.min_score)
            .filter_map(|h| h.document_id().map(|id| (id, h.score)))
            .filter(|(id, _)| seen.insert(*id))
            .collect();

        let mut results = self.db.with_conn(|conn| {
            let mut out = Vec::with_capacity(candidates.len());
            for (id, score) in &candidates {
                match db::get_document(conn, id)? {
                    Some(document) if principal.can_view(&document.access_control) => {
                        out.push(DocumentHit {
                            document,
                            score: *score,
                        });
                    }
                    Some(_) => {}
                    // Vector outlived its document; removal is eventually consistent.
                    None => tracing::debug!(document_id = %id, "Search hit for deleted document"),
                }
            }
            Ok::<_, SearchError>(out)
        })?;

        results.sort_by(|a, b| b.score.total_cmp(&a.score));

        tracing::debug!(
            principal = %principal.id,
            top_k,
            raw_hits,
            returned = results.len(),
            "Search completed"
        );

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use uuid::Uuid;

    use crate::models::enums::Role;
    use crate::models::AccessControl;
    use crate::pipeline::storage::{
        document_payload, InMemoryContentStore, InMemoryVectorIndex, MockEmbedder, PayloadFilter,
        VectorHit,
    };
    use crate::pipeline::UpstreamError;
    use crate::test_support::seed_document;

    /// Returns fixed hits regardless of the query vector.
    struct ScriptedIndex(Vec<VectorHit>);

    impl VectorIndex for ScriptedIndex {
        fn upsert(&self, _: &str, _: &[f32], _: &serde_json::Value) -> Result<(), UpstreamError> {
            Ok(())
        }
        fn search(&self, _: &[f32], top_k: usize) -> Result<Vec<VectorHit>, UpstreamError> {
            Ok(self.0.iter().take(top_k).cloned().collect())
        }
        fn delete_where(&self, _: &PayloadFilter) -> Result<usize, UpstreamError> {
            Ok(0)
        }
    }

    struct DownIndex;

    impl VectorIndex for DownIndex {
        fn upsert(&self, _: &str, _: &[f32], _: &serde_json::Value) -> Result<(), UpstreamError> {
            Err(UpstreamError::VectorIndex("down".into()))
        }
        fn search(&self, _: &[f32], _: usize) -> Result<Vec<VectorHit>, UpstreamError> {
            Err(UpstreamError::VectorIndex("down".into()))
        }
        fn delete_where(&self, _: &PayloadFilter) -> Result<usize, UpstreamError> {
            Err(UpstreamError::VectorIndex("down".into()))
        }
    }

    fn acl(view: &[Role]) -> AccessControl {
        AccessControl {
            view_roles: view.iter().copied().collect::<BTreeSet<_>>(),
            ..AccessControl::default()
        }
    }

    fn hit(id: &Uuid, score: f32) -> VectorHit {
        VectorHit {
            id: id.to_string(),
            score,
            payload: document_payload(id),
        }
    }

    fn query(text: &str, top_k: usize, min_score: f32) -> SearchQuery {
        SearchQuery {
            query: text.into(),
            top_k,
            min_score,
        }
    }

    fn viewer() -> Principal {
        Principal::new("vera", [Role::Viewer])
    }

    struct Corpus {
        db: Arc<Database>,
        admin_only: Uuid,
        public_a: Uuid,
        public_b: Uuid,
    }

    fn corpus() -> Corpus {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let content = InMemoryContentStore::new();
        let seed = |name: &str, view: &[Role]| {
            seed_document(&db, &content, name, "policy", "text/plain", acl(view)).document_id
        };
        let admin_only = seed("board.txt", &[Role::Admin]);
        let public_a = seed("a.txt", &[Role::Viewer, Role::Admin]);
        let public_b = seed("b.txt", &[Role::Viewer]);
        Corpus {
            db,
            admin_only,
            public_a,
            public_b,
        }
    }

    fn engine(db: &Arc<Database>, index: Arc<dyn VectorIndex>) -> SearchEngine {
        SearchEngine::new(db.clone(), Arc::new(MockEmbedder::new()), index, 50)
    }

    #[test]
    fn filters_by_view_roles_and_keeps_order() {
        let c = corpus();
        let index = Arc::new(ScriptedIndex(vec![
            hit(&c.admin_only, 0.95),
            hit(&c.public_a, 0.80),
            hit(&c.public_b, 0.60),
        ]));

        let results = engine(&c.db, index).search(&query("policy", 5, 0.3), &viewer()).unwrap();
        let ids: Vec<_> = results.iter().map(|h| h.document.id).collect();
        assert_eq!(ids, vec![c.public_a, c.public_b]);
        assert_eq!(results[0].score, 0.80);
    }

    #[test]
    fn admin_sees_everything() {
        let c = corpus();
        let index = Arc::new(ScriptedIndex(vec![hit(&c.admin_only, 0.9), hit(&c.public_b, 0.5)]));
        let admin = Principal::new("root", [Role::Admin]);
        let results = engine(&c.db, index).search(&query("policy", 5, 0.0), &admin).unwrap();
        assert_eq!(results.len(), 2);

        let reviewer = Principal::new("rita", [Role::Reviewer]);
        let index = Arc::new(ScriptedIndex(vec![hit(&c.public_a, 0.9)]));
        assert!(engine(&c.db, index).search(&query("policy", 5, 0.0), &reviewer).unwrap().is_empty());
    }

    #[test]
    fn drops_low_scores_and_duplicate_documents() {
        let c = corpus();
        let index = Arc::new(ScriptedIndex(vec![
            hit(&c.public_a, 0.9),
            hit(&c.public_a, 0.7),
            hit(&c.public_b, 0.2),
        ]));
        let results = engine(&c.db, index).search(&query("policy", 5, 0.3), &viewer()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].score, 0.9);
    }

    #[test]
    fn hits_for_deleted_documents_are_skipped() {
        let c = corpus();
        let ghost = Uuid::new_v4();
        let index = Arc::new(ScriptedIndex(vec![hit(&ghost, 0.9), hit(&c.public_b, 0.5)]));
        let results = engine(&c.db, index).search(&query("policy", 5, 0.0), &viewer()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, c.public_b);
    }

    #[test]
    fn no_match_is_empty_success() {
        let c = corpus();
        let results = engine(&c.db, Arc::new(InMemoryVectorIndex::new()))
            .search(&query("policy", 5, 0.0), &viewer())
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn index_failure_is_an_error() {
        let c = corpus();
        let err = engine(&c.db, Arc::new(DownIndex))
            .search(&query("policy", 5, 0.0), &viewer())
            .unwrap_err();
        assert!(matches!(err, SearchError::Upstream(_)));
    }

    #[test]
    fn rejects_blank_query_and_zero_top_k() {
        let c = corpus();
        let engine = engine(&c.db, Arc::new(InMemoryVectorIndex::new()));
        assert!(matches!(
            engine.search(&query("   ", 5, 0.0), &viewer()),
            Err(SearchError::Validation(_))
        ));
        assert!(matches!(
            engine.search(&query("policy", 0, 0.0), &viewer()),
            Err(SearchError::Validation(_))
        ));
    }

    #[test]
    fn top_k_is_clamped() {
        let c = corpus();
        let index = Arc::new(ScriptedIndex(vec![hit(&c.public_a, 0.9), hit(&c.public_b, 0.8)]));
        let engine = SearchEngine::new(c.db.clone(), Arc::new(MockEmbedder::new()), index, 1);
        let results = engine.search(&query("policy", 100, 0.0), &viewer()).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn end_to_end_with_mock_embedder() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let embedder = MockEmbedder::new();
        let index = Arc::new(InMemoryVectorIndex::new());
        let content = InMemoryContentStore::new();
        for text in ["password rotation every ninety days", "travel expense reimbursement"] {
            let id = seed_document(&db, &content, "p.txt", text, "text/plain", AccessControl::default())
                .document_id;
            index
                .upsert(&id.to_string(), &embedder.embed(text).unwrap(), &document_payload(&id))
                .unwrap();
        }
        let engine = SearchEngine::new(db, Arc::new(embedder), index, 10);
        let results = engine.search(&query("password rotation", 2, 0.0), &viewer()).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].score > results[1].score);
    }
}
