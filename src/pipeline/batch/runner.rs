use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use uuid::Uuid;

use super::types::{BatchOptions, BatchStatusEvent, BatchSummary, CancelToken, DocumentFailure};
use super::BatchError;
use crate::db::{self, Database};
use crate::pipeline::suggestion::{SuggestionEngine, SuggestionError, SuggestionReport};

type DocumentResult = (usize, Uuid, Result<SuggestionReport, SuggestionError>);

/// Suggest rules then risks for every eligible document.
///
/// A document's failure is summarised and counted, never fatal. Only a
/// failure to enumerate documents fails the run. Cancelling stops new
/// documents from starting; documents already in flight finish.
pub fn run_batch(
    db: &Database,
    engine: &SuggestionEngine,
    options: &BatchOptions,
    cancel: &CancelToken,
    progress_fn: Option<&(dyn Fn(BatchStatusEvent) + Sync)>,
) -> Result<BatchSummary, BatchError> {
    let start = Instant::now();

    let ids = match db.with_conn(|conn| db::list_document_ids_by_status(conn, &options.statuses)) {
        Ok(ids) => ids,
        Err(e) => {
            tracing::error!(error = %e, "Batch suggestion could not enumerate documents");
            if let Some(progress) = progress_fn {
                progress(BatchStatusEvent::Failed {
                    error: e.to_string(),
                });
            }
            return Err(e.into());
        }
    };

    if ids.is_empty() {
        return Ok(BatchSummary::empty());
    }

    let total = ids.len() as u32;
    tracing::info!(documents = total, concurrency = options.concurrency, "Batch suggestion started");
    if let Some(progress) = progress_fn {
        progress(BatchStatusEvent::Started {
            document_count: total,
        });
    }

    let next = AtomicUsize::new(0);
    let completed = AtomicU32::new(0);
    let results: Mutex<Vec<DocumentResult>> = Mutex::new(Vec::with_capacity(ids.len()));

    let work = || loop {
        if cancel.is_cancelled() {
            break;
        }
        let i = next.fetch_add(1, Ordering::SeqCst);
        let Some(document_id) = ids.get(i).copied() else {
            break;
        };

        let outcome = engine.suggest_for_document(&document_id, options.merge_policy);

        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(progress) = progress_fn {
            progress(BatchStatusEvent::Progress {
                completed: done,
                total,
                document_id,
            });
        }
        if let Ok(mut results) = results.lock() {
            results.push((i, document_id, outcome));
        }
    };

    let workers = options.concurrency.clamp(1, ids.len());
    if workers == 1 {
        work();
    } else {
        std::thread::scope(|s| {
            for _ in 0..workers {
                s.spawn(&work);
            }
        });
    }

    let mut results = results.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
    results.sort_by_key(|(i, _, _)| *i);

    let mut summary = BatchSummary::empty();
    summary.documents_total = total;
    for (_, document_id, outcome) in results {
        fold_result(&mut summary, document_id, outcome);
    }
    summary.documents_skipped = total - summary.documents_processed;
    summary.cancelled = cancel.is_cancelled() && summary.documents_skipped > 0;
    summary.duration_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        documents = summary.documents_processed,
        skipped = summary.documents_skipped,
        rules = summary.rules_processed,
        risks = summary.risks_processed,
        errors = summary.errors_count,
        duration_ms = summary.duration_ms,
        "Batch suggestion finished"
    );

    if let Some(progress) = progress_fn {
        if summary.cancelled {
            progress(BatchStatusEvent::Cancelled {
                completed: summary.documents_processed,
                total,
            });
        } else {
            progress(BatchStatusEvent::Completed {
                rules_processed: summary.rules_processed,
                risks_processed: summary.risks_processed,
                errors_count: summary.errors_count,
                duration_ms: summary.duration_ms,
            });
        }
    }

    Ok(summary)
}

fn fold_result(
    summary: &mut BatchSummary,
    document_id: Uuid,
    outcome: Result<SuggestionReport, SuggestionError>,
) {
    summary.documents_processed += 1;

    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!(document_id = %document_id, error = %e, "Batch suggestion failed for document");
            summary.errors_count += 1;
            summary.summary.push(format!("Document {document_id}: failed: {e}"));
            summary.failures.push(DocumentFailure {
                document_id,
                error: e.to_string(),
            });
            return;
        }
    };

    let rules = report.rule_counts;
    let risks = report.risk_counts;
    summary.rules_processed += rules.total() as u32;
    summary.risks_processed += risks.total() as u32;

    summary.summary.push(format!(
        "Document {document_id}: rules {} created, {} updated, {} preserved",
        rules.created, rules.updated, rules.preserved
    ));
    summary.summary.push(format!(
        "Document {document_id}: risks {} created, {} updated, {} preserved",
        risks.created, risks.updated, risks.preserved
    ));
    for reason in &report.skipped {
        summary.summary.push(format!("Document {document_id}: skipped {reason}"));
    }

    if !report.errors.is_empty() {
        let error = report.errors.join("; ");
        summary.errors_count += 1;
        summary.summary.push(format!("Document {document_id}: {error}"));
        summary.failures.push(DocumentFailure { document_id, error });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::db::DatabaseError;
    use crate::models::enums::DocumentStatus;
    use crate::pipeline::extraction::{PlainTextExtractor, StoredTextSource};
    use crate::pipeline::indexing::IndexJob;
    use crate::pipeline::storage::{ContentStore, InMemoryContentStore};
    use crate::pipeline::suggestion::{CompletionModel, MockCompletionModel};
    use crate::test_support::seed_text;

    const RULES: &str = r#"[{"name": "Clean Desk", "description": "Lock screens"}]"#;
    const RISKS: &str = r#"[{"title": "Shoulder surfing", "impact": "medium"}]"#;

    struct Fixture {
        db: Arc<Database>,
        content: Arc<InMemoryContentStore>,
        jobs: Vec<IndexJob>,
    }

    fn fixture(count: usize) -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let content = Arc::new(InMemoryContentStore::new());
        let jobs = (0..count)
            .map(|i| seed_text(&db, content.as_ref(), &format!("Policy number {i}")))
            .collect();
        Fixture { db, content, jobs }
    }

    fn engine(fx: &Fixture, model: Arc<dyn CompletionModel>) -> SuggestionEngine {
        let source = Arc::new(StoredTextSource::new(
            fx.db.clone(),
            fx.content.clone(),
            Arc::new(PlainTextExtractor),
        ));
        SuggestionEngine::new(fx.db.clone(), source, model, 4_000)
    }

    fn break_text_of(fx: &Fixture, job: &IndexJob) {
        let version = fx
            .db
            .with_conn(|conn| db::get_version(conn, &job.version_id))
            .unwrap()
            .unwrap();
        fx.content.delete(&version.content_key).unwrap();
    }

    #[test]
    fn one_failing_document_does_not_abort_run() {
        let fx = fixture(3);
        break_text_of(&fx, &fx.jobs[1]);
        let engine = engine(&fx, Arc::new(MockCompletionModel::rules_then_risks(RULES, RISKS)));

        let summary =
            run_batch(&fx.db, &engine, &BatchOptions::default(), &CancelToken::new(), None).unwrap();

        assert_eq!(summary.errors_count, 1);
        assert_eq!(summary.documents_processed, 3);
        assert_eq!(summary.rules_processed, 2);
        assert_eq!(summary.risks_processed, 2);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].document_id, fx.jobs[1].document_id);
        assert!(summary
            .summary
            .iter()
            .any(|l| l.contains(&fx.jobs[1].document_id.to_string()) && l.contains("failed")));
    }

    #[test]
    fn upstream_errors_are_counted_per_document() {
        let fx = fixture(2);
        let engine = engine(&fx, Arc::new(MockCompletionModel::unavailable()));
        let summary =
            run_batch(&fx.db, &engine, &BatchOptions::default(), &CancelToken::new(), None).unwrap();
        assert_eq!(summary.errors_count, 2);
        assert_eq!(summary.rules_processed, 0);
    }

    #[test]
    fn rerun_is_idempotent() {
        let fx = fixture(2);
        let engine = engine(&fx, Arc::new(MockCompletionModel::rules_then_risks(RULES, RISKS)));
        let options = BatchOptions::default();
        run_batch(&fx.db, &engine, &options, &CancelToken::new(), None).unwrap();
        let second = run_batch(&fx.db, &engine, &options, &CancelToken::new(), None).unwrap();

        assert_eq!(second.rules_processed, 2);
        assert!(second.summary.iter().any(|l| l.contains("rules 0 created, 1 updated")));
        let count = fx
            .db
            .with_conn(|conn| {
                Ok::<_, DatabaseError>(db::list_rules_for_document(conn, &fx.jobs[0].document_id)?.len())
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn concurrent_run_matches_sequential_counts() {
        let fx = fixture(5);
        let engine = engine(&fx, Arc::new(MockCompletionModel::rules_then_risks(RULES, RISKS)));
        let options = BatchOptions {
            concurrency: 3,
            ..Default::default()
        };
        let summary = run_batch(&fx.db, &engine, &options, &CancelToken::new(), None).unwrap();
        assert_eq!(summary.documents_processed, 5);
        assert_eq!(summary.rules_processed, 5);
        assert_eq!(summary.errors_count, 0);
    }

    #[test]
    fn status_filter_limits_eligible_documents() {
        let fx = fixture(2);
        let engine = engine(&fx, Arc::new(MockCompletionModel::rules_then_risks(RULES, RISKS)));
        let options = BatchOptions {
            statuses: vec![DocumentStatus::Approved],
            ..Default::default()
        };
        let summary = run_batch(&fx.db, &engine, &options, &CancelToken::new(), None).unwrap();
        assert_eq!(summary.documents_total, 0);
        assert!(summary.summary.is_empty());
    }

    #[test]
    fn cancelled_run_skips_remaining_documents() {
        let fx = fixture(3);
        let token = CancelToken::new();
        let cancel_after_first = token.clone();
        let model = MockCompletionModel::with_responder(move |_| {
            cancel_after_first.cancel();
            Ok("[]".to_string())
        });
        let engine = engine(&fx, Arc::new(model));

        let summary = run_batch(&fx.db, &engine, &BatchOptions::default(), &token, None).unwrap();
        assert_eq!(summary.documents_processed, 1);
        assert_eq!(summary.documents_skipped, 2);
        assert!(summary.cancelled);
    }

    #[test]
    fn progress_events_bracket_the_run() {
        let fx = fixture(2);
        let engine = engine(&fx, Arc::new(MockCompletionModel::fixed("[]")));
        let events = Mutex::new(Vec::new());
        let record = |e: BatchStatusEvent| events.lock().unwrap().push(e);

        run_batch(&fx.db, &engine, &BatchOptions::default(), &CancelToken::new(), Some(&record))
            .unwrap();

        let events = events.into_inner().unwrap();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], BatchStatusEvent::Started { document_count: 2 }));
        assert!(matches!(events[2], BatchStatusEvent::Progress { completed: 2, total: 2, .. }));
        assert!(matches!(events[3], BatchStatusEvent::Completed { errors_count: 0, .. }));
    }
}
