use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use super::normalize::{normalize_risks, normalize_rules};
use super::parser::parse_completion;
use super::prompt::{build_risk_prompt, build_rule_prompt};
use super::types::{Normalized, RiskCandidate, RuleCandidate, SuggestionReport};
use super::{CompletionModel, MergePolicy, SuggestionError};
use crate::db::{self, natural_key, Database};
use crate::models::enums::{RiskStatus, RuleStatus};
use crate::models::{MitigationMeasure, Risk, Rule};
use crate::pipeline::extraction::DocumentTextSource;

/// Rules then risks for one document, merged idempotently.
pub struct SuggestionEngine {
    db: Arc<Database>,
    text_source: Arc<dyn DocumentTextSource>,
    completion: Arc<dyn CompletionModel>,
    max_prompt_chars: usize,
}

impl SuggestionEngine {
    pub fn new(
        db: Arc<Database>,
        text_source: Arc<dyn DocumentTextSource>,
        completion: Arc<dyn CompletionModel>,
        max_prompt_chars: usize,
    ) -> Self {
        Self {
            db,
            text_source,
            completion,
            max_prompt_chars,
        }
    }

    /// Suggest and merge rules, then risks with those rules as context.
    ///
    /// Fails only when the document text cannot be read or a merge cannot be
    /// written. Completion failures are recorded in `report.errors`.
    pub fn suggest_for_document(
        &self,
        document_id: &Uuid,
        policy: MergePolicy,
    ) -> Result<SuggestionReport, SuggestionError> {
        let text = self.text_source.document_text(document_id)?;
        let mut report = SuggestionReport::new(*document_id);

        let rules = self.suggest_rules(&text, &mut report);
        self.merge_rules(document_id, rules, policy, &mut report)?;

        let known_rules: Vec<String> = report.rules.iter().map(|r| r.name.clone()).collect();
        let risks = self.suggest_risks(&text, &known_rules, &mut report);
        self.merge_risks(document_id, risks, policy, &mut report)?;

        tracing::info!(
            document_id = %document_id,
            rules_created = report.rule_counts.created,
            rules_updated = report.rule_counts.updated,
            rules_preserved = report.rule_counts.preserved,
            risks_created = report.risk_counts.created,
            risks_updated = report.risk_counts.updated,
            risks_preserved = report.risk_counts.preserved,
            skipped = report.skipped.len(),
            errors = report.errors.len(),
            "Entity suggestion finished"
        );

        Ok(report)
    }

    /// Rule candidates for `text`. Never fails.
    pub fn suggest_rules(&self, text: &str, report: &mut SuggestionReport) -> Vec<RuleCandidate> {
        let prompt = build_rule_prompt(text, self.max_prompt_chars);
        let items = self.request("rule", &prompt, report);
        let Normalized { candidates, skipped } = normalize_rules(items);
        report.skipped.extend(skipped);
        candidates
    }

    /// Risk candidates for `text`, with `known_rules` offered as context.
    pub fn suggest_risks(
        &self,
        text: &str,
        known_rules: &[String],
        report: &mut SuggestionReport,
    ) -> Vec<RiskCandidate> {
        let prompt = build_risk_prompt(text, known_rules, self.max_prompt_chars);
        let items = self.request("risk", &prompt, report);
        let Normalized { candidates, skipped } = normalize_risks(items);
        report.skipped.extend(skipped);
        candidates
    }

    fn request(&self, kind: &str, prompt: &str, report: &mut SuggestionReport) -> Vec<Value> {
        match self.completion.complete(prompt) {
            Ok(raw) => {
                let parsed = parse_completion(&raw);
                if parsed.is_unparseable() {
                    tracing::warn!(
                        document_id = %report.document_id,
                        kind,
                        chars = raw.len(),
                        "Completion output not parseable, treating as empty"
                    );
                }
                parsed.into_items()
            }
            Err(e) => {
                tracing::warn!(
                    document_id = %report.document_id,
                    kind,
                    error = %e,
                    "Completion request failed"
                );
                report.errors.push(format!("{kind} suggestion failed: {e}"));
                Vec::new()
            }
        }
    }

    fn merge_rules(
        &self,
        document_id: &Uuid,
        candidates: Vec<RuleCandidate>,
        policy: MergePolicy,
        report: &mut SuggestionReport,
    ) -> Result<(), SuggestionError> {
        let now = Utc::now().naive_utc();

        self.db.with_conn(|conn| {
            for candidate in candidates {
                let rule = Rule {
                    id: Uuid::new_v4(),
                    rule_id: business_id("RULE"),
                    name: candidate.name,
                    description: candidate.description,
                    category: candidate.category,
                    priority: candidate.priority,
                    status: RuleStatus::Draft,
                    tags: candidate.tags,
                    source_document_id: *document_id,
                    ai_generated: true,
                    last_ai_update: Some(now),
                    human_edited_at: None,
                    created_at: now,
                    updated_at: now,
                };
                let outcome = db::upsert_rule(conn, &rule, policy.overwrites())?;
                report.rule_counts.record(&outcome);
                if let Some(stored) = db::get_rule(conn, outcome.id())? {
                    report.rules.push(stored);
                }
            }
            Ok(())
        })
    }

    fn merge_risks(
        &self,
        document_id: &Uuid,
        candidates: Vec<RiskCandidate>,
        policy: MergePolicy,
        report: &mut SuggestionReport,
    ) -> Result<(), SuggestionError> {
        if candidates.is_empty() {
            return Ok(());
        }
        let now = Utc::now().naive_utc();

        self.db.with_conn(|conn| {
            let rule_ids: HashMap<String, Uuid> = db::list_rules_for_document(conn, document_id)?
                .into_iter()
                .map(|r| (natural_key(&r.name), r.id))
                .collect();

            for candidate in candidates {
                let mut linked_rule_ids: Vec<Uuid> = Vec::new();
                for name in &candidate.linked_rules {
                    match rule_ids.get(&natural_key(name)) {
                        Some(id) if !linked_rule_ids.contains(id) => linked_rule_ids.push(*id),
                        Some(_) => {}
                        None => tracing::debug!(
                            document_id = %document_id,
                            rule = %name,
                            "Linked rule not found, ignoring"
                        ),
                    }
                }

                let risk = Risk {
                    id: Uuid::new_v4(),
                    risk_id: business_id("RISK"),
                    title: candidate.title,
                    description: candidate.description,
                    category: candidate.category,
                    probability: candidate.probability,
                    impact: candidate.impact,
                    status: RiskStatus::Open,
                    identified_date: now.date(),
                    source_document_id: *document_id,
                    ai_generated: true,
                    linked_rule_ids,
                    mitigations: candidate
                        .mitigations
                        .into_iter()
                        .map(|m| MitigationMeasure {
                            id: Uuid::new_v4(),
                            description: m.description,
                            responsible_party: m.responsible_party,
                            due_date: m.due_date,
                            status: m.status,
                        })
                        .collect(),
                    last_ai_update: Some(now),
                    human_edited_at: None,
                    created_at: now,
                    updated_at: now,
                };
                let outcome = db::upsert_risk(conn, &risk, policy.overwrites())?;
                report.risk_counts.record(&outcome);
                if let Some(stored) = db::get_risk(conn, outcome.id())? {
                    report.risks.push(stored);
                }
            }
            Ok(())
        })
    }
}

/// User-facing id such as `RULE-3F2A9C01B7D4`.
fn business_id(prefix: &str) -> String {
    let simple = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{prefix}-{}", &simple[..12])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::db::{RiskEdit, RuleEdit};
    use crate::models::enums::Level;
    use crate::pipeline::extraction::{PlainTextExtractor, StoredTextSource};
    use crate::pipeline::storage::InMemoryContentStore;
    use crate::pipeline::suggestion::prompt::RISK_PROMPT_MARKER;
    use crate::pipeline::suggestion::MockCompletionModel;
    use crate::test_support::seed_text;

    const RULES: &str = r#"```json
[
  {"name": "Data Retention Policy", "description": "Keep records 7 years", "priority": "High"},
  {"name": "MFA Required", "description": "All logins use MFA", "tags": ["auth"]},
  {"description": "no name here"}
]
```"#;

    const RISKS: &str = r#"{"risks": [
  {"title": "Account takeover", "probability": "Likely", "impact": "severe",
   "linked_rules": ["mfa required", "Unknown Rule"],
   "mitigations": ["Enforce MFA", {"description": "Quarterly access review", "owner": "IT"}]}
]}"#;

    struct Fixture {
        db: Arc<Database>,
        document_id: Uuid,
        text_source: Arc<StoredTextSource>,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let content = Arc::new(InMemoryContentStore::new());
        let job = seed_text(&db, content.as_ref(), "Records are kept seven years. MFA is mandatory.");
        let text_source = Arc::new(StoredTextSource::new(
            db.clone(),
            content,
            Arc::new(PlainTextExtractor),
        ));
        Fixture {
            db,
            document_id: job.document_id,
            text_source,
        }
    }

    fn engine(fx: &Fixture, model: Arc<dyn CompletionModel>) -> SuggestionEngine {
        SuggestionEngine::new(fx.db.clone(), fx.text_source.clone(), model, 4_000)
    }

    #[test]
    fn creates_rules_and_linked_risks() {
        let fx = fixture();
        let model = Arc::new(MockCompletionModel::rules_then_risks(RULES, RISKS));
        let report = engine(&fx, model.clone())
            .suggest_for_document(&fx.document_id, MergePolicy::PreserveHumanEdits)
            .unwrap();

        assert_eq!(report.rule_counts.created, 2);
        assert_eq!(report.risk_counts.created, 1);
        assert_eq!(report.skipped, vec!["rule candidate 3 has no name".to_string()]);
        assert!(report.errors.is_empty());

        let rule = &report.rules[0];
        assert_eq!(rule.status, RuleStatus::Draft);
        assert_eq!(rule.priority, Level::High);
        assert!(rule.ai_generated);
        assert!(rule.rule_id.starts_with("RULE-"));
        assert_eq!(rule.source_document_id, fx.document_id);

        let risk = &report.risks[0];
        assert_eq!(risk.status, RiskStatus::Open);
        assert_eq!(risk.impact, Level::High);
        assert_eq!(risk.probability, Level::Medium);
        assert_eq!(risk.linked_rule_ids, vec![report.rules[1].id]);
        assert_eq!(risk.mitigations.len(), 2);

        // The risk prompt lists the rules just produced.
        let prompts = model.prompts();
        let risk_prompt = prompts.iter().find(|p| p.contains(RISK_PROMPT_MARKER)).unwrap();
        assert!(risk_prompt.contains("1. Data Retention Policy\n2. MFA Required"));
    }

    #[test]
    fn second_run_updates_instead_of_duplicating() {
        let fx = fixture();
        let engine = engine(&fx, Arc::new(MockCompletionModel::rules_then_risks(RULES, RISKS)));

        let first = engine
            .suggest_for_document(&fx.document_id, MergePolicy::PreserveHumanEdits)
            .unwrap();
        let second = engine
            .suggest_for_document(&fx.document_id, MergePolicy::PreserveHumanEdits)
            .unwrap();

        assert_eq!(second.rule_counts.created, 0);
        assert_eq!(second.rule_counts.updated, 2);
        assert_eq!(second.risk_counts.updated, 1);
        assert_eq!(first.rules[0].id, second.rules[0].id);
        assert_eq!(first.rules[0].rule_id, second.rules[0].rule_id);
        assert!(second.rules[0].last_ai_update >= first.rules[0].last_ai_update);

        let (rules, risks) = fx
            .db
            .with_conn(|conn| {
                Ok::<_, crate::db::DatabaseError>((
                    db::list_rules_for_document(conn, &fx.document_id)?.len(),
                    db::list_risks_for_document(conn, &fx.document_id)?.len(),
                ))
            })
            .unwrap();
        assert_eq!((rules, risks), (2, 1));
    }

    #[test]
    fn concurrent_runs_on_one_document_merge_once() {
        let fx = fixture();
        // Both runs hold their rule completions until the other has one too.
        let barrier = Arc::new(std::sync::Barrier::new(2));
        let gate = barrier.clone();
        let model = Arc::new(MockCompletionModel::with_responder(move |prompt| {
            if prompt.contains(RISK_PROMPT_MARKER) {
                Ok(RISKS.to_string())
            } else {
                gate.wait();
                Ok(RULES.to_string())
            }
        }));
        let engine = engine(&fx, model);

        let reports: Vec<SuggestionReport> = std::thread::scope(|s| {
            let runs: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(|| {
                        engine
                            .suggest_for_document(&fx.document_id, MergePolicy::PreserveHumanEdits)
                            .unwrap()
                    })
                })
                .collect();
            runs.into_iter().map(|r| r.join().unwrap()).collect()
        });

        let rule_created: usize = reports.iter().map(|r| r.rule_counts.created).sum();
        let rule_updated: usize = reports.iter().map(|r| r.rule_counts.updated).sum();
        let risk_created: usize = reports.iter().map(|r| r.risk_counts.created).sum();
        let risk_updated: usize = reports.iter().map(|r| r.risk_counts.updated).sum();
        assert_eq!((rule_created, rule_updated), (2, 2));
        assert_eq!((risk_created, risk_updated), (1, 1));

        let (rules, risks) = fx
            .db
            .with_conn(|conn| {
                Ok::<_, crate::db::DatabaseError>((
                    db::list_rules_for_document(conn, &fx.document_id)?,
                    db::list_risks_for_document(conn, &fx.document_id)?,
                ))
            })
            .unwrap();
        let mut names: Vec<String> = rules.iter().map(|r| natural_key(&r.name)).collect();
        names.sort();
        names.dedup();
        assert_eq!((rules.len(), names.len()), (2, 2));
        assert_eq!(risks.len(), 1);
    }

    #[test]
    fn human_edits_survive_unless_overwrite() {
        let fx = fixture();
        let engine = engine(&fx, Arc::new(MockCompletionModel::rules_then_risks(RULES, RISKS)));
        let first = engine
            .suggest_for_document(&fx.document_id, MergePolicy::PreserveHumanEdits)
            .unwrap();

        let rule_id = first.rules[0].id;
        let risk_id = first.risks[0].id;
        fx.db
            .with_conn(|conn| {
                db::apply_human_rule_edit(
                    conn,
                    &rule_id,
                    &RuleEdit {
                        description: Some("Edited by compliance".into()),
                        ..Default::default()
                    },
                    Utc::now().naive_utc(),
                )?;
                db::apply_human_risk_edit(
                    conn,
                    &risk_id,
                    &RiskEdit {
                        impact: Some(Level::Medium),
                        ..Default::default()
                    },
                    Utc::now().naive_utc(),
                )
            })
            .unwrap();

        let preserved = engine
            .suggest_for_document(&fx.document_id, MergePolicy::PreserveHumanEdits)
            .unwrap();
        assert_eq!(preserved.rule_counts.preserved, 1);
        assert_eq!(preserved.risk_counts.preserved, 1);
        assert_eq!(preserved.rules[0].description, "Edited by compliance");
        assert_eq!(preserved.risks[0].impact, Level::Medium);

        let overwritten = engine
            .suggest_for_document(&fx.document_id, MergePolicy::Overwrite)
            .unwrap();
        assert_eq!(overwritten.rule_counts.updated, 2);
        assert_eq!(overwritten.rules[0].description, "Keep records 7 years");
        assert!(overwritten.rules[0].human_edited_at.is_none());
    }

    #[test]
    fn upstream_failure_yields_empty_report_with_errors() {
        let fx = fixture();
        let report = engine(&fx, Arc::new(MockCompletionModel::unavailable()))
            .suggest_for_document(&fx.document_id, MergePolicy::PreserveHumanEdits)
            .unwrap();
        assert!(report.rules.is_empty());
        assert!(report.risks.is_empty());
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].starts_with("rule suggestion failed"));
    }

    #[test]
    fn unparseable_output_is_empty_not_error() {
        let fx = fixture();
        let report = engine(&fx, Arc::new(MockCompletionModel::fixed("not json")))
            .suggest_for_document(&fx.document_id, MergePolicy::PreserveHumanEdits)
            .unwrap();
        assert_eq!(report.rule_counts.total(), 0);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn unknown_document_is_an_error() {
        let fx = fixture();
        let err = engine(&fx, Arc::new(MockCompletionModel::fixed("[]")))
            .suggest_for_document(&Uuid::new_v4(), MergePolicy::PreserveHumanEdits)
            .unwrap_err();
        assert!(matches!(err, SuggestionError::Text(_)));
    }

    #[test]
    fn prompt_text_is_truncated() {
        let fx = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let model = MockCompletionModel::with_responder(move |prompt| {
            sink.lock().unwrap().push(prompt.len());
            Ok("[]".to_string())
        });
        let engine = SuggestionEngine::new(fx.db.clone(), fx.text_source.clone(), Arc::new(model), 10);
        let mut report = SuggestionReport::new(fx.document_id);
        engine.suggest_rules(&"x".repeat(5_000), &mut report);
        assert!(seen.lock().unwrap()[0] < 2_000);
    }

    #[test]
    fn business_ids_are_prefixed_and_short() {
        let id = business_id("RISK");
        assert_eq!(id.len(), "RISK-".len() + 12);
        assert!(id[5..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }
}
