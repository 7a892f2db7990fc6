//! Raw JSON items → typed candidates.
//!
//! Models do not follow field names reliably, so each field is read from a
//! short list of aliases. Items without an identifying name/title are
//! skipped with a reason. Duplicates within one completion collapse to the
//! most complete entry.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde_json::{Map, Value};

use super::types::{MitigationCandidate, Normalized, RiskCandidate, RuleCandidate};
use crate::db::natural_key;
use crate::models::enums::{Level, MitigationStatus};

const RULE_NAME: &[&str] = &["name", "rule_name", "ruleName", "title"];
const RISK_TITLE: &[&str] = &["title", "risk_title", "riskTitle", "name"];
const DESCRIPTION: &[&str] = &["description", "details", "summary"];
const CATEGORY: &[&str] = &["category", "type", "area"];
const PRIORITY: &[&str] = &["priority", "severity", "importance"];
const TAGS: &[&str] = &["tags", "keywords", "labels"];
const PROBABILITY: &[&str] = &["probability", "likelihood"];
const IMPACT: &[&str] = &["impact", "severity", "consequence"];
const LINKED_RULES: &[&str] = &["linked_rules", "linkedRules", "related_rules", "relatedRules", "rules"];
const MITIGATIONS: &[&str] = &["mitigations", "mitigation_measures", "mitigationMeasures", "controls"];
const RESPONSIBLE: &[&str] = &["responsible_party", "responsibleParty", "owner"];
const DUE_DATE: &[&str] = &["due_date", "dueDate", "deadline"];

pub fn normalize_rules(items: Vec<Value>) -> Normalized<RuleCandidate> {
    let mut candidates = Vec::new();
    let mut skipped = Vec::new();

    for (i, item) in items.into_iter().enumerate() {
        let Some(obj) = item.as_object() else {
            skipped.push(format!("rule candidate {} is not an object", i + 1));
            continue;
        };
        let name = text_field(obj, RULE_NAME);
        if name.is_empty() {
            skipped.push(format!("rule candidate {} has no name", i + 1));
            continue;
        }
        candidates.push(RuleCandidate {
            name,
            description: text_field(obj, DESCRIPTION),
            category: text_field(obj, CATEGORY),
            priority: Level::coerce(&text_field(obj, PRIORITY)),
            tags: list_field(obj, TAGS),
        });
    }

    Normalized {
        candidates: collapse(candidates, |c| &c.name, rule_weight),
        skipped,
    }
}

pub fn normalize_risks(items: Vec<Value>) -> Normalized<RiskCandidate> {
    let mut candidates = Vec::new();
    let mut skipped = Vec::new();

    for (i, item) in items.into_iter().enumerate() {
        let Some(obj) = item.as_object() else {
            skipped.push(format!("risk candidate {} is not an object", i + 1));
            continue;
        };
        let title = text_field(obj, RISK_TITLE);
        if title.is_empty() {
            skipped.push(format!("risk candidate {} has no title", i + 1));
            continue;
        }
        candidates.push(RiskCandidate {
            title,
            description: text_field(obj, DESCRIPTION),
            category: text_field(obj, CATEGORY),
            probability: Level::coerce(&text_field(obj, PROBABILITY)),
            impact: Level::coerce(&text_field(obj, IMPACT)),
            linked_rules: list_field(obj, LINKED_RULES),
            mitigations: mitigations(obj),
        });
    }

    Normalized {
        candidates: collapse(candidates, |c| &c.title, risk_weight),
        skipped,
    }
}

fn mitigations(obj: &Map<String, Value>) -> Vec<MitigationCandidate> {
    let Some(Value::Array(items)) = first_present(obj, MITIGATIONS) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(MitigationCandidate {
                description: s.trim().to_string(),
                responsible_party: None,
                due_date: None,
                status: MitigationStatus::Planned,
            }),
            Value::Object(m) => {
                let description = text_field(m, DESCRIPTION);
                if description.is_empty() {
                    return None;
                }
                let responsible = text_field(m, RESPONSIBLE);
                Some(MitigationCandidate {
                    description,
                    responsible_party: (!responsible.is_empty() && responsible != "null")
                        .then_some(responsible),
                    due_date: NaiveDate::parse_from_str(&text_field(m, DUE_DATE), "%Y-%m-%d").ok(),
                    status: text_field(m, &["status"])
                        .to_lowercase()
                        .replace([' ', '-'], "_")
                        .parse()
                        .unwrap_or(MitigationStatus::Planned),
                })
            }
            _ => None,
        })
        .collect()
}

fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

/// String or number field, trimmed. Missing and non-scalar values read as "".
fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> String {
    match first_present(obj, keys) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Array of strings, or one comma-separated string.
fn list_field(obj: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    let raw: Vec<String> = match first_present(obj, keys) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };

    let mut out: Vec<String> = Vec::new();
    for item in raw {
        let item = item.trim().to_string();
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn rule_weight(c: &RuleCandidate) -> usize {
    [!c.description.is_empty(), !c.category.is_empty(), !c.tags.is_empty()]
        .iter()
        .filter(|x| **x)
        .count()
}

fn risk_weight(c: &RiskCandidate) -> usize {
    [
        !c.description.is_empty(),
        !c.category.is_empty(),
        !c.linked_rules.is_empty(),
        !c.mitigations.is_empty(),
    ]
    .iter()
    .filter(|x| **x)
    .count()
}

/// Keep one candidate per natural key, preferring the heavier entry and,
/// on ties, the earlier one. First-seen order is preserved.
fn collapse<T>(
    candidates: Vec<T>,
    key: impl Fn(&T) -> &String,
    weight: impl Fn(&T) -> usize,
) -> Vec<T> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<T> = Vec::new();

    for candidate in candidates {
        let k = natural_key(key(&candidate));
        match slots.get(&k) {
            Some(&idx) => {
                if weight(&candidate) > weight(&out[idx]) {
                    out[idx] = candidate;
                }
            }
            None => {
                slots.insert(k, out.len());
                out.push(candidate);
            }
        }
    }
    out
}
