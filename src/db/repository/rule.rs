use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{natural_key, parse_uuid, MergeOutcome};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::Rule;

const RULE_COLUMNS: &str = "id, rule_id, name, description, category, priority, status, tags,
    source_document_id, ai_generated, last_ai_update, human_edited_at, created_at, updated_at";

/// Insert `rule` or merge it into the existing rule with the same
/// `(source_document_id, name)` in one statement.
///
/// Rules carrying a human edit are left untouched unless `overwrite` is set.
/// Empty incoming text fields keep the stored value.
pub fn upsert_rule(
    conn: &Connection,
    rule: &Rule,
    overwrite: bool,
) -> Result<MergeOutcome, DatabaseError> {
    let name_key = natural_key(&rule.name);
    let tags = serde_json::to_string(&rule.tags)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;

    let returned: Option<String> = conn
        .query_row(
            "INSERT INTO rules (id, rule_id, name, name_key, description, category, priority,
             status, tags, source_document_id, ai_generated, last_ai_update, human_edited_at,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, ?11, NULL, ?12, ?13)
             ON CONFLICT(source_document_id, name_key) DO UPDATE SET
                name = excluded.name,
                description = CASE WHEN excluded.description <> ''
                    THEN excluded.description ELSE rules.description END,
                category = CASE WHEN excluded.category <> ''
                    THEN excluded.category ELSE rules.category END,
                priority = excluded.priority,
                tags = CASE WHEN excluded.tags <> '[]' THEN excluded.tags ELSE rules.tags END,
                ai_generated = 1,
                last_ai_update = excluded.last_ai_update,
                human_edited_at = CASE WHEN ?14 THEN NULL ELSE rules.human_edited_at END,
                updated_at = excluded.updated_at
             WHERE rules.human_edited_at IS NULL OR ?14
             RETURNING id",
            params![
                rule.id.to_string(),
                rule.rule_id,
                rule.name,
                name_key,
                rule.description,
                rule.category,
                rule.priority.as_str(),
                rule.status.as_str(),
                tags,
                rule.source_document_id.to_string(),
                rule.last_ai_update,
                rule.created_at,
                rule.updated_at,
                overwrite,
            ],
            |row| row.get(0),
        )
        .optional()?;

    match returned {
        Some(id) if id == rule.id.to_string() => Ok(MergeOutcome::Created(rule.id)),
        Some(id) => Ok(MergeOutcome::Updated(parse_uuid(&id)?)),
        None => {
            let existing: String = conn.query_row(
                "SELECT id FROM rules WHERE source_document_id = ?1 AND name_key = ?2",
                params![rule.source_document_id.to_string(), name_key],
                |row| row.get(0),
            )?;
            Ok(MergeOutcome::Preserved(parse_uuid(&existing)?))
        }
    }
}

pub fn get_rule(conn: &Connection, id: &Uuid) -> Result<Option<Rule>, DatabaseError> {
    let mut stmt = conn.prepare(&format!("SELECT {RULE_COLUMNS} FROM rules WHERE id = ?1"))?;

    match stmt.query_row(params![id.to_string()], read_rule_row) {
        Ok(row) => Ok(Some(rule_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_rules_for_document(
    conn: &Connection,
    document_id: &Uuid,
) -> Result<Vec<Rule>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RULE_COLUMNS} FROM rules WHERE source_document_id = ?1 ORDER BY created_at, name"
    ))?;
    let rows = stmt.query_map(params![document_id.to_string()], read_rule_row)?;

    let mut rules = Vec::new();
    for row in rows {
        rules.push(rule_from_row(row?)?);
    }
    Ok(rules)
}

/// Fields a reviewer may change on a suggested rule.
#[derive(Debug, Clone, Default)]
pub struct RuleEdit {
    pub description: Option<String>,
    pub priority: Option<Level>,
    pub status: Option<RuleStatus>,
}

/// Apply a human edit and stamp `human_edited_at`.
pub fn apply_human_rule_edit(
    conn: &Connection,
    id: &Uuid,
    edit: &RuleEdit,
    now: NaiveDateTime,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE rules SET
            description = COALESCE(?2, description),
            priority = COALESCE(?3, priority),
            status = COALESCE(?4, status),
            human_edited_at = ?5,
            updated_at = ?5
         WHERE id = ?1",
        params![
            id.to_string(),
            edit.description,
            edit.priority.map(|p| p.as_str()),
            edit.status.map(|s| s.as_str()),
            now,
        ],
    )?;
    if rows == 0 {
        return Err(DatabaseError::not_found("Rule", id));
    }
    Ok(())
}

struct RuleRow {
    id: String,
    rule_id: String,
    name: String,
    description: String,
    category: String,
    priority: String,
    status: String,
    tags: String,
    source_document_id: String,
    ai_generated: i32,
    last_ai_update: Option<NaiveDateTime>,
    human_edited_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

fn read_rule_row(row: &Row<'_>) -> rusqlite::Result<RuleRow> {
    Ok(RuleRow {
        id: row.get(0)?,
        rule_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        priority: row.get(5)?,
        status: row.get(6)?,
        tags: row.get(7)?,
        source_document_id: row.get(8)?,
        ai_generated: row.get(9)?,
        last_ai_update: row.get(10)?,
        human_edited_at: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn rule_from_row(row: RuleRow) -> Result<Rule, DatabaseError> {
    Ok(Rule {
        id: parse_uuid(&row.id)?,
        rule_id: row.rule_id,
        name: row.name,
        description: row.description,
        category: row.category,
        priority: Level::from_str(&row.priority)?,
        status: RuleStatus::from_str(&row.status)?,
        tags: serde_json::from_str(&row.tags).unwrap_or_default(),
        source_document_id: parse_uuid(&row.source_document_id)?,
        ai_generated: row.ai_generated != 0,
        last_ai_update: row.last_ai_update,
        human_edited_at: row.human_edited_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
