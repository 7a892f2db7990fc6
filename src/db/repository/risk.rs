use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{natural_key, parse_uuid, MergeOutcome};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::{MitigationMeasure, Risk};

const RISK_COLUMNS: &str = "id, risk_id, title, description, category, probability, impact,
    status, identified_date, source_document_id, ai_generated, linked_rule_ids,
    last_ai_update, human_edited_at, created_at, updated_at";

/// Insert `risk` or merge it into the existing risk with the same
/// `(source_document_id, title)`, replacing its mitigations when the
/// incoming risk carries any. Runs in a single transaction.
pub fn upsert_risk(
    conn: &Connection,
    risk: &Risk,
    overwrite: bool,
) -> Result<MergeOutcome, DatabaseError> {
    let title_key = natural_key(&risk.title);
    let linked = serde_json::to_string(&risk.linked_rule_ids)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;

    let tx = conn.unchecked_transaction()?;

    let returned: Option<String> = tx
        .query_row(
            "INSERT INTO risks (id, risk_id, title, title_key, description, category, probability,
             impact, status, identified_date, source_document_id, ai_generated, linked_rule_ids,
             last_ai_update, human_edited_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1, ?12, ?13, NULL, ?14, ?15)
             ON CONFLICT(source_document_id, title_key) DO UPDATE SET
                title = excluded.title,
                description = CASE WHEN excluded.description <> ''
                    THEN excluded.description ELSE risks.description END,
                category = CASE WHEN excluded.category <> ''
                    THEN excluded.category ELSE risks.category END,
                probability = excluded.probability,
                impact = excluded.impact,
                linked_rule_ids = CASE WHEN excluded.linked_rule_ids <> '[]'
                    THEN excluded.linked_rule_ids ELSE risks.linked_rule_ids END,
                ai_generated = 1,
                last_ai_update = excluded.last_ai_update,
                human_edited_at = CASE WHEN ?16 THEN NULL ELSE risks.human_edited_at END,
                updated_at = excluded.updated_at
             WHERE risks.human_edited_at IS NULL OR ?16
             RETURNING id",
            params![
                risk.id.to_string(),
                risk.risk_id,
                risk.title,
                title_key,
                risk.description,
                risk.category,
                risk.probability.as_str(),
                risk.impact.as_str(),
                risk.status.as_str(),
                risk.identified_date,
                risk.source_document_id.to_string(),
                linked,
                risk.last_ai_update,
                risk.created_at,
                risk.updated_at,
                overwrite,
            ],
            |row| row.get(0),
        )
        .optional()?;

    let outcome = match returned {
        Some(id) if id == risk.id.to_string() => MergeOutcome::Created(risk.id),
        Some(id) => MergeOutcome::Updated(parse_uuid(&id)?),
        None => {
            let existing: String = tx.query_row(
                "SELECT id FROM risks WHERE source_document_id = ?1 AND title_key = ?2",
                params![risk.source_document_id.to_string(), title_key],
                |row| row.get(0),
            )?;
            MergeOutcome::Preserved(parse_uuid(&existing)?)
        }
    };

    if !matches!(outcome, MergeOutcome::Preserved(_)) && !risk.mitigations.is_empty() {
        replace_mitigations(&tx, outcome.id(), &risk.mitigations)?;
    }

    tx.commit()?;
    Ok(outcome)
}

fn replace_mitigations(
    conn: &Connection,
    risk_id: &Uuid,
    mitigations: &[MitigationMeasure],
) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM mitigation_measures WHERE risk_id = ?1",
        params![risk_id.to_string()],
    )?;
    let mut stmt = conn.prepare(
        "INSERT INTO mitigation_measures (id, risk_id, description, responsible_party, due_date, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for m in mitigations {
        stmt.execute(params![
            m.id.to_string(),
            risk_id.to_string(),
            m.description,
            m.responsible_party,
            m.due_date,
            m.status.as_str(),
        ])?;
    }
    Ok(())
}

pub fn get_risk(conn: &Connection, id: &Uuid) -> Result<Option<Risk>, DatabaseError> {
    let mut stmt = conn.prepare(&format!("SELECT {RISK_COLUMNS} FROM risks WHERE id = ?1"))?;

    match stmt.query_row(params![id.to_string()], read_risk_row) {
        Ok(row) => Ok(Some(risk_from_row(conn, row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_risks_for_document(
    conn: &Connection,
    document_id: &Uuid,
) -> Result<Vec<Risk>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RISK_COLUMNS} FROM risks WHERE source_document_id = ?1 ORDER BY created_at, title"
    ))?;
    let rows = stmt
        .query_map(params![document_id.to_string()], read_risk_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(|row| risk_from_row(conn, row)).collect()
}

pub fn list_mitigations(
    conn: &Connection,
    risk_id: &Uuid,
) -> Result<Vec<MitigationMeasure>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, description, responsible_party, due_date, status
         FROM mitigation_measures WHERE risk_id = ?1 ORDER BY rowid",
    )?;
    let rows = stmt.query_map(params![risk_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Option<NaiveDate>>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, description, responsible_party, due_date, status) = row?;
        out.push(MitigationMeasure {
            id: parse_uuid(&id)?,
            description,
            responsible_party,
            due_date,
            status: MitigationStatus::from_str(&status)?,
        });
    }
    Ok(out)
}

/// Fields a reviewer may change on a suggested risk.
#[derive(Debug, Clone, Default)]
pub struct RiskEdit {
    pub description: Option<String>,
    pub probability: Option<Level>,
    pub impact: Option<Level>,
    pub status: Option<RiskStatus>,
}

/// Apply a human edit and stamp `human_edited_at`.
pub fn apply_human_risk_edit(
    conn: &Connection,
    id: &Uuid,
    edit: &RiskEdit,
    now: NaiveDateTime,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE risks SET
            description = COALESCE(?2, description),
            probability = COALESCE(?3, probability),
            impact = COALESCE(?4, impact),
            status = COALESCE(?5, status),
            human_edited_at = ?6,
            updated_at = ?6
         WHERE id = ?1",
        params![
            id.to_string(),
            edit.description,
            edit.probability.map(|l| l.as_str()),
            edit.impact.map(|l| l.as_str()),
            edit.status.map(|s| s.as_str()),
            now,
        ],
    )?;
    if rows == 0 {
        return Err(DatabaseError::not_found("Risk", id));
    }
    Ok(())
}

struct RiskRow {
    id: String,
    risk_id: String,
    title: String,
    description: String,
    category: String,
    probability: String,
    impact: String,
    status: String,
    identified_date: NaiveDate,
    source_document_id: String,
    ai_generated: i32,
    linked_rule_ids: String,
    last_ai_update: Option<NaiveDateTime>,
    human_edited_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

fn read_risk_row(row: &Row<'_>) -> rusqlite::Result<RiskRow> {
    Ok(RiskRow {
        id: row.get(0)?,
        risk_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        probability: row.get(5)?,
        impact: row.get(6)?,
        status: row.get(7)?,
        identified_date: row.get(8)?,
        source_document_id: row.get(9)?,
        ai_generated: row.get(10)?,
        linked_rule_ids: row.get(11)?,
        last_ai_update: row.get(12)?,
        human_edited_at: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn risk_from_row(conn: &Connection, row: RiskRow) -> Result<Risk, DatabaseError> {
    let id = parse_uuid(&row.id)?;
    Ok(Risk {
        mitigations: list_mitigations(conn, &id)?,
        id,
        risk_id: row.risk_id,
        title: row.title,
        description: row.description,
        category: row.category,
        probability: Level::from_str(&row.probability)?,
        impact: Level::from_str(&row.impact)?,
        status: RiskStatus::from_str(&row.status)?,
        identified_date: row.identified_date,
        source_document_id: parse_uuid(&row.source_document_id)?,
        ai_generated: row.ai_generated != 0,
        linked_rule_ids: serde_json::from_str(&row.linked_rule_ids).unwrap_or_default(),
        last_ai_update: row.last_ai_update,
        human_edited_at: row.human_edited_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
