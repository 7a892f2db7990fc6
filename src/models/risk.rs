use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{Level, MitigationStatus, RiskStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Risk {
    pub id: Uuid,
    pub risk_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub probability: Level,
    pub impact: Level,
    pub status: RiskStatus,
    pub identified_date: NaiveDate,
    pub source_document_id: Uuid,
    pub ai_generated: bool,
    pub linked_rule_ids: Vec<Uuid>,
    pub mitigations: Vec<MitigationMeasure>,
    pub last_ai_update: Option<NaiveDateTime>,
    pub human_edited_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A planned action owned by a risk; deleted with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MitigationMeasure {
    pub id: Uuid,
    pub description: String,
    pub responsible_party: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub status: MitigationStatus,
}
