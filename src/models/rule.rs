use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{Level, RuleStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    /// User-facing identifier, e.g. `RULE-3F2A9C01B7D4`.
    pub rule_id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub priority: Level,
    pub status: RuleStatus,
    pub tags: Vec<String>,
    pub source_document_id: Uuid,
    pub ai_generated: bool,
    pub last_ai_update: Option<NaiveDateTime>,
    pub human_edited_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
