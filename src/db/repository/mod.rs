//! Repository layer: entity-scoped database operations as free functions
//! over a borrowed `Connection`.

mod document;
mod risk;
mod rule;
mod vector;
mod version;

use std::collections::BTreeSet;

use serde::Serialize;
use uuid::Uuid;

use super::DatabaseError;
use crate::models::enums::Role;

pub use document::*;
pub use risk::*;
pub use rule::*;
pub use vector::*;
pub use version::*;

/// Result of merging one suggested record into its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "id", rename_all = "snake_case")]
pub enum MergeOutcome {
    Created(Uuid),
    Updated(Uuid),
    /// A human-edited record was kept as is.
    Preserved(Uuid),
}

impl MergeOutcome {
    pub fn id(&self) -> &Uuid {
        match self {
            Self::Created(id) | Self::Updated(id) | Self::Preserved(id) => id,
        }
    }
}

/// Dedup key for names and titles: trimmed, inner whitespace collapsed, lower-cased.
pub fn natural_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub(crate) fn roles_to_json(roles: &BTreeSet<Role>) -> Result<String, DatabaseError> {
    serde_json::to_string(roles).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub(crate) fn roles_from_json(raw: &str) -> Result<BTreeSet<Role>, DatabaseError> {
    serde_json::from_str(raw).map_err(|_| DatabaseError::InvalidEnum {
        field: "Role".into(),
        value: raw.into(),
    })
}
