//! Audit Row Entity
//!
//! One persisted row per entity mutation, stored in the `Audits` table.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ColumnDef, ColumnType, Entity, EntityModel, Row};
use crate::tracking::EntityState;

/// Audit action type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    /// Entity inserted
    Added,
    /// Entity updated
    Modified,
    /// Entity deleted
    Deleted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Added => "Added",
            AuditAction::Modified => "Modified",
            AuditAction::Deleted => "Deleted",
        }
    }

    /// Action for an entry state; `None` for states that write nothing.
    pub fn from_state(state: EntityState) -> Option<Self> {
        match state {
            EntityState::Added => Some(AuditAction::Added),
            EntityState::Modified => Some(AuditAction::Modified),
            EntityState::Deleted => Some(AuditAction::Deleted),
            EntityState::Unchanged | EntityState::Detached => None,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Added" => Ok(AuditAction::Added),
            "Modified" => Ok(AuditAction::Modified),
            "Deleted" => Ok(AuditAction::Deleted),
            other => Err(format!("unknown audit action: {}", other)),
        }
    }
}

/// Audit row (table `Audits`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRow {
    /// Assigned by the database
    pub id: i64,

    /// Table of the changed entity (e.g., "Products")
    pub table_name: String,

    /// `Added`, `Modified` or `Deleted`
    pub action: String,

    /// User who made the change
    pub username: Option<String>,

    /// When the change was captured
    pub date_time: DateTime<Utc>,

    /// Primary key as a JSON object
    pub key_values: String,

    /// Values before the change as a JSON object; absent when empty
    pub old_values: Option<String>,

    /// Values after the change as a JSON object; absent when empty
    pub new_values: Option<String>,
}

static AUDIT_MODEL: EntityModel = EntityModel {
    table_name: "Audits",
    columns: &[
        ColumnDef::key("id", ColumnType::Integer).generated_on_add(),
        ColumnDef::new("table_name", ColumnType::Text),
        ColumnDef::new("action", ColumnType::Text),
        ColumnDef::new("username", ColumnType::Text).nullable(),
        ColumnDef::new("date_time", ColumnType::Timestamp),
        ColumnDef::new("key_values", ColumnType::Text),
        ColumnDef::new("old_values", ColumnType::Text).nullable(),
        ColumnDef::new("new_values", ColumnType::Text).nullable(),
    ],
};

impl Entity for AuditRow {
    fn model() -> &'static EntityModel {
        &AUDIT_MODEL
    }
}

impl AuditRow {
    pub fn audit_action(&self) -> Option<AuditAction> {
        self.action.parse().ok()
    }

    pub fn key_values_map(&self) -> serde_json::Result<Row> {
        serde_json::from_str(&self.key_values)
    }

    pub fn old_values_map(&self) -> serde_json::Result<Row> {
        decode_optional(self.old_values.as_deref())
    }

    pub fn new_values_map(&self) -> serde_json::Result<Row> {
        decode_optional(self.new_values.as_deref())
    }
}

fn decode_optional(json: Option<&str>) -> serde_json::Result<Row> {
    match json {
        Some(json) => serde_json::from_str(json),
        None => Ok(Row::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> AuditRow {
        AuditRow {
            id: 1,
            table_name: "Products".to_string(),
            action: "Modified".to_string(),
            username: Some("alice".to_string()),
            date_time: Utc::now(),
            key_values: r#"{"id":4}"#.to_string(),
            old_values: Some(r#"{"price":10.0,"name":"Widget"}"#.to_string()),
            new_values: None,
        }
    }

    #[test]
    fn test_action_names() {
        assert_eq!(AuditAction::from_state(EntityState::Deleted), Some(AuditAction::Deleted));
        assert_eq!(AuditAction::from_state(EntityState::Unchanged), None);
        assert_eq!("Added".parse::<AuditAction>().unwrap(), AuditAction::Added);
        assert!("Created".parse::<AuditAction>().is_err());
        assert_eq!(sample().audit_action(), Some(AuditAction::Modified));
    }

    #[test]
    fn test_maps_decode_in_stored_order() {
        let row = sample();
        assert_eq!(row.key_values_map().unwrap()["id"], json!(4));

        let old = row.old_values_map().unwrap();
        assert_eq!(old.keys().collect::<Vec<_>>(), vec!["price", "name"]);
        assert!(row.new_values_map().unwrap().is_empty());
    }

    #[test]
    fn test_audit_row_converts_to_model_row() {
        let row = AuditRow::model().to_row(&sample()).unwrap();
        assert_eq!(row.len(), AuditRow::model().columns.len());
        assert_eq!(row["new_values"], serde_json::Value::Null);
        assert!(row["date_time"].is_string());
    }
}
