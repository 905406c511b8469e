//! Change Record
//!
//! The in-flight description of one entity mutation, captured before the
//! commit and turned into an [`AuditRow`] after it.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use super::entity::{AuditAction, AuditRow};
use crate::model::{ColumnDef, Row};
use crate::session::ExecutionContext;
use crate::tracking::{EntryId, TrackedEntry};

#[derive(Debug, Clone)]
pub struct ChangeRecord {
    /// Entry the record was captured from
    pub entry: EntryId,
    pub table_name: String,
    pub action: AuditAction,
    pub username: Option<String>,
    pub key_values: Row,
    pub old_values: Row,
    pub new_values: Row,
    /// Columns the database assigns on insert, resolved after the commit
    pub pending_columns: Vec<&'static ColumnDef>,
    pub recorded_at: DateTime<Utc>,
}

impl ChangeRecord {
    /// Capture an entry's pending change. `None` when the entry has nothing
    /// to write.
    pub fn from_entry(entry: &TrackedEntry, ctx: &ExecutionContext) -> Option<Self> {
        let action = AuditAction::from_state(entry.state())?;

        let mut record = ChangeRecord {
            entry: entry.id(),
            table_name: entry.table_name().to_string(),
            action,
            username: ctx.principal().map(str::to_string),
            key_values: Row::new(),
            old_values: Row::new(),
            new_values: Row::new(),
            pending_columns: Vec::new(),
            recorded_at: Utc::now(),
        };

        for property in entry.properties() {
            let name = property.name().to_string();

            if property.is_pending_generation {
                record.pending_columns.push(property.column);
                continue;
            }

            if property.is_primary_key() {
                record.key_values.insert(name, property.current_value.clone());
                continue;
            }

            match action {
                AuditAction::Added => {
                    record.new_values.insert(name, property.current_value.clone());
                }
                AuditAction::Deleted => {
                    record.old_values.insert(name, property.original_value.clone());
                }
                AuditAction::Modified => {
                    if property.is_modified {
                        record.old_values.insert(name.clone(), property.original_value.clone());
                        record.new_values.insert(name, property.current_value.clone());
                    }
                }
            }
        }

        Some(record)
    }

    pub fn has_pending_columns(&self) -> bool {
        !self.pending_columns.is_empty()
    }

    /// Fill pending columns from the entry's post-commit values.
    ///
    /// Key columns go to `key_values`, the rest to `new_values`. A value the
    /// store did not resolve is recorded as null.
    pub fn resolve_pending(&mut self, entry: Option<&TrackedEntry>) {
        for column in self.pending_columns.drain(..) {
            let value = entry
                .map(|e| e.current_value(column.name).clone())
                .filter(|v| !column.is_unset(v))
                .unwrap_or_else(|| {
                    warn!(
                        table = %self.table_name,
                        column = column.name,
                        "Generated value was not resolved, auditing null"
                    );
                    Value::Null
                });

            if column.primary_key {
                self.key_values.insert(column.name.to_string(), value);
            } else {
                self.new_values.insert(column.name.to_string(), value);
            }
        }
    }

    /// Build the row persisted for this record.
    pub fn to_audit(&self) -> serde_json::Result<AuditRow> {
        Ok(AuditRow {
            id: 0,
            table_name: self.table_name.clone(),
            action: self.action.to_string(),
            username: self.username.clone(),
            date_time: self.recorded_at,
            key_values: serde_json::to_string(&self.key_values)?,
            old_values: encode_optional(&self.old_values)?,
            new_values: encode_optional(&self.new_values)?,
        })
    }
}

fn encode_optional(values: &Row) -> serde_json::Result<Option<String>> {
    if values.is_empty() {
        Ok(None)
    } else {
        serde_json::to_string(values).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Product;
    use crate::tracking::{ChangeTracker, EntityState};
    use serde_json::json;

    #[test]
    fn test_added_record_defers_generated_key() {
        let mut tracker = ChangeTracker::new();
        let id = tracker.track(Product::new("Widget"), EntityState::Added).unwrap();
        let ctx = ExecutionContext::create("alice");

        let record = ChangeRecord::from_entry(tracker.entry(id).unwrap(), &ctx).unwrap();

        assert_eq!(record.action, AuditAction::Added);
        assert_eq!(record.username.as_deref(), Some("alice"));
        assert!(record.key_values.is_empty());
        assert!(record.old_values.is_empty());
        assert_eq!(record.new_values, crate::row! { "name" => "Widget", "price" => 0.0 });
        assert_eq!(record.pending_columns.len(), 1);
        assert_eq!(record.pending_columns[0].name, "id");
    }

    #[test]
    fn test_deleted_record_keeps_original_values() {
        let mut tracker = ChangeTracker::new();
        let product = Product { id: 3, name: "Widget".to_string(), price: 10.0 };
        let id = tracker.track(product, EntityState::Unchanged).unwrap();
        tracker.remove(id).unwrap();

        let record = ChangeRecord::from_entry(tracker.entry(id).unwrap(), &ExecutionContext::anonymous()).unwrap();

        assert_eq!(record.action, AuditAction::Deleted);
        assert_eq!(record.username, None);
        assert_eq!(record.key_values, crate::row! { "id" => 3 });
        assert_eq!(record.old_values, crate::row! { "name" => "Widget", "price" => 10.0 });
        assert!(record.new_values.is_empty());
        assert!(!record.has_pending_columns());
    }

    #[test]
    fn test_unchanged_entry_has_no_record() {
        let mut tracker = ChangeTracker::new();
        let id = tracker.track(Product::new("Widget").with_price(1.0), EntityState::Unchanged).unwrap();
        assert!(ChangeRecord::from_entry(tracker.entry(id).unwrap(), &ExecutionContext::anonymous()).is_none());
    }

    #[test]
    fn test_unresolved_key_is_audited_as_null() {
        let mut tracker = ChangeTracker::new();
        let id = tracker.track(Product::new("Widget"), EntityState::Added).unwrap();
        let mut record = ChangeRecord::from_entry(tracker.entry(id).unwrap(), &ExecutionContext::anonymous()).unwrap();

        record.resolve_pending(tracker.entry(id));

        assert_eq!(record.key_values, crate::row! { "id" => Value::Null });
        assert!(!record.has_pending_columns());
    }

    #[test]
    fn test_to_audit_omits_empty_maps() {
        let mut tracker = ChangeTracker::new();
        let id = tracker.track(Product::new("Widget"), EntityState::Added).unwrap();
        let mut record = ChangeRecord::from_entry(tracker.entry(id).unwrap(), &ExecutionContext::anonymous()).unwrap();
        record.key_values.insert("id".to_string(), json!(12));

        let audit = record.to_audit().unwrap();
        assert_eq!(audit.table_name, "Products");
        assert_eq!(audit.action, "Added");
        assert_eq!(audit.key_values, r#"{"id":12}"#);
        assert_eq!(audit.old_values, None);
        assert_eq!(audit.new_values.as_deref(), Some(r#"{"name":"Widget","price":0.0}"#));
    }
}
