//! Audit Row Repository
//!
//! Untracked reads of the `Audits` table.

use std::sync::Arc;

use crate::error::Result;
use crate::model::{Entity, Row};
use crate::row;
use crate::store::Store;

use super::entity::AuditRow;

pub struct AuditRepository<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for AuditRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Store> AuditRepository<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<AuditRow>> {
        match self.store.find(AuditRow::model(), &row! { "id" => id }).await? {
            Some(row) => Ok(Some(AuditRow::model().from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Audit rows of one table, oldest first.
    pub async fn find_by_table(&self, table_name: &str) -> Result<Vec<AuditRow>> {
        self.find_where(&row! { "table_name" => table_name }).await
    }

    /// Audit rows of the entity stored in `table_name` under `key_values`,
    /// oldest first.
    pub async fn find_by_entity(&self, table_name: &str, key_values: &Row) -> Result<Vec<AuditRow>> {
        let mut matching = Vec::new();
        for audit in self.find_by_table(table_name).await? {
            if &audit.key_values_map()? == key_values {
                matching.push(audit);
            }
        }
        Ok(matching)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Vec<AuditRow>> {
        self.find_where(&row! { "username" => username }).await
    }

    /// The `limit` most recent audit rows, newest first.
    pub async fn find_recent(&self, limit: usize) -> Result<Vec<AuditRow>> {
        let mut all = self.find_where(&Row::new()).await?;
        all.reverse();
        all.truncate(limit);
        Ok(all)
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.store.scan(AuditRow::model(), &Row::new()).await?.len())
    }

    async fn find_where(&self, filter: &Row) -> Result<Vec<AuditRow>> {
        let model = AuditRow::model();
        self.store
            .scan(model, filter)
            .await?
            .iter()
            .map(|row| model.from_row(row))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, WriteCommand};

    async fn seed(store: &MemoryStore, entries: &[(&str, &str, Option<&str>)]) {
        let batch: Vec<WriteCommand> = entries
            .iter()
            .map(|(table, key, username)| WriteCommand::Insert {
                model: AuditRow::model(),
                values: row! {
                    "table_name" => table,
                    "action" => "Added",
                    "username" => username,
                    "date_time" => "2026-03-01T10:00:00Z",
                    "key_values" => key,
                },
            })
            .collect();
        store.execute(&batch).await.unwrap();
    }

    #[tokio::test]
    async fn test_queries() {
        let store = Arc::new(MemoryStore::new());
        seed(
            &store,
            &[
                ("Products", r#"{"id":1}"#, Some("alice")),
                ("Products", r#"{"id":2}"#, None),
                ("Orders", r#"{"id":1}"#, Some("alice")),
                ("Products", r#"{"id":1}"#, Some("bob")),
            ],
        )
        .await;
        let repo = AuditRepository::new(store);

        assert_eq!(repo.count().await.unwrap(), 4);
        assert_eq!(repo.find_by_table("Products").await.unwrap().len(), 3);
        assert_eq!(repo.find_by_username("alice").await.unwrap().len(), 2);

        let history = repo.find_by_entity("Products", &row! { "id" => 1 }).await.unwrap();
        let ids: Vec<i64> = history.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 4]);

        let recent = repo.find_recent(2).await.unwrap();
        let ids: Vec<i64> = recent.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![4, 3]);

        let first = repo.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(first.username.as_deref(), Some("alice"));
        assert!(first.old_values.is_none());
        assert!(repo.find_by_id(99).await.unwrap().is_none());
    }
}
