//! Storage Backends
//!
//! A [`Store`] applies batches of row-level write commands atomically and
//! answers key lookups and equality scans. Two implementations ship:
//! [`MemoryStore`] for tests and local development, and `SqliteStore`
//! (feature `sqlite`) backed by a sqlx pool.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{EntityModel, Row};

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// One row-level write.
#[derive(Debug, Clone)]
pub enum WriteCommand {
    /// Insert `values`. Unset generated columns are left out and assigned
    /// by the store.
    Insert {
        model: &'static EntityModel,
        values: Row,
    },
    /// Set `values` on the row identified by `key`
    Update {
        model: &'static EntityModel,
        key: Row,
        values: Row,
    },
    Delete {
        model: &'static EntityModel,
        key: Row,
    },
}

impl WriteCommand {
    pub fn model(&self) -> &'static EntityModel {
        match self {
            WriteCommand::Insert { model, .. }
            | WriteCommand::Update { model, .. }
            | WriteCommand::Delete { model, .. } => *model,
        }
    }

    pub fn table_name(&self) -> &'static str {
        self.model().table_name
    }
}

/// Outcome of one command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteResult {
    pub rows_affected: u64,
    /// Store-assigned values of generated columns (inserts only)
    pub generated: Row,
}

/// Row storage used by sessions.
#[async_trait]
pub trait Store: Send + Sync {
    /// Apply every command or none. Results line up with `batch`.
    ///
    /// An update or delete that affects no row fails the whole batch with
    /// [`StoreError::Concurrency`](crate::StoreError::Concurrency).
    async fn execute(&self, batch: &[WriteCommand]) -> Result<Vec<WriteResult>>;

    /// Row stored under the primary key `key`.
    async fn find(&self, model: &'static EntityModel, key: &Row) -> Result<Option<Row>>;

    /// Rows whose columns equal every value in `filter`, ordered by
    /// primary key. An empty filter returns the whole table.
    async fn scan(&self, model: &'static EntityModel, filter: &Row) -> Result<Vec<Row>>;
}
