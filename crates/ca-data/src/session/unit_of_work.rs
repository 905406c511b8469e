//! Unit of Work
//!
//! The commit contract shared by a plain [`Session`] and the auditing
//! wrapper around it.

use async_trait::async_trait;

use super::{ExecutionContext, Session};
use crate::error::SaveError;
use crate::store::Store;

/// Options of one commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Mark committed entries as Unchanged (and forget deleted ones) once
    /// storage accepts the batch. When false the entries keep their
    /// pending state and the caller accepts them later.
    pub accept_all_changes_on_success: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            accept_all_changes_on_success: true,
        }
    }
}

impl SaveOptions {
    pub fn keep_changes() -> Self {
        Self {
            accept_all_changes_on_success: false,
        }
    }
}

/// Flushes pending entity changes in one atomic store batch.
///
/// ```ignore
/// let ctx = ExecutionContext::create("alice");
/// catalog.products().add(Product::new("Widget"))?;
/// let rows = catalog.save_changes(&ctx, SaveOptions::default()).await?;
/// ```
#[async_trait]
pub trait UnitOfWork: Send {
    /// Commit every pending change. Returns the number of entity rows
    /// written.
    async fn save_changes(
        &mut self,
        ctx: &ExecutionContext,
        options: SaveOptions,
    ) -> Result<usize, SaveError>;
}

#[async_trait]
impl<S: Store + 'static> UnitOfWork for Session<S> {
    async fn save_changes(
        &mut self,
        ctx: &ExecutionContext,
        options: SaveOptions,
    ) -> Result<usize, SaveError> {
        tracing::debug!(execution_id = %ctx.execution_id, "Saving session changes");
        self.commit(options).await.map_err(SaveError::Commit)
    }
}
