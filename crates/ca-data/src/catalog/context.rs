//! Catalog Context
//!
//! Audited session over the catalog tables.

use std::sync::Arc;

use async_trait::async_trait;
use ca_config::AuditConfig;

use super::product::Product;
use crate::audit::{AuditRepository, AuditRow, AuditingSession};
use crate::error::SaveError;
use crate::model::{Entity, EntityModel};
use crate::session::{EntitySet, ExecutionContext, SaveOptions, Session, UnitOfWork};
use crate::store::Store;

/// Unit of work over `Products` with an audit trail in `Audits`.
///
/// ```ignore
/// let mut catalog = CatalogContext::new(store, config.audit.clone());
/// catalog.products().add(Product::new("Widget"))?;
/// catalog.save_changes(&ExecutionContext::create("alice"), SaveOptions::default()).await?;
/// ```
pub struct CatalogContext<S: Store> {
    inner: AuditingSession<S>,
}

impl<S: Store> CatalogContext<S> {
    pub fn new(store: Arc<S>, config: AuditConfig) -> Self {
        Self {
            inner: AuditingSession::new(Session::new(store), config),
        }
    }

    /// Models of every catalog table, for schema creation.
    pub fn models() -> Vec<&'static EntityModel> {
        vec![Product::model(), AuditRow::model()]
    }

    pub fn products(&mut self) -> EntitySet<'_, S, Product> {
        self.inner.session_mut().set()
    }

    pub fn audits(&mut self) -> EntitySet<'_, S, AuditRow> {
        self.inner.session_mut().set()
    }

    /// Untracked audit queries.
    pub fn audit_log(&self) -> AuditRepository<S> {
        AuditRepository::new(self.inner.session().store().clone())
    }

    pub fn session(&self) -> &Session<S> {
        self.inner.session()
    }

    pub fn session_mut(&mut self) -> &mut Session<S> {
        self.inner.session_mut()
    }

    pub fn auditing(&mut self) -> &mut AuditingSession<S> {
        &mut self.inner
    }
}

#[async_trait]
impl<S: Store + 'static> UnitOfWork for CatalogContext<S> {
    async fn save_changes(
        &mut self,
        ctx: &ExecutionContext,
        options: SaveOptions,
    ) -> Result<usize, SaveError> {
        self.inner.save_changes(ctx, options).await
    }
}
