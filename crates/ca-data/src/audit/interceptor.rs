//! Audit Interceptor
//!
//! Wraps a [`Session`] commit in three phases:
//!
//! 1. [`snapshot_changes`](AuditingSession::snapshot_changes) captures one
//!    [`ChangeRecord`] per pending entry, deferring store-generated columns
//! 2. [`commit_data`](AuditingSession::commit_data) runs the wrapped commit
//! 3. [`finalize_and_persist`](AuditingSession::finalize_and_persist) fills
//!    the deferred columns from the committed entries and writes the
//!    `Audits` rows in a second commit
//!
//! The two commits are separate store batches. If the second one fails the
//! data stays committed and the caller gets [`SaveError::AuditNotWritten`].
//! Audit rows never enter the first batch, and they are detached once
//! written.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use ca_config::AuditConfig;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::entity::AuditRow;
use super::record::ChangeRecord;
use crate::error::{Result, SaveError};
use crate::session::{ExecutionContext, SaveOptions, Session, Tracked, UnitOfWork};
use crate::store::Store;
use crate::tracking::EntryId;

pub struct AuditingSession<S: Store> {
    session: Session<S>,
    config: AuditConfig,
    /// Audit rows whose commit has not finished. Non-empty only after a
    /// save was dropped during its audit commit.
    in_flight: Vec<Tracked<AuditRow>>,
}

impl<S: Store> AuditingSession<S> {
    pub fn new(session: Session<S>, config: AuditConfig) -> Self {
        Self {
            session,
            config,
            in_flight: Vec::new(),
        }
    }

    /// Audit every table of a fresh session over `store`.
    pub fn with_store(store: Arc<S>) -> Self {
        Self::new(Session::new(store), AuditConfig::default())
    }

    pub fn session(&self) -> &Session<S> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<S> {
        &mut self.session
    }

    pub fn into_inner(self) -> Session<S> {
        self.session
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Capture the pending changes in tracking order.
    ///
    /// Audit rows, unchanged entries and excluded tables are skipped.
    /// Audit rows left over from an interrupted save are discarded first.
    pub fn snapshot_changes(&mut self, ctx: &ExecutionContext) -> Result<Vec<ChangeRecord>> {
        self.discard_interrupted_audits();
        self.session.detect_changes()?;

        let config = &self.config;
        let records: Vec<ChangeRecord> = self
            .session
            .tracker()
            .entries()
            .filter(|e| !e.is::<AuditRow>())
            .filter(|e| !config.is_excluded(e.table_name()))
            .filter_map(|e| ChangeRecord::from_entry(e, ctx))
            .collect();

        debug!(
            records = records.len(),
            pending_generation = records.iter().filter(|r| r.has_pending_columns()).count(),
            "Captured change snapshot"
        );
        Ok(records)
    }

    /// Run the wrapped commit over every pending entry except audit rows.
    pub async fn commit_data(&mut self, ctx: &ExecutionContext, options: SaveOptions) -> Result<usize> {
        let rows = self
            .session
            .commit_where(options, |e| !e.is::<AuditRow>())
            .await?;
        debug!(execution_id = %ctx.execution_id, rows, "Committed entity changes");
        Ok(rows)
    }

    /// Resolve deferred columns and write one audit row per record.
    ///
    /// Only the new audit rows are flushed. Written or not, they are detached
    /// afterwards, so the session never carries past audits. Returns the
    /// number of audit rows written.
    pub async fn finalize_and_persist(&mut self, records: Vec<ChangeRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut audits = Vec::with_capacity(records.len());
        for mut record in records {
            record.resolve_pending(self.session.tracker().entry(record.entry));
            audits.push(record.to_audit()?);
        }

        let mut handles = Vec::with_capacity(audits.len());
        for audit in audits {
            match self.session.add(audit) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    handles.into_iter().for_each(|h| self.session.detach(h));
                    return Err(e);
                }
            }
        }

        let ids: HashSet<EntryId> = handles.iter().map(|h| h.id()).collect();
        self.in_flight = handles;
        let result = self
            .session
            .commit_where(SaveOptions::default(), move |e| ids.contains(&e.id()))
            .await;

        for handle in self.in_flight.drain(..) {
            self.session.detach(handle);
        }
        if let Ok(rows) = result {
            info!(audit_rows = rows, "Persisted audit trail");
        }
        result
    }

    fn discard_interrupted_audits(&mut self) {
        if self.in_flight.is_empty() {
            return;
        }
        warn!(
            audit_rows = self.in_flight.len(),
            "Discarding audit rows of an interrupted save"
        );
        for handle in self.in_flight.drain(..) {
            self.session.detach(handle);
        }
    }
}

#[async_trait]
impl<S: Store + 'static> UnitOfWork for AuditingSession<S> {
    async fn save_changes(
        &mut self,
        ctx: &ExecutionContext,
        options: SaveOptions,
    ) -> std::result::Result<usize, SaveError> {
        let span = info_span!(
            "audited_save",
            execution_id = %ctx.execution_id,
            correlation_id = %ctx.correlation_id,
        );

        async move {
            if !self.config.enabled {
                return self.session.commit(options).await.map_err(SaveError::Commit);
            }

            let records = self.snapshot_changes(ctx).map_err(SaveError::Commit)?;
            let rows_affected = self.commit_data(ctx, options).await.map_err(SaveError::Commit)?;

            match self.finalize_and_persist(records).await {
                Ok(_) => Ok(rows_affected),
                Err(source) => {
                    error!(
                        rows_affected,
                        error = %source,
                        "Entity changes committed but audit rows were not written"
                    );
                    Err(SaveError::AuditNotWritten {
                        rows_affected,
                        source,
                    })
                }
            }
        }
        .instrument(span)
        .await
    }
}
