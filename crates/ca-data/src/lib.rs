//! Catalog Audit Data Layer
//!
//! A small change-tracking unit of work with an audit trail interceptor:
//!
//! - [`model`] - static per-type entity metadata (`Entity`, `EntityModel`, `ColumnDef`)
//! - [`tracking`] - change tracker with entry states and property views
//! - [`store`] - storage backends (in-memory, SQLite via sqlx)
//! - [`session`] - the unit of work: `Session`, `EntitySet`, `UnitOfWork`
//! - [`audit`] - snapshot / commit / persist audit interceptor and audit queries
//! - [`catalog`] - the `Products` catalog with its `Audits` trail

pub mod error;
pub mod model;
pub mod tracking;
pub mod store;
pub mod session;
pub mod audit;
pub mod catalog;

pub use error::{Result, SaveError, StoreError};
pub use model::{ColumnDef, ColumnType, Entity, EntityModel, Row, ValueGenerated};
pub use tracking::{ChangeTracker, EntityState, EntryId, PropertyEntry, TrackedEntry};
pub use store::{MemoryStore, Store, WriteCommand, WriteResult};
#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
pub use session::{EntitySet, ExecutionContext, SaveOptions, Session, Tracked, UnitOfWork};
pub use audit::{AuditAction, AuditRepository, AuditRow, AuditingSession, ChangeRecord};
pub use catalog::{CatalogContext, Product};

pub use ca_config::AuditConfig;

#[doc(hidden)]
pub use serde_json as __serde_json;
