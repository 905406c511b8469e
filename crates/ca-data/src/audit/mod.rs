//! Audit Trail
//!
//! Commit interception that records one `Audits` row per changed entity.

pub mod entity;
pub mod interceptor;
pub mod record;
pub mod repository;

// Re-export main types
pub use entity::{AuditAction, AuditRow};
pub use interceptor::AuditingSession;
pub use record::ChangeRecord;
pub use repository::AuditRepository;
