//! Data Layer Error Types

use thiserror::Error;

/// Failure of a storage or change-tracking operation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Constraint violation on {table}: {message}")]
    Constraint { table: String, message: String },

    #[error("Concurrency conflict on {table}: expected {expected} row(s), affected {actual}")]
    Concurrency {
        table: String,
        expected: u64,
        actual: u64,
    },

    #[error("Unknown column {column} on {table}")]
    UnknownColumn { table: String, column: String },

    #[error("Writes to {table} were rejected")]
    Rejected { table: String },

    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    /// The store applied the batch but the session could not take in every
    /// result. The rows are durable.
    #[error("Batch committed ({rows_affected} rows) but its results were not applied: {message}")]
    Unreconciled { rows_affected: usize, message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn constraint(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Constraint {
            table: table.into(),
            message: message.into(),
        }
    }

    pub fn concurrency(table: impl Into<String>, actual: u64) -> Self {
        Self::Concurrency {
            table: table.into(),
            expected: 1,
            actual,
        }
    }

    pub fn unknown_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::UnknownColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Failure of an audited commit.
///
/// The two variants are not symmetric: `Commit` means nothing was written,
/// `AuditNotWritten` means the data is durable but its audit rows are not.
#[derive(Error, Debug)]
pub enum SaveError {
    #[error("Commit failed: {0}")]
    Commit(#[source] StoreError),

    #[error("Data committed ({rows_affected} rows) but the audit trail was not written: {source}")]
    AuditNotWritten {
        rows_affected: usize,
        #[source]
        source: StoreError,
    },
}

impl SaveError {
    /// True when the primary data reached storage despite the error.
    pub fn is_data_committed(&self) -> bool {
        matches!(
            self,
            SaveError::AuditNotWritten { .. } | SaveError::Commit(StoreError::Unreconciled { .. })
        )
    }

    pub fn store_error(&self) -> &StoreError {
        match self {
            SaveError::Commit(e) => e,
            SaveError::AuditNotWritten { source, .. } => source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_error_is_not_committed() {
        let err = SaveError::Commit(StoreError::constraint("Products", "UNIQUE constraint failed"));
        assert!(!err.is_data_committed());
        assert!(matches!(err.store_error(), StoreError::Constraint { .. }));
        assert_eq!(
            err.to_string(),
            "Commit failed: Constraint violation on Products: UNIQUE constraint failed"
        );
    }

    #[test]
    fn test_unreconciled_commit_is_committed() {
        let err = SaveError::Commit(StoreError::Unreconciled {
            rows_affected: 3,
            message: "bad generated value".to_string(),
        });
        assert!(err.is_data_committed());
    }

    #[test]
    fn test_audit_error_reports_committed_rows() {
        let err = SaveError::AuditNotWritten {
            rows_affected: 2,
            source: StoreError::Rejected { table: "Audits".to_string() },
        };
        assert!(err.is_data_committed());
        assert!(err.to_string().contains("2 rows"));
    }
}
