//! Execution Context
//!
//! Carries tracing IDs and the acting principal through one commit. The
//! audit interceptor reads the username from here instead of from ambient
//! request state.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Context for one unit-of-work execution.
///
/// The execution context enables:
/// - Distributed tracing via correlation_id
/// - Audit trail via principal
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Unique ID for this execution (generated)
    pub execution_id: String,
    /// ID for distributed tracing (usually from original request)
    pub correlation_id: String,
    /// Name of the user performing the action, if known
    pub principal: Option<String>,
    /// When the execution was initiated
    pub initiated_at: DateTime<Utc>,
}

impl ExecutionContext {
    /// Create a context for a fresh request made by `principal`.
    ///
    /// The correlation_id starts out equal to the execution_id.
    pub fn create(principal: impl Into<String>) -> Self {
        Self::new(Some(principal.into()))
    }

    /// Create a context with no known principal.
    pub fn anonymous() -> Self {
        Self::new(None)
    }

    fn new(principal: Option<String>) -> Self {
        let exec_id = format!("exec-{}", Uuid::new_v4());
        Self {
            execution_id: exec_id.clone(),
            correlation_id: exec_id,
            principal,
            initiated_at: Utc::now(),
        }
    }

    /// Use an upstream correlation ID.
    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Same execution, different principal.
    pub fn with_principal(&self, principal: impl Into<String>) -> Self {
        Self {
            principal: Some(principal.into()),
            ..self.clone()
        }
    }

    pub fn without_principal(&self) -> Self {
        Self {
            principal: None,
            ..self.clone()
        }
    }

    /// The acting username, exactly as it was supplied.
    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::anonymous()
    }
}
