//! Structured Logging
//!
//! Installs the global `tracing` subscriber for Catalog Audit processes:
//! - JSON lines when `LOG_FORMAT=json` (log shipping)
//! - compact human-readable text otherwise
//!
//! `RUST_LOG` controls filtering and defaults to `info`, for example
//! `RUST_LOG=ca_data=debug` to see every snapshot and store batch.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ca_common::logging::init_logging;
//!
//! #[tokio::main]
//! async fn main() {
//!     init_logging("ca-dev");
//!     tracing::info!(table = "Products", "Schema ready");
//! }
//! ```

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Output format selected from `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    /// Anything other than `json` (case-insensitive) means text.
    pub fn from_env_value(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }

    fn from_env() -> Self {
        Self::from_env_value(&std::env::var("LOG_FORMAT").unwrap_or_default())
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize logging for the named service.
///
/// Panics if a global subscriber is already installed, like
/// `tracing_subscriber`'s own `init`.
pub fn init_logging(service_name: &str) {
    match LogFormat::from_env() {
        LogFormat::Json => init_json_logging(env_filter()),
        LogFormat::Text => init_text_logging(env_filter()),
    }

    tracing::debug!(service = service_name, "Logging initialized");
}

fn init_json_logging(env_filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .flatten_event(true)
                .with_span_events(FmtSpan::CLOSE),
        )
        .init();
}

fn init_text_logging(env_filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(true),
        )
        .init();
}

/// Initialize logging with the workspace's default service name.
pub fn init_default_logging() {
    init_logging("catalog-audit");
}

/// Route logs through the test harness' captured output.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_test_writer().with_target(true))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_env_value() {
        assert_eq!(LogFormat::from_env_value("json"), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value("text"), LogFormat::Text);
        assert_eq!(LogFormat::from_env_value(""), LogFormat::Text);
    }

    #[test]
    fn test_init_test_logging_is_idempotent() {
        init_test_logging();
        init_test_logging();
        tracing::info!("still logging");
    }
}
