//! Catalog Audit Configuration
//!
//! TOML-based configuration with environment variable overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub audit: AuditConfig,

    /// Enable development mode
    pub dev_mode: bool,
}

/// Storage connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL, e.g. `sqlite::memory:` or `sqlite://catalog.db?mode=rwc`
    pub url: String,
    pub max_connections: u32,
    /// Create missing tables on startup
    pub create_schema: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            // A second connection to `sqlite::memory:` would see a different database.
            max_connections: 1,
            create_schema: true,
        }
    }
}

/// Audit interceptor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// When false, commits are passed straight through without an audit trail
    pub enabled: bool,
    /// Tables whose changes are never audited
    pub excluded_tables: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            excluded_tables: Vec::new(),
        }
    }
}

impl AuditConfig {
    pub fn is_excluded(&self, table_name: &str) -> bool {
        self.excluded_tables.iter().any(|t| t == table_name)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the data layer cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database.url must not be empty".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.audit.excluded_tables.iter().any(|t| t.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "audit.excluded_tables must not contain blank names".to_string(),
            ));
        }
        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# Catalog Audit Configuration
# Environment variables override these settings

[database]
url = "sqlite::memory:"
max_connections = 1
create_schema = true

[audit]
enabled = true
excluded_tables = []

dev_mode = false
"#
        .to_string()
    }
}
