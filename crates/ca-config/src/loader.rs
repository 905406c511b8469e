//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "catalog.toml",
    "./config/config.toml",
    "./config/catalog.toml",
    "/etc/catalog-audit/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    search_standard_paths: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            config_path: None,
            search_standard_paths: true,
        }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
            search_standard_paths: true,
        }
    }

    /// Only consult the explicit path and `CATALOG_CONFIG`
    pub fn without_search_paths(mut self) -> Self {
        self.search_standard_paths = false;
        self
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        self.load_with_env(|key| env::var(key).ok())
    }

    /// Same as [`load`](Self::load) but reads overrides through `lookup`.
    pub fn load_with_env<F>(&self, lookup: F) -> Result<AppConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file(&lookup) {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        apply_env_overrides(&mut config, &lookup);
        config.validate()?;

        Ok(config)
    }

    fn find_config_file<F>(&self, lookup: &F) -> Option<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Some(path) = lookup("CATALOG_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if !self.search_standard_paths {
            return None;
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_env_overrides<F>(config: &mut AppConfig, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    // Database
    if let Some(val) = lookup("CATALOG_DATABASE_URL") {
        config.database.url = val;
    }
    if let Some(val) = lookup("CATALOG_DATABASE_MAX_CONNECTIONS") {
        if let Ok(max) = val.parse() {
            config.database.max_connections = max;
        }
    }
    if let Some(val) = lookup("CATALOG_DATABASE_CREATE_SCHEMA") {
        config.database.create_schema = val.parse().unwrap_or(true);
    }

    // Audit
    if let Some(val) = lookup("CATALOG_AUDIT_ENABLED") {
        config.audit.enabled = val.parse().unwrap_or(true);
    }
    if let Some(val) = lookup("CATALOG_AUDIT_EXCLUDED_TABLES") {
        config.audit.excluded_tables = val
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    // General
    if let Some(val) = lookup("CATALOG_DEV_MODE") {
        config.dev_mode = val.parse().unwrap_or(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_load_defaults_without_file() {
        let config = ConfigLoader::with_path("/nonexistent/catalog.toml")
            .without_search_paths()
            .load_with_env(env_of(&[]))
            .unwrap();

        assert_eq!(config.database.url, "sqlite::memory:");
        assert!(config.audit.enabled);
    }

    #[test]
    fn test_load_from_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [database]
            url = "sqlite://catalog.db?mode=rwc"
            max_connections = 4

            [audit]
            enabled = false
            "#
        )
        .unwrap();

        let config = ConfigLoader::with_path(file.path())
            .without_search_paths()
            .load_with_env(env_of(&[]))
            .unwrap();

        assert_eq!(config.database.url, "sqlite://catalog.db?mode=rwc");
        assert_eq!(config.database.max_connections, 4);
        assert!(!config.audit.enabled);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[database]\nurl = \"sqlite://from-file.db\"").unwrap();

        let config = ConfigLoader::with_path(file.path())
            .without_search_paths()
            .load_with_env(env_of(&[
                ("CATALOG_DATABASE_URL", "sqlite://from-env.db"),
                ("CATALOG_AUDIT_EXCLUDED_TABLES", "Sessions, Tokens,,"),
                ("CATALOG_DEV_MODE", "true"),
            ]))
            .unwrap();

        assert_eq!(config.database.url, "sqlite://from-env.db");
        assert_eq!(config.audit.excluded_tables, vec!["Sessions", "Tokens"]);
        assert!(config.dev_mode);
    }

    #[test]
    fn test_config_path_from_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[audit]\nenabled = false").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = ConfigLoader::new()
            .without_search_paths()
            .load_with_env(env_of(&[("CATALOG_CONFIG", path.as_str())]))
            .unwrap();

        assert!(!config.audit.enabled);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let result = ConfigLoader::new()
            .without_search_paths()
            .load_with_env(env_of(&[("CATALOG_DATABASE_URL", "")]));

        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
