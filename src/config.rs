use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::audit::logger::{DEFAULT_EXPORT_LIMIT, DEFAULT_QUERY_LIMIT};
use crate::audit::store::StoreOptions;
use crate::error::AuditResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    pub database_url: String,
    pub default_query_limit: u32,
    pub export_limit: u32,
    pub busy_timeout_secs: u64,
    pub max_connections: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://governance_audit.db".to_string(),
            default_query_limit: DEFAULT_QUERY_LIMIT,
            export_limit: DEFAULT_EXPORT_LIMIT,
            busy_timeout_secs: 5,
            max_connections: 4,
        }
    }
}

impl AuditConfig {
    pub const ENV_PREFIX: &'static str = "GOVERNANCE_AUDIT";

    /// Defaults overridden by `GOVERNANCE_AUDIT_*` environment variables
    pub fn load() -> AuditResult<Self> {
        Self::load_from(None)
    }

    /// Defaults, then the given TOML file, then `GOVERNANCE_AUDIT_*` environment variables
    pub fn load_from(path: Option<&Path>) -> AuditResult<Self> {
        let defaults = Self::default();

        let mut builder = Config::builder()
            .set_default("database_url", defaults.database_url)?
            .set_default("default_query_limit", i64::from(defaults.default_query_limit))?
            .set_default("export_limit", i64::from(defaults.export_limit))?
            .set_default("busy_timeout_secs", defaults.busy_timeout_secs as i64)?
            .set_default("max_connections", i64::from(defaults.max_connections))?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(Environment::with_prefix(Self::ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: self.busy_timeout(),
            max_connections: self.max_connections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuditError;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = AuditConfig::default();
        assert_eq!(config.default_query_limit, 100);
        assert_eq!(config.export_limit, 1000);
        assert_eq!(config.store_options().busy_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("audit.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "database_url = \"sqlite://custom.db\"").unwrap();
        writeln!(file, "export_limit = 50").unwrap();

        let config = AuditConfig::load_from(Some(path.as_path())).unwrap();
        assert_eq!(config.database_url, "sqlite://custom.db");
        assert_eq!(config.export_limit, 50);
        assert_eq!(config.busy_timeout_secs, 5);
    }

    #[test]
    fn test_missing_file_is_a_config_error() {
        let temp_dir = tempdir().unwrap();
        let missing = temp_dir.path().join("missing.toml");
        let err = AuditConfig::load_from(Some(missing.as_path())).unwrap_err();
        assert!(matches!(err, AuditError::Config(_)));
    }

    #[test]
    fn test_invalid_value_is_a_config_error() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("audit.toml");
        std::fs::write(&path, "default_query_limit = \"lots\"\n").unwrap();

        let err = AuditConfig::load_from(Some(path.as_path())).unwrap_err();
        assert!(matches!(err, AuditError::Config(_)));
    }
}
