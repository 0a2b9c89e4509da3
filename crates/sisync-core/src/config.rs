//! Centralized configuration for sisync.
//!
//! Constants for network behavior and migration defaults, plus the per
//! environment connection settings loaded from YAML.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, SisyncError};

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const USER_AGENT: &'static str = "sisync/0.2";
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
    pub const THROTTLE_DELAY: Duration = Duration::from_millis(500);
}

/// Defaults for migration runs.
pub struct MigrationConfig;

impl MigrationConfig {
    pub const DEFAULT_BATCH_SIZE: usize = 10;
    pub const DEFAULT_SLEEP_TIME: Duration = Duration::from_secs(10);
    pub const DUPLICATE_SUFFIX: &'static str = " (Duplicate)";
    /// Rule granted to the previous owner on an ownership change.
    pub const ORIGINAL_OWNER_RULE: &'static str = "edit";
    /// Groups that exist in every environment and are never migrated.
    pub const BUILTIN_GROUPS: &'static [&'static str] = &[
        "Admins",
        "All users",
        "Everyone",
        "Consumers",
        "Contributors",
        "Data Admins",
        "Data Designers",
        "Designers",
        "Super Users",
        "Viewers",
    ];
}

/// Connection settings for one environment (source or target).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Host name, optionally with port or scheme.
    pub domain: String,
    /// Use https when the domain carries no scheme.
    #[serde(default = "default_true")]
    pub is_ssl: bool,
    /// Bearer token of the acting API identity.
    pub token: String,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl EnvironmentConfig {
    /// Load and validate a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| SisyncError::io_with_path(e, path))?;
        Self::from_yaml_str(&contents)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: EnvironmentConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.domain.trim().is_empty() {
            return Err(SisyncError::Config {
                message: "'domain' must not be empty".into(),
            });
        }
        if self.token.trim().is_empty() {
            return Err(SisyncError::Config {
                message: "'token' must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> String {
        let domain = self.domain.trim().trim_end_matches('/');
        if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else if self.is_ssl {
            format!("https://{}", domain)
        } else {
            format!("http://{}", domain)
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(NetworkConfig::REQUEST_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_yaml() {
        let config = EnvironmentConfig::from_yaml_str("domain: bi.example.com\ntoken: abc\n")
            .expect("Should parse");
        assert!(config.is_ssl);
        assert!(config.verify_ssl);
        assert_eq!(config.base_url(), "https://bi.example.com");
        assert_eq!(config.timeout(), NetworkConfig::REQUEST_TIMEOUT);
    }

    #[test]
    fn test_base_url_variants() {
        let mut config =
            EnvironmentConfig::from_yaml_str("domain: localhost:30845/\ntoken: t\nis_ssl: false\n")
                .unwrap();
        assert_eq!(config.base_url(), "http://localhost:30845");

        config.domain = "https://prod.example.com".into();
        assert_eq!(config.base_url(), "https://prod.example.com");
    }

    #[test]
    fn test_empty_token_rejected() {
        let err = EnvironmentConfig::from_yaml_str("domain: a\ntoken: ''\n").unwrap_err();
        assert!(matches!(err, SisyncError::Config { .. }));
    }

    #[test]
    fn test_missing_domain_rejected() {
        assert!(EnvironmentConfig::from_yaml_str("token: abc\n").is_err());
    }

    #[test]
    fn test_migration_defaults() {
        assert_eq!(MigrationConfig::DEFAULT_BATCH_SIZE, 10);
        assert!(MigrationConfig::DEFAULT_SLEEP_TIME > Duration::ZERO);
        assert!(MigrationConfig::BUILTIN_GROUPS.contains(&"Admins"));
    }
}
