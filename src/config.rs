use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::models::ProximityThresholds;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub api: ApiSettings,
    #[serde(default)]
    pub credentials: CredentialSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout_secs: Option<u64>,
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(30))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialSettings {
    /// Credential file; without one the session lives in memory only
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheSettings {
    pub details_ttl_secs: Option<u64>,
    pub details_capacity: Option<u64>,
}

impl CacheSettings {
    pub fn details_ttl(&self) -> Duration {
        Duration::from_secs(self.details_ttl_secs.unwrap_or(300))
    }

    pub fn details_capacity(&self) -> u64 {
        self.details_capacity.unwrap_or(256)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    #[serde(default = "default_close_score_difference")]
    pub close_score_difference: f64,
    #[serde(default = "default_moderate_score_difference")]
    pub moderate_score_difference: f64,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            close_score_difference: default_close_score_difference(),
            moderate_score_difference: default_moderate_score_difference(),
        }
    }
}

impl MatchingSettings {
    pub fn thresholds(&self) -> ProximityThresholds {
        ProximityThresholds {
            close: self.close_score_difference,
            moderate: self.moderate_score_difference,
        }
    }
}

fn default_close_score_difference() -> f64 { 50.0 }
fn default_moderate_score_difference() -> f64 { 100.0 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with MATCHMATE__)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., MATCHMATE__API__BASE_URL -> api.base_url
            .add_source(
                Environment::with_prefix("MATCHMATE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("MATCHMATE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let matching = MatchingSettings::default();
        assert_eq!(matching.thresholds(), ProximityThresholds::default());
    }

    #[test]
    fn test_default_logging() {
        let logging = LoggingSettings::default();
        assert_eq!(logging.level, "info");
        assert_eq!(logging.format, "json");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matchmate.toml");
        std::fs::write(
            &path,
            r#"
[api]
base_url = "http://10.0.2.2:3001/api"
timeout_secs = 10

[credentials]
path = "/tmp/matchmate/credentials.toml"

[matching]
close_score_difference = 25
"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.api.base_url, "http://10.0.2.2:3001/api");
        assert_eq!(settings.api.timeout(), Duration::from_secs(10));
        assert_eq!(
            settings.credentials.path.as_deref(),
            Some("/tmp/matchmate/credentials.toml")
        );
        assert_eq!(settings.matching.close_score_difference, 25.0);
        assert_eq!(settings.matching.moderate_score_difference, 100.0);
        assert_eq!(settings.cache.details_ttl(), Duration::from_secs(300));
        assert_eq!(settings.logging.format, "json");
    }

    #[test]
    fn test_shipped_defaults_persist_the_session() {
        let settings = Settings::load_from("config/default.toml").unwrap();
        assert_eq!(
            settings.credentials.path.as_deref(),
            Some(".matchmate/credentials.toml")
        );
        assert_eq!(settings.logging.format, "pretty");
    }

    #[test]
    fn test_missing_api_section_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();

        assert!(Settings::load_from(&path).is_err());
    }
}
